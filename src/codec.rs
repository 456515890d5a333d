//! Wire codec
//!
//! Converts protocol documents to transport frames and back. The pool
//! endpoint this client talks to wraps every JSON text in standard base64
//! before framing it, so the envelope is configurable.

use crate::error::DecodeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smallest decoded text that can hold a protocol message
pub const MIN_FRAME_LEN: usize = 32;

/// Text transformation applied around the JSON document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    /// Standard base64 with padding
    #[default]
    Base64,
    /// Raw JSON text
    Plain,
}

/// Frame encoder/decoder for one envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    envelope: Envelope,
}

impl Codec {
    /// Create a codec for the given envelope
    pub fn new(envelope: Envelope) -> Self {
        Self { envelope }
    }

    /// Envelope in use
    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    /// Serialize a document into a frame
    pub fn encode(&self, document: &Value) -> String {
        let text = document.to_string();
        self.wrap(&text)
    }

    /// Wrap already-serialized JSON text
    pub fn wrap(&self, text: &str) -> String {
        match self.envelope {
            Envelope::Base64 => STANDARD.encode(text.as_bytes()),
            Envelope::Plain => text.to_string(),
        }
    }

    /// Remove the envelope, returning the JSON text
    pub fn unwrap_text(&self, frame: &str) -> Result<String, DecodeError> {
        match self.envelope {
            Envelope::Base64 => {
                let bytes = STANDARD
                    .decode(frame.trim().as_bytes())
                    .map_err(|e| DecodeError::Envelope(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| DecodeError::Envelope(e.to_string()))
            }
            Envelope::Plain => Ok(frame.to_string()),
        }
    }

    /// Decode a frame into a JSON object
    pub fn decode(&self, frame: &str) -> Result<Value, DecodeError> {
        let text = self.unwrap_text(frame)?;

        if text.len() < MIN_FRAME_LEN || !text.starts_with('{') {
            return Err(DecodeError::Malformed { len: text.len() });
        }

        let document: Value =
            serde_json::from_str(&text).map_err(|e| DecodeError::Json(e.to_string()))?;

        if !document.is_object() {
            return Err(DecodeError::NotObject);
        }

        Ok(document)
    }
}
