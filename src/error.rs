//! Error handling for the pool client
//!
//! Error types covering configuration, transport, decoding and job faults, with
//! the numeric diagnostic codes the job parser reports.

use thiserror::Error;

/// Result type alias for pool client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pool client
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport faults (connect failure, send on a closed link, unexpected close)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A single inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Job rejected by validation
    #[error("Job rejected: {0}")]
    Job(#[from] JobError),

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether a later attempt can succeed without a configuration change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Io(_) | Error::Decode(_) | Error::Job(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Transport { .. } => "transport",
            Error::Decode(_) => "decode",
            Error::Job(_) => "job",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

/// Reasons an inbound frame is discarded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The transport envelope (e.g. base64) could not be removed
    #[error("invalid envelope: {0}")]
    Envelope(String),

    /// Shorter than the minimum envelope or not starting with `{`
    #[error("malformed frame ({len} bytes)")]
    Malformed { len: usize },

    /// Not parseable as JSON
    #[error("JSON decode failed: {0}")]
    Json(String),

    /// Parsed, but the document is not an object
    #[error("document is not an object")]
    NotObject,
}

/// Job validation failures, in validation order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Payload is not a JSON object
    #[error("job payload is not an object")]
    NotObject,

    /// `job_id` missing or empty
    #[error("missing or empty job id")]
    InvalidId,

    /// Work blob missing or malformed
    #[error("missing or invalid blob")]
    InvalidBlob,

    /// Self-select job without `extra_nonce` or `pool_wallet`
    #[error("missing extra_nonce or pool_wallet")]
    MissingSelfSelectFields,

    /// `target` missing or malformed
    #[error("missing or invalid target")]
    InvalidTarget,

    /// Algorithm unknown, or refused by the listener
    #[error("unknown or disabled algorithm {0:?}")]
    Algorithm(Option<String>),

    /// RandomX-family job without a valid `seed_hash`
    #[error("missing or invalid seed_hash")]
    InvalidSeedHash,
}

impl JobError {
    /// Numeric diagnostic code for this rejection
    pub fn code(&self) -> i32 {
        match self {
            JobError::NotObject => 2,
            JobError::InvalidId => 3,
            JobError::InvalidBlob | JobError::MissingSelfSelectFields => 4,
            JobError::InvalidTarget => 5,
            JobError::Algorithm(_) => 6,
            JobError::InvalidSeedHash => 7,
        }
    }
}

/// Login result carried no identity token
pub const LOGIN_MISSING_ID: i32 = 1;
