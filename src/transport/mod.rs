//! Duplex transport contract
//!
//! A [`Connector`] opens a connection and hands back an owned [`Transport`]
//! handle. Lifecycle and inbound traffic flow back through [`TransportEvents`],
//! a typed context token tied to one connection generation.
//!
//! Implementations must never deliver events synchronously from inside
//! `connect`, `send` or `disconnect`; the session holds its lock across those
//! calls.

pub mod memory;
pub mod websocket;

use crate::Result;
use std::sync::Weak;

pub use memory::MemoryConnector;
pub use websocket::WebSocketConnector;

/// Something that happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished, frames may be sent
    Open,
    /// One inbound text frame
    Message(String),
    /// Connection ended after it was open, or after `disconnect()`
    Close,
    /// Connection attempt failed
    Fail(String),
}

/// Receiver of transport events
pub trait EventSink: Send + Sync {
    /// Handle an event from the connection numbered `generation`
    fn deliver(&self, generation: u64, event: TransportEvent);
}

/// Context token handed to a connector
///
/// Holds only a weak reference, so a dropped client silently swallows late
/// events.
#[derive(Clone)]
pub struct TransportEvents {
    sink: Weak<dyn EventSink>,
    generation: u64,
}

impl TransportEvents {
    pub fn new(sink: Weak<dyn EventSink>, generation: u64) -> Self {
        Self { sink, generation }
    }

    /// Connection generation this token belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn on_open(&self) {
        self.emit(TransportEvent::Open);
    }

    pub fn on_message(&self, frame: String) {
        self.emit(TransportEvent::Message(frame));
    }

    pub fn on_close(&self) {
        self.emit(TransportEvent::Close);
    }

    pub fn on_fail(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Fail(reason.into()));
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.sink.upgrade() {
            sink.deliver(self.generation, event);
        }
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Owned handle to one live connection
pub trait Transport: Send {
    /// Queue a frame; fails immediately when the connection is not open
    fn send(&mut self, frame: String) -> Result<()>;

    /// Best-effort graceful close, always followed by one close or fail event
    fn disconnect(&mut self);
}

/// Opens connections
pub trait Connector: Send + Sync {
    /// Begin connecting to `url`; the outcome arrives through `events`
    fn connect(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>>;
}

/// Transport slot of a session: absent, or one owned live connection
#[derive(Default)]
pub enum Link {
    #[default]
    Absent,
    Live(Box<dyn Transport>),
}

impl Link {
    /// Whether a connection is held
    pub fn is_live(&self) -> bool {
        matches!(self, Link::Live(_))
    }

    /// Send through the held connection
    pub fn send(&mut self, frame: String) -> Result<()> {
        match self {
            Link::Live(transport) => transport.send(frame),
            Link::Absent => Err(crate::Error::transport("not connected")),
        }
    }

    /// Ask the held connection to close; returns false when absent
    pub fn disconnect(&mut self) -> bool {
        match self {
            Link::Live(transport) => {
                transport.disconnect();
                true
            }
            Link::Absent => false,
        }
    }

    /// Release the held connection
    pub fn release(&mut self) -> Option<Box<dyn Transport>> {
        match std::mem::take(self) {
            Link::Live(transport) => Some(transport),
            Link::Absent => None,
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Absent => write!(f, "Absent"),
            Link::Live(_) => write!(f, "Live"),
        }
    }
}
