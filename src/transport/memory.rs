//! In-process transport driven by hand
//!
//! Every frame the session sends is recorded, and inbound events are injected
//! explicitly. Used to exercise the session without a network.

use super::{Connector, Transport, TransportEvents};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Connection {
    url: String,
    events: TransportEvents,
    open: bool,
    sent: Vec<String>,
    disconnects: usize,
}

#[derive(Debug, Default)]
struct Shared {
    connections: Vec<Connection>,
    refuse: Option<String>,
}

/// Connector whose connections live in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` call fail with `reason`
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.shared.lock().refuse = Some(reason.into());
    }

    /// Number of connections opened so far
    pub fn connections(&self) -> usize {
        self.shared.lock().connections.len()
    }

    /// URL of the latest connection
    pub fn url(&self) -> Option<String> {
        self.shared.lock().connections.last().map(|c| c.url.clone())
    }

    /// Frames sent on the latest connection
    pub fn sent(&self) -> Vec<String> {
        self.shared
            .lock()
            .connections
            .last()
            .map(|c| c.sent.clone())
            .unwrap_or_default()
    }

    /// `disconnect()` calls seen by the latest connection
    pub fn disconnects(&self) -> usize {
        self.shared.lock().connections.last().map_or(0, |c| c.disconnects)
    }

    /// Whether the latest connection is open
    pub fn is_open(&self) -> bool {
        self.shared.lock().connections.last().is_some_and(|c| c.open)
    }

    /// Event token of connection `index`, for replaying stale events
    pub fn events(&self, index: usize) -> Option<TransportEvents> {
        self.shared.lock().connections.get(index).map(|c| c.events.clone())
    }

    /// Finish the handshake of the latest connection
    pub fn open(&self) {
        let events = self.with_latest(|c| {
            c.open = true;
        });
        if let Some(events) = events {
            events.on_open();
        }
    }

    /// Deliver an inbound frame on the latest connection
    pub fn deliver(&self, frame: impl Into<String>) {
        if let Some(events) = self.with_latest(|_| ()) {
            events.on_message(frame.into());
        }
    }

    /// Close the latest connection from the remote side
    pub fn close(&self) {
        let events = self.with_latest(|c| {
            c.open = false;
        });
        if let Some(events) = events {
            events.on_close();
        }
    }

    /// Fail the latest connection attempt
    pub fn fail(&self, reason: &str) {
        let events = self.with_latest(|c| {
            c.open = false;
        });
        if let Some(events) = events {
            events.on_fail(reason);
        }
    }

    // Events are cloned out so they can be delivered without holding the lock.
    fn with_latest<F>(&self, update: F) -> Option<TransportEvents>
    where
        F: FnOnce(&mut Connection),
    {
        let mut shared = self.shared.lock();
        let connection = shared.connections.last_mut()?;
        update(connection);
        Some(connection.events.clone())
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let mut shared = self.shared.lock();

        if let Some(reason) = shared.refuse.take() {
            return Err(Error::transport(reason));
        }

        shared.connections.push(Connection {
            url: url.to_string(),
            events,
            open: false,
            sent: Vec::new(),
            disconnects: 0,
        });

        Ok(Box::new(MemoryTransport {
            shared: self.shared.clone(),
            index: shared.connections.len() - 1,
        }))
    }
}

struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    index: usize,
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: String) -> Result<()> {
        let mut shared = self.shared.lock();
        match shared.connections.get_mut(self.index) {
            Some(connection) if connection.open => {
                connection.sent.push(frame);
                Ok(())
            }
            _ => Err(Error::transport("connection is not open")),
        }
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.shared.lock().connections.get_mut(self.index) {
            connection.open = false;
            connection.disconnects += 1;
        }
    }
}
