//! WebSocket transport on tokio-tungstenite
//!
//! Each connection runs as one task on the given runtime. Outbound frames
//! reach the task through an unbounded channel, so `send` never blocks the
//! caller.

use super::{Connector, Transport, TransportEvents};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Opens WebSocket connections on a tokio runtime
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    runtime: Handle,
}

impl WebSocketConnector {
    /// Spawn connections on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Spawn connections on the runtime of the calling context
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::transport(format!("no tokio runtime: {}", e)))
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        debug!("Connecting to {} (generation {})", url, events.generation());

        self.runtime.spawn(run_connection(
            url.to_string(),
            events,
            receiver,
            open.clone(),
            cancel.clone(),
        ));

        Ok(Box::new(WebSocketTransport {
            outbound,
            open,
            cancel,
        }))
    }
}

/// Handle to a connection task
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, frame: String) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::transport("WebSocket is not open"));
        }

        self.outbound
            .send(frame)
            .map_err(|_| Error::transport("WebSocket task has stopped"))
    }

    fn disconnect(&mut self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_connection(
    url: String,
    events: TransportEvents,
    mut outbound: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            events.on_close();
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            events.on_fail(e.to_string());
            return;
        }
    };

    open.store(true, Ordering::Release);
    events.on_open();

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close frame to {} not sent: {}", url, e);
                }
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                trace!("Sending frame to {} ({} bytes)", url, frame.len());
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!("WebSocket write to {} failed: {}", url, e);
                    break;
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => events.on_message(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => events.on_message(text),
                    Err(_) => debug!("Dropping non-UTF-8 binary frame from {}", url),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by {}: {:?}", url, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket read from {} failed: {}", url, e);
                    break;
                }
                None => break,
            }
        }
    }

    open.store(false, Ordering::Release);
    events.on_close();
}
