//! Reconnect scheduling
//!
//! The session never retries on its own. [`Supervisor`] drives it: a
//! one-second tick for the deadlines, and a [`ReconnectPolicy`] decision after
//! every teardown, fed through a listener decorator.

use crate::classify::{FailureCount, ReconnectPolicy, Teardown};
use crate::client::{PoolClient, SessionListener};
use crate::correlator::SubmitResult;
use crate::job::Job;
use crate::Algorithm;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between deadline checks
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Teardown as seen by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub failures: FailureCount,
    pub reason: Teardown,
}

/// Listener decorator that also reports teardowns to a [`Supervisor`]
pub struct SupervisedListener {
    inner: Arc<dyn SessionListener>,
    closes: mpsc::UnboundedSender<CloseEvent>,
}

impl SessionListener for SupervisedListener {
    fn on_login(&self, params: &mut Map<String, Value>) {
        self.inner.on_login(params);
    }

    fn on_login_success(&self) {
        self.inner.on_login_success();
    }

    fn on_job_received(&self, job: &Job, params: &Value) {
        self.inner.on_job_received(job, params);
    }

    fn on_verify_algorithm(&self, algorithm: &Algorithm) -> bool {
        self.inner.on_verify_algorithm(algorithm)
    }

    fn on_result_accepted(&self, result: &SubmitResult, error: Option<&str>) {
        self.inner.on_result_accepted(result, error);
    }

    fn on_connect_error(&self, message: &str) {
        self.inner.on_connect_error(message);
    }

    fn on_close(&self, failures: FailureCount, reason: &Teardown) {
        self.inner.on_close(failures, reason);

        let event = CloseEvent {
            failures,
            reason: reason.clone(),
        };
        if self.closes.send(event).is_err() {
            debug!("Supervisor gone, close event dropped");
        }
    }
}

/// Keeps a session alive until cancelled
pub struct Supervisor {
    client: PoolClient,
    policy: ReconnectPolicy,
    closes: mpsc::UnboundedReceiver<CloseEvent>,
    tick_interval: Duration,
}

impl Supervisor {
    /// Wrap `inner` so teardowns reach a supervisor; pass the returned
    /// listener to the client and the receiver to [`Supervisor::new`]
    pub fn listener(
        inner: Arc<dyn SessionListener>,
    ) -> (Arc<dyn SessionListener>, mpsc::UnboundedReceiver<CloseEvent>) {
        let (closes, receiver) = mpsc::unbounded_channel();
        (Arc::new(SupervisedListener { inner, closes }), receiver)
    }

    pub fn new(
        client: PoolClient,
        policy: ReconnectPolicy,
        closes: mpsc::UnboundedReceiver<CloseEvent>,
    ) -> Self {
        Self {
            client,
            policy,
            closes,
            tick_interval: TICK_INTERVAL,
        }
    }

    /// Override the deadline check interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Connect, then tick and reconnect until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = self.client.connect() {
            if !e.is_retryable() {
                error!("Cannot start session ({}): {}", e.category(), e);
                return;
            }
            warn!("Initial connect failed: {}", e);
        }

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Supervisor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.client.tick(std::time::Instant::now());
                }
                event = self.closes.recv() => {
                    let Some(event) = event else { break };
                    retry_at = self.schedule(&event);
                }
                _ = wait_until(retry_at) => {
                    retry_at = None;

                    if self.client.failures().is_halted() {
                        debug!("Disconnect requested while waiting, not reconnecting");
                        continue;
                    }

                    if let Err(e) = self.client.reconnect() {
                        warn!("Reconnect failed: {}", e);
                    }
                }
            }
        }
    }

    fn schedule(&self, event: &CloseEvent) -> Option<Instant> {
        match self.policy.next_delay(event.failures, &event.reason) {
            Some(delay) => {
                info!(
                    "Session ended ({}), reconnecting in {} (failures: {})",
                    event.reason,
                    humantime::format_duration(delay),
                    event.failures
                );
                Some(Instant::now() + delay)
            }
            None => {
                info!("Session ended ({}), not reconnecting", event.reason);
                None
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Phase;
    use crate::config::PoolConfig;
    use crate::transport::MemoryConnector;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Closes {
        seen: Mutex<Vec<Teardown>>,
    }

    impl SessionListener for Closes {
        fn on_job_received(&self, _job: &Job, _params: &Value) {}

        fn on_close(&self, _failures: FailureCount, reason: &Teardown) {
            self.seen.lock().push(reason.clone());
        }
    }

    fn pool() -> PoolConfig {
        PoolConfig::new("ws://127.0.0.1:3333", "wallet")
    }

    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_retries_after_refused_connect() {
        let connector = MemoryConnector::new();
        connector.refuse_next("connection refused");

        let inner = Arc::new(Closes::default());
        let (listener, closes) = Supervisor::listener(inner.clone());
        let client = PoolClient::new(pool(), Arc::new(connector.clone()), listener);
        let policy = ReconnectPolicy::new(0, Duration::from_millis(10), Duration::from_millis(50));

        let cancel = CancellationToken::new();
        let supervisor = Supervisor::new(client.clone(), policy, closes)
            .with_tick_interval(Duration::from_millis(10));
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(eventually(|| connector.connections() == 1).await);
        assert_eq!(client.phase(), Phase::Connecting);
        assert_eq!(inner.seen.lock().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_pool_stops_supervisor() {
        let connector = MemoryConnector::new();
        let (listener, closes) = Supervisor::listener(Arc::new(Closes::default()));
        let mut disabled = pool();
        disabled.enabled = false;
        let client = PoolClient::new(disabled, Arc::new(connector.clone()), listener);

        let cancel = CancellationToken::new();
        let run = Supervisor::new(client, ReconnectPolicy::default(), closes).run(cancel);
        time::timeout(Duration::from_secs(1), run).await.unwrap();
        assert_eq!(connector.connections(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_stops_retrying() {
        let connector = MemoryConnector::new();
        let (listener, closes) = Supervisor::listener(Arc::new(Closes::default()));
        let client = PoolClient::new(pool(), Arc::new(connector.clone()), listener);
        let policy = ReconnectPolicy::new(0, Duration::from_millis(10), Duration::from_millis(50));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Supervisor::new(client.clone(), policy, closes).run(cancel.clone()));

        assert!(eventually(|| connector.connections() == 1).await);
        assert!(client.disconnect());
        connector.close();
        assert_eq!(client.phase(), Phase::Disconnected);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.connections(), 1);
        assert!(client.failures().is_halted());

        cancel.cancel();
        task.await.unwrap();
    }
}
