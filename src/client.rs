//! Pool session state machine
//!
//! [`PoolClient`] logs in over a [`Connector`]-supplied transport, admits
//! jobs, tracks submissions and tears the session down on protocol faults or
//! critical pool errors. It never schedules its own retries or timers: an
//! outside driver calls [`PoolClient::tick`] and decides when to reconnect
//! (see [`crate::strategy::Supervisor`]).
//!
//! All mutable session state sits behind one lock. Listener notifications are
//! collected while it is held and delivered after it is released, except for
//! [`SessionListener::on_login`] and [`SessionListener::on_verify_algorithm`],
//! which run under the lock and must not call back into the client.

use crate::classify::{is_critical_error, FailureCount, Teardown};
use crate::codec::Codec;
use crate::config::PoolConfig;
use crate::correlator::{Correlator, ResponseCallback, SubmitResult, SubmitTracker};
use crate::error::LOGIN_MISSING_ID;
use crate::extensions::{Extension, ExtensionSet};
use crate::job::{parse_job, Admission, Job, JobContext, JobResult, JobTracker};
use crate::stratum::{Inbound, LoginParams, Method, Notification, Request, Response, LOGIN_ID};
use crate::transport::{Connector, EventSink, Link, TransportEvent, TransportEvents};
use crate::{Algorithm, Error, Result};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long a connection attempt may take
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// How long the pool may stay silent after we sent something
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::Authenticating => "authenticating",
            Phase::Ready => "ready",
            Phase::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Timestamps the periodic driver compares against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    /// Send a keepalive ping once this passes
    pub keepalive: Option<Instant>,
    /// Close the session once this passes
    pub expire: Option<Instant>,
}

fn elapsed(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}

/// Upward notifications from a session
pub trait SessionListener: Send + Sync {
    /// Add extra login parameters; runs under the session lock
    fn on_login(&self, _params: &mut Map<String, Value>) {}

    /// Login succeeded
    fn on_login_success(&self) {}

    /// A new job became current
    fn on_job_received(&self, job: &Job, params: &Value);

    /// Whether this algorithm may be mined; runs under the session lock
    fn on_verify_algorithm(&self, _algorithm: &Algorithm) -> bool {
        true
    }

    /// A submission was resolved; `error` is `None` when accepted
    fn on_result_accepted(&self, _result: &SubmitResult, _error: Option<&str>) {}

    /// A connection attempt failed
    fn on_connect_error(&self, _message: &str) {}

    /// Teardown finished
    fn on_close(&self, _failures: FailureCount, _reason: &Teardown) {}
}

/// Per-client settings that are not part of the pool
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// User agent sent at login
    pub agent: String,
    /// Suppress warning and error logs for protocol and pool errors
    pub quiet: bool,
    /// Frame codec
    pub codec: Codec,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            agent: format!("{}/{}", crate::APP_NAME, crate::APP_VERSION),
            quiet: false,
            codec: Codec::default(),
        }
    }
}

enum Notice {
    LoginSuccess,
    Job(Job, Value),
    Resolved(SubmitResult, Option<String>),
    Callback(ResponseCallback, Response, Duration),
    ConnectError(String),
    Closed(FailureCount, Teardown),
}

impl Notice {
    // Progress notices are dropped once their session has been torn down
    fn is_progress(&self) -> bool {
        !matches!(self, Notice::ConnectError(_) | Notice::Closed(..))
    }
}

struct State {
    phase: Phase,
    pool: PoolConfig,
    link: Link,
    generation: u64,
    epoch: u64,
    rpc_id: Option<String>,
    extensions: ExtensionSet,
    correlator: Correlator,
    submits: SubmitTracker,
    jobs: JobTracker,
    failures: FailureCount,
    deadlines: Deadlines,
    teardown: Option<Teardown>,
}

struct Inner {
    state: Mutex<State>,
    dispatch: ReentrantMutex<()>,
    listener: Arc<dyn SessionListener>,
    connector: Arc<dyn Connector>,
    codec: Codec,
    agent: String,
    quiet: bool,
}

/// Client session for one pool
#[derive(Clone)]
pub struct PoolClient {
    inner: Arc<Inner>,
}

impl PoolClient {
    /// Create a client with default options
    pub fn new(
        pool: PoolConfig,
        connector: Arc<dyn Connector>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self::with_options(pool, ClientOptions::default(), connector, listener)
    }

    /// Create a client
    pub fn with_options(
        pool: PoolConfig,
        options: ClientOptions,
        connector: Arc<dyn Connector>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        let state = State {
            phase: Phase::Disconnected,
            pool,
            link: Link::Absent,
            generation: 0,
            epoch: 0,
            rpc_id: None,
            extensions: ExtensionSet::new(),
            correlator: Correlator::new(),
            submits: SubmitTracker::new(),
            jobs: JobTracker::new(),
            failures: FailureCount::default(),
            deadlines: Deadlines::default(),
            teardown: None,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                dispatch: ReentrantMutex::new(()),
                listener,
                connector,
                codec: options.codec,
                agent: options.agent,
                quiet: options.quiet,
            }),
        }
    }

    /// Open the transport; login follows once it is up
    ///
    /// A connector that refuses outright is reported both as an error and
    /// through the listener, like any other failed attempt.
    pub fn connect(&self) -> Result<()> {
        self.locked(|client, state, now, notices| client.connect_locked(state, now, notices))
    }

    /// Replace the pool settings, then connect
    pub fn connect_to(&self, pool: PoolConfig) -> Result<()> {
        self.locked(|client, state, now, notices| {
            if state.phase != Phase::Disconnected {
                return Err(Error::invalid_state(format!(
                    "cannot switch pools while {}",
                    state.phase
                )));
            }

            state.pool = pool;
            client.connect_locked(state, now, notices)
        })
    }

    /// Drop the current connection without teardown notifications and connect again
    pub fn reconnect(&self) -> Result<()> {
        self.locked(|client, state, now, notices| {
            if let Some(mut old) = state.link.release() {
                old.disconnect();
            }

            client.inner.reset_session(state);
            state.teardown = None;
            state.phase = Phase::Disconnected;
            client.connect_locked(state, now, notices)
        })
    }

    /// Tear the session down and disable automatic retry
    ///
    /// Idempotent: when already disconnected or closing, no second teardown
    /// starts and no second `on_close` fires; the failure counter is still set
    /// to `Halted` so a pending retry is cancelled. Once this returns, no
    /// further progress notification from the finished session reaches the
    /// listener.
    pub fn disconnect(&self) -> bool {
        self.locked(|client, state, _, notices| {
            state.failures = FailureCount::Halted;
            state.deadlines = Deadlines::default();

            if matches!(state.phase, Phase::Disconnected | Phase::Closing) {
                return true;
            }

            client.inner.begin_close(state, Teardown::Requested, notices)
        })
    }

    /// Tear the session down, leaving the failure counter to the retry policy
    pub fn close(&self) -> bool {
        self.locked(|client, state, _, notices| client.inner.begin_close(state, Teardown::Closed, notices))
    }

    /// Send a request whose response is not tracked
    pub fn send(&self, method: &str, params: Value) -> Result<i64> {
        self.locked(|client, state, now, notices| {
            ensure_open(state)?;

            let id = state.correlator.next_sequence();
            client
                .inner
                .send_request(state, &Request::new(id, method, params), now, notices)?;
            Ok(id)
        })
    }

    /// Send a request and run `callback` with its response
    ///
    /// The callback is dropped unrun if the session ends first.
    pub fn request<F>(&self, method: &str, params: Value, callback: F) -> Result<i64>
    where
        F: FnOnce(&Response, Duration) + Send + 'static,
    {
        self.locked(|client, state, now, notices| {
            ensure_open(state)?;

            let id = state.correlator.next_sequence();
            state.correlator.register(id, Box::new(callback), now);

            if let Err(e) = client
                .inner
                .send_request(state, &Request::new(id, method, params), now, notices)
            {
                state.correlator.unregister(id);
                return Err(e);
            }

            Ok(id)
        })
    }

    /// Submit a share for the current session
    pub fn submit(&self, result: &JobResult) -> Result<i64> {
        self.locked(|client, state, now, notices| {
            let rpc_id = match &state.rpc_id {
                Some(rpc_id) if state.phase == Phase::Ready && *rpc_id == result.client_id => {
                    rpc_id.clone()
                }
                _ => {
                    return Err(Error::invalid_state(format!(
                        "no session for share of job {}",
                        result.job_id
                    )))
                }
            };

            if result.diff == 0 {
                client.inner.begin_close(state, Teardown::Closed, notices);
                return Err(Error::invalid_state("share with zero difficulty"));
            }

            let id = state.correlator.next_sequence();
            let algo = if state.extensions.is_active(Extension::Algo, &state.pool) {
                result.algorithm.map(|algorithm| algorithm.name())
            } else {
                None
            };

            let request = Request::submit(id, &rpc_id, result, algo);
            state.submits.record(SubmitResult::new(
                id,
                result.diff,
                result.actual_diff,
                result.id,
                result.backend.clone(),
                now,
            ));

            if let Err(e) = client.inner.send_request(state, &request, now, notices) {
                state.submits.forget(id);
                return Err(e);
            }

            Ok(id)
        })
    }

    /// Compare deadlines against `now`; closes or pings as needed
    pub fn tick(&self, now: Instant) {
        let mut notices = Vec::new();
        let epoch = {
            let mut state = self.inner.state.lock();
            self.inner.on_tick(&mut state, now, &mut notices);
            state.epoch
        };
        self.inner.dispatch(epoch, notices);
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Identity token assigned at login
    pub fn rpc_id(&self) -> Option<String> {
        self.inner.state.lock().rpc_id.clone()
    }

    /// Current job
    pub fn job(&self) -> Option<Job> {
        self.inner.state.lock().jobs.current().cloned()
    }

    /// Extensions negotiated at the last login
    pub fn extensions(&self) -> ExtensionSet {
        self.inner.state.lock().extensions
    }

    /// Negotiated, or forced by pool configuration
    pub fn has_extension(&self, ext: Extension) -> bool {
        let state = self.inner.state.lock();
        state.extensions.is_active(ext, &state.pool)
    }

    pub fn failures(&self) -> FailureCount {
        self.inner.state.lock().failures
    }

    pub fn pool(&self) -> PoolConfig {
        self.inner.state.lock().pool.clone()
    }

    pub fn deadlines(&self) -> Deadlines {
        self.inner.state.lock().deadlines
    }

    /// Requests waiting for a response callback
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().correlator.len()
    }

    /// Submissions waiting for resolution
    pub fn pending_submissions(&self) -> usize {
        self.inner.state.lock().submits.len()
    }

    fn locked<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Self, &mut State, Instant, &mut Vec<Notice>) -> T,
    {
        let mut notices = Vec::new();
        let (epoch, output) = {
            let mut state = self.inner.state.lock();
            let output = f(self, &mut *state, Instant::now(), &mut notices);
            (state.epoch, output)
        };
        self.inner.dispatch(epoch, notices);
        output
    }

    fn connect_locked(&self, state: &mut State, now: Instant, notices: &mut Vec<Notice>) -> Result<()> {
        if state.phase != Phase::Disconnected {
            return Err(Error::invalid_state(format!("cannot connect while {}", state.phase)));
        }

        if !state.pool.enabled {
            return Err(Error::config(format!("pool {} is disabled", state.pool.url)));
        }

        state.pool.validate()?;

        if state.failures.is_halted() {
            state.failures = FailureCount::default();
        }

        state.generation += 1;
        state.phase = Phase::Connecting;
        state.deadlines = Deadlines {
            keepalive: None,
            expire: Some(now + CONNECT_TIMEOUT),
        };

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let sink: Weak<dyn EventSink> = inner;
        let events = TransportEvents::new(sink, state.generation);

        debug!(pool = %state.pool.url, "Connecting (failures: {})", state.failures);

        match self.inner.connector.connect(&state.pool.url, events) {
            Ok(transport) => {
                state.link = Link::Live(transport);
                Ok(())
            }
            Err(e) => {
                if !self.inner.quiet {
                    error!(pool = %state.pool.url, "Connect error: {}", e);
                }

                notices.push(Notice::ConnectError(e.to_string()));
                state.teardown = Some(Teardown::Transport(e.to_string()));
                self.inner.reset_session(state);
                self.inner.finish_close(state, notices);
                Err(e)
            }
        }
    }
}

fn ensure_open(state: &State) -> Result<()> {
    match state.phase {
        Phase::Authenticating | Phase::Ready => Ok(()),
        phase => Err(Error::invalid_state(format!("cannot send while {}", phase))),
    }
}

impl EventSink for Inner {
    fn deliver(&self, generation: u64, event: TransportEvent) {
        let now = Instant::now();
        let mut notices = Vec::new();

        let epoch = {
            let mut state = self.state.lock();

            if generation != state.generation {
                debug!(pool = %state.pool.url, "Ignoring {:?} from stale connection {}", event, generation);
                return;
            }

            match event {
                TransportEvent::Open => self.on_open(&mut state, now, &mut notices),
                TransportEvent::Message(frame) => self.on_message(&mut state, &frame, now, &mut notices),
                TransportEvent::Close => self.on_transport_closed(&mut state, None, &mut notices),
                TransportEvent::Fail(reason) => {
                    self.on_transport_closed(&mut state, Some(reason), &mut notices)
                }
            }

            state.epoch
        };

        self.dispatch(epoch, notices);
    }
}

impl Inner {
    fn dispatch(&self, epoch: u64, notices: Vec<Notice>) {
        let _guard = self.dispatch.lock();

        for notice in notices {
            if notice.is_progress() && self.state.lock().epoch != epoch {
                debug!("Dropping notification from a finished session");
                continue;
            }

            match notice {
                Notice::LoginSuccess => self.listener.on_login_success(),
                Notice::Job(job, params) => self.listener.on_job_received(&job, &params),
                Notice::Resolved(result, error) => {
                    self.listener.on_result_accepted(&result, error.as_deref())
                }
                Notice::Callback(callback, response, rtt) => callback(&response, rtt),
                Notice::ConnectError(message) => self.listener.on_connect_error(&message),
                Notice::Closed(failures, reason) => self.listener.on_close(failures, &reason),
            }
        }
    }

    fn send_request(
        &self,
        state: &mut State,
        request: &Request,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) -> Result<()> {
        let frame = self.codec.encode(&request.to_value());
        debug!(pool = %state.pool.url, "Sending {} #{} ({} bytes)", request.method, request.id, frame.len());

        if let Err(e) = state.link.send(frame) {
            if !self.quiet {
                error!(pool = %state.pool.url, "Send failed: {}", e);
            }
            self.begin_close(state, Teardown::Transport(e.to_string()), notices);
            return Err(e);
        }

        state.deadlines.expire = Some(now + RESPONSE_TIMEOUT);
        Ok(())
    }

    fn reset_session(&self, state: &mut State) {
        state.epoch += 1;
        state.rpc_id = None;
        state.extensions.clear();
        state.correlator.clear();
        state.submits.clear();
        state.jobs.clear();
        state.deadlines = Deadlines::default();
    }

    fn begin_close(&self, state: &mut State, reason: Teardown, notices: &mut Vec<Notice>) -> bool {
        if matches!(state.phase, Phase::Disconnected | Phase::Closing) {
            return false;
        }

        debug!(pool = %state.pool.url, "Closing session ({})", reason);

        state.phase = Phase::Closing;
        state.teardown = Some(reason);
        self.reset_session(state);

        if !state.link.disconnect() {
            self.finish_close(state, notices);
        }

        true
    }

    fn finish_close(&self, state: &mut State, notices: &mut Vec<Notice>) {
        state.link.release();
        state.phase = Phase::Disconnected;
        state.failures = state.failures.increment();

        let reason = state
            .teardown
            .take()
            .unwrap_or_else(|| Teardown::Transport("connection closed".into()));

        info!(pool = %state.pool.url, "Disconnected: {} (failures: {})", reason, state.failures);
        notices.push(Notice::Closed(state.failures, reason));
    }

    fn on_transport_closed(&self, state: &mut State, failure: Option<String>, notices: &mut Vec<Notice>) {
        match state.phase {
            Phase::Disconnected => return,
            Phase::Closing => {}
            phase => {
                let reason = match failure {
                    Some(reason) => {
                        if phase == Phase::Connecting {
                            if !self.quiet {
                                error!(pool = %state.pool.url, "Connect error: {}", reason);
                            }
                            notices.push(Notice::ConnectError(reason.clone()));
                        }
                        Teardown::Transport(reason)
                    }
                    None => Teardown::Transport("connection closed by pool".into()),
                };

                state.teardown = Some(reason);
                self.reset_session(state);
            }
        }

        self.finish_close(state, notices);
    }

    fn on_open(&self, state: &mut State, now: Instant, notices: &mut Vec<Notice>) {
        if state.phase != Phase::Connecting {
            debug!(pool = %state.pool.url, "Ignoring open while {}", state.phase);
            return;
        }

        state.phase = Phase::Authenticating;
        state.deadlines.expire = None;

        let mut params = LoginParams {
            login: &state.pool.user,
            pass: &state.pool.password,
            agent: &self.agent,
            rigid: state.pool.rig_id.as_deref(),
        }
        .into_map();
        self.listener.on_login(&mut params);

        state.correlator.login_sequence();
        state.submits.clear();

        if self.send_request(state, &Request::login(params), now, notices).is_err() {
            debug!(pool = %state.pool.url, "Login request not sent");
        }
    }

    fn on_message(&self, state: &mut State, frame: &str, now: Instant, notices: &mut Vec<Notice>) {
        if !matches!(state.phase, Phase::Authenticating | Phase::Ready) {
            debug!(pool = %state.pool.url, "Ignoring frame while {}", state.phase);
            return;
        }

        let document = match self.codec.decode(frame) {
            Ok(document) => document,
            Err(e) => {
                if !self.quiet {
                    error!(pool = %state.pool.url, "JSON decode failed: {}", e);
                }
                return;
            }
        };

        state.deadlines.expire = None;
        if state.extensions.is_active(Extension::Keepalive, &state.pool) {
            state.deadlines.keepalive = Some(now + state.pool.keepalive_interval());
        }

        match Inbound::classify(document) {
            Inbound::Response(response) => self.on_response(state, response, now, notices),
            Inbound::Notification(notification) => self.on_notification(state, notification, notices),
            Inbound::Unknown => {
                if !self.quiet {
                    warn!(pool = %state.pool.url, "Unknown message");
                }
            }
        }
    }

    fn on_response(&self, state: &mut State, response: Response, now: Instant, notices: &mut Vec<Notice>) {
        let callback = state.correlator.take(response.id, now);

        if let Some(rpc_error) = response.error.clone() {
            let resolved = callback.is_some()
                || self.resolve_submit(state, response.id, Some(&rpc_error.message), now, notices);

            if !resolved && !self.quiet {
                error!(pool = %state.pool.url, "Error: \"{}\", code: {}", rpc_error.message, rpc_error.code);
            }

            if is_critical_error(&rpc_error.message) {
                self.begin_close(state, Teardown::Critical(rpc_error.message), notices);
            } else if response.id == LOGIN_ID {
                self.begin_close(state, Teardown::Rejected(rpc_error.message), notices);
            }

            if let Some((callback, rtt)) = callback {
                notices.push(Notice::Callback(callback, response, rtt));
            }
            return;
        }

        if let Some((callback, rtt)) = callback {
            notices.push(Notice::Callback(callback, response, rtt));
            return;
        }

        if response.id == LOGIN_ID {
            if state.phase == Phase::Authenticating {
                self.on_login_result(state, response.result, now, notices);
            } else {
                debug!(pool = %state.pool.url, "Ignoring login response while {}", state.phase);
            }
            return;
        }

        self.resolve_submit(state, response.id, None, now, notices);
    }

    fn resolve_submit(
        &self,
        state: &mut State,
        id: i64,
        error: Option<&str>,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) -> bool {
        match state.submits.resolve(id, now) {
            Some(result) => {
                debug!(pool = %state.pool.url, "Submit #{} resolved in {:?}", id, result.elapsed());
                notices.push(Notice::Resolved(result, error.map(str::to_string)));
                true
            }
            None => false,
        }
    }

    fn on_login_result(&self, state: &mut State, result: Option<Value>, now: Instant, notices: &mut Vec<Notice>) {
        let result = result.unwrap_or(Value::Null);

        let Some(rpc_id) = result.get("id").and_then(Value::as_str) else {
            if !self.quiet {
                error!(pool = %state.pool.url, "Login error code: {}", LOGIN_MISSING_ID);
            }
            self.begin_close(state, Teardown::Protocol(LOGIN_MISSING_ID), notices);
            return;
        };

        state.rpc_id = Some(rpc_id.to_string());
        state.extensions = ExtensionSet::from_login_result(&result);
        state.jobs.begin_session();

        let mut job_notice = None;
        if let Some(params) = result.get("job") {
            match self.accept_job(state, params) {
                Ok(job) => job_notice = Some(Notice::Job(job, params.clone())),
                Err(reason) => {
                    self.begin_close(state, reason, notices);
                    return;
                }
            }
        }

        state.phase = Phase::Ready;
        state.failures = FailureCount::Attempts(0);

        if state.extensions.is_active(Extension::Keepalive, &state.pool) {
            state.deadlines.keepalive = Some(now + state.pool.keepalive_interval());
        }

        info!(pool = %state.pool.url, "Logged in, extensions {}", state.extensions);

        notices.push(Notice::LoginSuccess);
        notices.extend(job_notice);
    }

    fn on_notification(&self, state: &mut State, notification: Notification, notices: &mut Vec<Notice>) {
        if let Some(rpc_error) = &notification.error {
            if !self.quiet {
                error!(pool = %state.pool.url, "Error: \"{}\", code: {}", rpc_error.message, rpc_error.code);
            }
            return;
        }

        match notification.method {
            Method::Job => {
                if state.phase != Phase::Ready {
                    debug!(pool = %state.pool.url, "Ignoring job while {}", state.phase);
                    return;
                }

                match self.accept_job(state, &notification.params) {
                    Ok(job) => notices.push(Notice::Job(job, notification.params)),
                    Err(reason) => {
                        self.begin_close(state, reason, notices);
                    }
                }
            }
            other => {
                if !self.quiet {
                    warn!(pool = %state.pool.url, "Unsupported method: \"{}\"", other.as_str());
                }
            }
        }
    }

    fn accept_job(&self, state: &mut State, params: &Value) -> std::result::Result<Job, Teardown> {
        let ctx = JobContext {
            pool: &state.pool,
            nicehash: state.extensions.is_active(Extension::Nicehash, &state.pool),
            rpc_id: state.rpc_id.as_deref(),
        };

        let job = parse_job(params, &ctx, |algorithm| self.listener.on_verify_algorithm(algorithm))
            .map_err(|e| {
                if !self.quiet {
                    error!(pool = %state.pool.url, "Job rejected, code {}: {}", e.code(), e);
                }
                Teardown::Protocol(e.code())
            })?;

        match state.jobs.admit(job.clone()) {
            Admission::Accepted => {
                debug!(pool = %state.pool.url, "New job {}", job);
                Ok(job)
            }
            Admission::Duplicate => {
                if !self.quiet {
                    warn!(pool = %state.pool.url, "Duplicate job {} received, reconnect", job.id());
                }
                Err(Teardown::DuplicateJob(job.id().to_string()))
            }
        }
    }

    fn on_tick(&self, state: &mut State, now: Instant, notices: &mut Vec<Notice>) {
        match state.phase {
            Phase::Connecting | Phase::Authenticating | Phase::Ready
                if elapsed(state.deadlines.expire, now) =>
            {
                if !self.quiet {
                    warn!(pool = %state.pool.url, "Timeout while {}", state.phase);
                }
                self.begin_close(state, Teardown::Timeout, notices);
            }
            Phase::Ready if elapsed(state.deadlines.keepalive, now) => {
                state.deadlines.keepalive = None;

                if let Some(rpc_id) = state.rpc_id.clone() {
                    let id = state.correlator.next_sequence();
                    if self
                        .send_request(state, &Request::keepalived(id, &rpc_id), now, notices)
                        .is_err()
                    {
                        debug!(pool = %state.pool.url, "Keepalive not sent");
                    }
                }
            }
            _ => {}
        }
    }
}
