//! Session flow tests
//!
//! Drive a full pool session through the in-memory transport: login, job
//! admission, submissions, server errors and teardown.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use ws_stratum_client::classify::{FailureCount, Teardown};
use ws_stratum_client::client::{ClientOptions, Phase};
use ws_stratum_client::codec::{Codec, Envelope};
use ws_stratum_client::correlator::SubmitResult;
use ws_stratum_client::extensions::Extension;
use ws_stratum_client::job::{Job, JobResult, MIN_BLOB_SIZE};
use ws_stratum_client::transport::MemoryConnector;
use ws_stratum_client::{Algorithm, PoolClient, PoolConfig, SessionListener};

#[derive(Default)]
struct Recorder {
    jobs: Mutex<Vec<String>>,
    results: Mutex<Vec<(i64, Option<String>)>>,
    closes: Mutex<Vec<(FailureCount, Teardown)>>,
    connect_errors: Mutex<Vec<String>>,
    logins: AtomicUsize,
}

impl SessionListener for Recorder {
    fn on_login(&self, params: &mut Map<String, Value>) {
        params.insert("algo".into(), json!(["cn/r"]));
    }

    fn on_login_success(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_received(&self, job: &Job, _params: &Value) {
        self.jobs.lock().push(job.id().to_string());
    }

    fn on_result_accepted(&self, result: &SubmitResult, error: Option<&str>) {
        self.results.lock().push((result.seq, error.map(str::to_string)));
    }

    fn on_connect_error(&self, message: &str) {
        self.connect_errors.lock().push(message.to_string());
    }

    fn on_close(&self, failures: FailureCount, reason: &Teardown) {
        self.closes.lock().push((failures, reason.clone()));
    }
}

struct Harness {
    client: PoolClient,
    connector: MemoryConnector,
    codec: Codec,
    recorder: Arc<Recorder>,
}

impl Harness {
    fn new(envelope: Envelope) -> Self {
        let mut pool = PoolConfig::new("ws://127.0.0.1:3333", "wallet");
        pool.algo = Some(Algorithm::CnR);

        let connector = MemoryConnector::new();
        let recorder = Arc::new(Recorder::default());
        let codec = Codec::new(envelope);
        let options = ClientOptions {
            codec,
            ..ClientOptions::default()
        };
        let client = PoolClient::with_options(pool, options, Arc::new(connector.clone()), recorder.clone());

        Self {
            client,
            connector,
            codec,
            recorder,
        }
    }

    fn plain() -> Self {
        Self::new(Envelope::Plain)
    }

    fn deliver(&self, document: Value) {
        self.connector.deliver(self.codec.encode(&document));
    }

    fn sent(&self) -> Vec<Value> {
        self.connector
            .sent()
            .iter()
            .map(|frame| self.codec.decode(frame).unwrap())
            .collect()
    }

    fn login(&self, extensions: Value) {
        self.client.connect().unwrap();
        self.connector.open();
        self.deliver(json!({
            "id": 1,
            "jsonrpc": "2.0",
            "error": null,
            "result": {
                "id": "abc123",
                "status": "OK",
                "extensions": extensions,
                "job": job("j1", 0),
            }
        }));
    }

    fn job_ids(&self) -> Vec<String> {
        self.recorder.jobs.lock().clone()
    }
}

fn blob(marker: u8) -> String {
    let mut blob = vec![0u8; MIN_BLOB_SIZE];
    blob[0] = 1;
    blob[1] = marker;
    hex::encode(blob)
}

fn job(id: &str, marker: u8) -> Value {
    json!({"job_id": id, "target": "ffff0000", "blob": blob(marker)})
}

fn share(client: &PoolClient) -> JobResult {
    let job = client.job().unwrap();
    let mut hash = [0u8; 32];
    hash[31] = 0x01;
    JobResult::new(&job, 0x0102_0304, hash)
}

#[test]
fn test_login_uses_reserved_id() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let sent = harness.sent();
    assert_eq!(sent[0]["id"], 1);
    assert_eq!(sent[0]["method"], "login");
    assert_eq!(sent[0]["params"]["login"], "wallet");
    assert_eq!(sent[0]["params"]["algo"], json!(["cn/r"]));

    let id = assert_ok!(harness.client.send("getjob", json!({"id": "abc123"})));
    let submit = assert_ok!(harness.client.submit(&share(&harness.client)));
    assert_eq!((id, submit), (2, 3));

    let ids: Vec<i64> = harness.sent()[1..].iter().map(|m| m["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_login_with_embedded_job() {
    let harness = Harness::plain();
    harness.login(json!([]));

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(harness.client.rpc_id().as_deref(), Some("abc123"));
    assert_eq!(harness.client.failures(), FailureCount::Attempts(0));
    assert_eq!(harness.recorder.logins.load(Ordering::SeqCst), 1);
    assert_eq!(harness.job_ids(), vec!["j1"]);

    let current = harness.client.job().unwrap();
    assert_eq!(current.client_id(), Some("abc123"));
    assert_eq!(current.algorithm(), Some(Algorithm::CnR));
    assert!(current.diff() > 0);
}

#[test]
fn test_duplicate_job_closes_session() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.deliver(json!({"jsonrpc": "2.0", "method": "job", "params": job("j1", 0)}));

    assert_eq!(harness.client.phase(), Phase::Closing);
    assert_eq!(harness.connector.disconnects(), 1);
    assert_eq!(harness.job_ids(), vec!["j1"]);

    harness.connector.close();
    assert_eq!(harness.client.phase(), Phase::Disconnected);
    assert_eq!(
        *harness.recorder.closes.lock(),
        vec![(FailureCount::Attempts(1), Teardown::DuplicateJob("j1".into()))]
    );
}

#[test]
fn test_new_job_replaces_current() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.deliver(json!({"jsonrpc": "2.0", "method": "job", "params": job("j2", 7)}));

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(harness.job_ids(), vec!["j1", "j2"]);
    assert_eq!(harness.client.job().unwrap().id(), "j2");
}

#[test]
fn test_invalid_job_closes_with_code() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.deliver(json!({"jsonrpc": "2.0", "method": "job", "params": {"job_id": "j2", "target": "ffff0000", "blob": "0100"}}));

    assert_eq!(harness.client.phase(), Phase::Closing);
    harness.connector.close();
    assert_eq!(harness.recorder.closes.lock()[0].1, Teardown::Protocol(4));
}

#[test]
fn test_submit_accepted() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let id = harness.client.submit(&share(&harness.client)).unwrap();
    assert_eq!(harness.client.pending_submissions(), 1);

    let sent = harness.sent();
    let submit = sent.last().unwrap();
    assert_eq!(submit["method"], "submit");
    assert_eq!(submit["params"]["id"], "abc123");
    assert_eq!(submit["params"]["job_id"], "j1");
    assert_eq!(submit["params"]["nonce"], "04030201");
    assert!(submit["params"].get("algo").is_none());

    harness.deliver(json!({"id": id, "jsonrpc": "2.0", "error": null, "result": {"status": "OK"}}));

    assert_eq!(harness.client.pending_submissions(), 0);
    assert_eq!(*harness.recorder.results.lock(), vec![(id, None)]);
}

#[test]
fn test_critical_submit_error_closes_session() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let id = harness.client.submit(&share(&harness.client)).unwrap();
    assert_eq!(id, 2);

    harness.deliver(json!({"id": 2, "error": {"code": -1, "message": "Unauthenticated"}}));

    assert_eq!(harness.client.phase(), Phase::Closing);
    assert_eq!(harness.client.pending_submissions(), 0);
    assert_eq!(
        *harness.recorder.results.lock(),
        vec![(2, Some("Unauthenticated".to_string()))]
    );

    harness.connector.close();
    assert_eq!(
        harness.recorder.closes.lock()[0].1,
        Teardown::Critical("Unauthenticated".into())
    );
}

#[test]
fn test_login_job_must_be_object() {
    let harness = Harness::plain();
    harness.client.connect().unwrap();
    harness.connector.open();

    harness.deliver(json!({
        "id": 1,
        "jsonrpc": "2.0",
        "error": null,
        "result": {"id": "abc123", "status": "OK", "job": "garbage-not-an-object"}
    }));

    assert_eq!(harness.client.phase(), Phase::Closing);
    assert_eq!(harness.recorder.logins.load(Ordering::SeqCst), 0);
    assert!(harness.job_ids().is_empty());

    harness.connector.close();
    assert_eq!(harness.recorder.closes.lock()[0].1, Teardown::Protocol(2));
}

#[test]
fn test_rejected_share_keeps_session() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let id = harness.client.submit(&share(&harness.client)).unwrap();
    harness.deliver(json!({"id": id, "error": {"code": -1, "message": "Low difficulty share"}}));

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(
        *harness.recorder.results.lock(),
        vec![(id, Some("Low difficulty share".to_string()))]
    );
}

#[test]
fn test_unmatched_error_keeps_session() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.deliver(json!({"id": 99, "error": {"code": -1, "message": "Low difficulty share"}}));

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(harness.connector.disconnects(), 0);
    assert!(harness.recorder.results.lock().is_empty());
}

#[test]
fn test_login_error_rejects() {
    let harness = Harness::plain();
    harness.client.connect().unwrap();
    harness.connector.open();

    harness.deliver(json!({"id": 1, "error": {"code": -1, "message": "Invalid payment address provided"}}));

    assert_eq!(harness.client.phase(), Phase::Closing);
    harness.connector.close();
    assert_eq!(
        harness.recorder.closes.lock()[0].1,
        Teardown::Rejected("Invalid payment address provided".into())
    );
}

#[test]
fn test_disconnect_is_idempotent() {
    let harness = Harness::plain();
    harness.login(json!([]));

    assert!(harness.client.disconnect());
    assert!(harness.client.disconnect());
    assert_eq!(harness.connector.disconnects(), 1);

    harness.connector.close();
    assert!(harness.client.disconnect());

    assert_eq!(
        *harness.recorder.closes.lock(),
        vec![(FailureCount::Halted, Teardown::Requested)]
    );
    assert_eq!(harness.client.phase(), Phase::Disconnected);
    assert!(harness.client.rpc_id().is_none());
    assert!(harness.client.job().is_none());
}

#[test]
fn test_no_callbacks_after_teardown() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let id = harness
        .client
        .request("getjob", json!({"id": "abc123"}), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let submit = harness.client.submit(&share(&harness.client)).unwrap();

    harness.client.disconnect();
    assert_eq!(harness.client.pending_requests(), 0);
    assert_eq!(harness.client.pending_submissions(), 0);

    harness.deliver(json!({"id": id, "result": {"status": "OK", "padding": "xxxx"}}));
    harness.deliver(json!({"id": submit, "result": {"status": "OK", "padding": "xxxx"}}));
    harness.deliver(json!({"jsonrpc": "2.0", "method": "job", "params": job("j2", 7)}));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(harness.recorder.results.lock().is_empty());
    assert_eq!(harness.job_ids(), vec!["j1"]);
}

#[test]
fn test_malformed_frame_keeps_session() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.connector.deliver("{not json at all, but long enough to try}");
    harness.connector.deliver("short");

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert!(harness.connector.is_open());
    assert_eq!(harness.connector.disconnects(), 0);
}

#[test]
fn test_base64_envelope() {
    let harness = Harness::new(Envelope::Base64);
    harness.login(json!(["keepalive"]));

    let frame = &harness.connector.sent()[0];
    assert!(!frame.starts_with('{'));
    assert_eq!(harness.sent()[0]["method"], "login");

    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(harness.job_ids(), vec!["j1"]);
    assert!(harness.client.has_extension(Extension::Keepalive));

    // Plain JSON is not a valid frame under the base64 envelope
    harness.connector.deliver(json!({"jsonrpc": "2.0", "method": "job", "params": job("j2", 7)}).to_string());
    assert_eq!(harness.job_ids(), vec!["j1"]);
    assert_eq!(harness.client.phase(), Phase::Ready);
}

#[test]
fn test_algo_extension_tags_submit() {
    let harness = Harness::plain();
    harness.login(json!(["algo", "nicehash"]));

    assert!(harness.client.has_extension(Extension::Algo));
    assert!(harness.client.has_extension(Extension::Nicehash));

    harness.client.submit(&share(&harness.client)).unwrap();
    let sent = harness.sent();
    assert_eq!(sent.last().unwrap()["params"]["algo"], "cn/r");
}

#[test]
fn test_stale_share_refused() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let mut result = share(&harness.client);
    result.client_id = "someone-else".into();
    assert_err!(harness.client.submit(&result));
    assert_eq!(harness.client.pending_submissions(), 0);
    assert_eq!(harness.client.phase(), Phase::Ready);
}

#[test]
fn test_reconnect_after_remote_close() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.connector.close();
    assert_eq!(harness.client.phase(), Phase::Disconnected);
    assert_eq!(harness.client.failures(), FailureCount::Attempts(1));

    harness.login(json!([]));
    assert_eq!(harness.connector.connections(), 2);
    assert_eq!(harness.client.phase(), Phase::Ready);
    assert_eq!(harness.client.failures(), FailureCount::Attempts(0));
    assert_eq!(harness.job_ids(), vec!["j1", "j1"]);
}

#[test]
fn test_handshake_failure_reports_connect_error() {
    let harness = Harness::plain();
    harness.client.connect().unwrap();
    assert_eq!(harness.client.phase(), Phase::Connecting);

    harness.connector.fail("handshake refused");

    assert_eq!(harness.client.phase(), Phase::Disconnected);
    assert_eq!(*harness.recorder.connect_errors.lock(), vec!["handshake refused"]);
    assert_eq!(
        *harness.recorder.closes.lock(),
        vec![(
            FailureCount::Attempts(1),
            Teardown::Transport("handshake refused".into())
        )]
    );
}

#[test]
fn test_login_timeout_closes() {
    let harness = Harness::plain();
    harness.client.connect().unwrap();
    harness.connector.open();
    assert_eq!(harness.client.phase(), Phase::Authenticating);

    let expire = harness.client.deadlines().expire.unwrap();
    harness.client.tick(expire);
    assert_eq!(harness.client.phase(), Phase::Closing);

    harness.connector.close();
    assert_eq!(
        *harness.recorder.closes.lock(),
        vec![(FailureCount::Attempts(1), Teardown::Timeout)]
    );
    assert!(harness.recorder.connect_errors.lock().is_empty());
}

#[test]
fn test_connect_to_switches_pool() {
    let harness = Harness::plain();
    harness.login(json!([]));

    let mut next = PoolConfig::new("ws://127.0.0.1:4444", "wallet");
    next.algo = Some(Algorithm::CnR);
    assert_err!(harness.client.connect_to(next.clone()));
    assert_eq!(harness.client.pool().url, "ws://127.0.0.1:3333");

    harness.client.disconnect();
    harness.connector.close();
    assert!(harness.client.failures().is_halted());

    assert_ok!(harness.client.connect_to(next));
    assert_eq!(harness.connector.connections(), 2);
    assert_eq!(harness.connector.url().as_deref(), Some("ws://127.0.0.1:4444"));
    assert_eq!(harness.client.pool().url, "ws://127.0.0.1:4444");
    assert_eq!(harness.client.phase(), Phase::Connecting);
    assert_eq!(harness.client.failures(), FailureCount::Attempts(0));
}

#[test]
fn test_disconnect_after_remote_close_halts() {
    let harness = Harness::plain();
    harness.login(json!([]));

    harness.connector.close();
    assert_eq!(harness.client.failures(), FailureCount::Attempts(1));

    assert!(harness.client.disconnect());
    assert_eq!(harness.client.failures(), FailureCount::Halted);
    assert_eq!(harness.recorder.closes.lock().len(), 1);
    assert_eq!(harness.client.phase(), Phase::Disconnected);
}
