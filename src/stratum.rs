//! JSON-RPC message shapes spoken with the pool
//!
//! Requests are built as typed structs and serialized through `serde`;
//! inbound documents are classified into responses and notifications by the
//! shape of their `id` and `method` fields.

use crate::job::JobResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Request id reserved for login
pub const LOGIN_ID: i64 = 1;

/// Protocol version tag sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Methods exchanged with the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Client authenticates
    Login,
    /// Client submits a share
    Submit,
    /// Client pings an idle connection
    Keepalived,
    /// Pool pushes new work
    Job,
    /// Anything else
    Other(String),
}

impl Method {
    /// Parse a method name
    pub fn parse(name: &str) -> Self {
        match name {
            "login" => Self::Login,
            "submit" => Self::Submit,
            "keepalived" => Self::Keepalived,
            "job" => Self::Job,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Submit => "submit",
            Self::Keepalived => "keepalived",
            Self::Job => "job",
            Self::Other(name) => name,
        }
    }
}

/// Outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl Request {
    /// Create a request with arbitrary params
    pub fn new(id: i64, method: &str, params: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }

    /// Login request; always uses [`LOGIN_ID`]
    pub fn login(params: Map<String, Value>) -> Self {
        Self::new(LOGIN_ID, Method::Login.as_str(), Value::Object(params))
    }

    /// Share submission
    pub fn submit(id: i64, rpc_id: &str, result: &JobResult, algo: Option<&str>) -> Self {
        let mut params = Map::new();
        params.insert("id".into(), json!(rpc_id));
        params.insert("job_id".into(), json!(result.job_id));
        params.insert("nonce".into(), json!(result.nonce_hex()));
        params.insert("result".into(), json!(result.result_hex()));

        if let Some(sig) = result.sig_hex() {
            params.insert("sig".into(), json!(sig));
        }

        if let Some(algo) = algo {
            params.insert("algo".into(), json!(algo));
        }

        Self::new(id, Method::Submit.as_str(), Value::Object(params))
    }

    /// Keepalive ping
    pub fn keepalived(id: i64, rpc_id: &str) -> Self {
        Self::new(id, Method::Keepalived.as_str(), json!({ "id": rpc_id }))
    }

    /// Document form, ready for the codec
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "jsonrpc": self.jsonrpc,
            "method": self.method,
            "params": self.params,
        })
    }
}

/// Login parameters before listener additions
#[derive(Debug, Clone, Serialize)]
pub struct LoginParams<'a> {
    pub login: &'a str,
    pub pass: &'a str,
    pub agent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rigid: Option<&'a str>,
}

impl LoginParams<'_> {
    /// Params as a mutable JSON object
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("login".into(), json!(self.login));
        map.insert("pass".into(), json!(self.pass));
        map.insert("agent".into(), json!(self.agent));

        if let Some(rigid) = self.rigid {
            map.insert("rigid".into(), json!(rigid));
        }

        map
    }
}

/// Error object carried by a response or notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Read an error object; anything but an object means "no error"
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        let error = value?.as_object()?;

        Some(Self {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        })
    }
}

/// Response to one of our requests
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: i64,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl Response {
    /// Whether the pool reported an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Unsolicited message from the pool
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: Method,
    pub params: Value,
    pub error: Option<RpcError>,
}

/// Classified inbound document
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Notification(Notification),
    /// Neither an integer id nor a method name
    Unknown,
}

impl Inbound {
    /// Classify a decoded document
    ///
    /// An integer `id` makes a response, otherwise a string `method` makes a
    /// notification.
    pub fn classify(mut document: Value) -> Self {
        let id = document.get("id").and_then(Value::as_i64);

        if let Some(id) = id {
            return Inbound::Response(Response {
                id,
                result: document.get_mut("result").map(Value::take),
                error: RpcError::from_value(document.get("error")),
            });
        }

        match document.get("method").and_then(Value::as_str) {
            Some(method) => Inbound::Notification(Notification {
                method: Method::parse(method),
                params: document.get_mut("params").map(Value::take).unwrap_or(Value::Null),
                error: RpcError::from_value(document.get("error")),
            }),
            None => Inbound::Unknown,
        }
    }
}
