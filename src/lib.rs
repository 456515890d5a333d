//! WebSocket Stratum Client
//!
//! An async client for the JSON-RPC mining-pool protocol carried over
//! WebSocket:
//! - Login with negotiated protocol extensions
//! - Job validation and deduplication
//! - Share submission tracking
//! - Critical pool error classification and reconnect scheduling

pub mod classify;
pub mod client;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod error;
pub mod extensions;
pub mod job;
pub mod strategy;
pub mod stratum;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::{PoolClient, SessionListener};
pub use config::{Config, PoolConfig};
pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "ws-stratum-client";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
