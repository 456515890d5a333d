//! Configuration management for the pool client
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON) with validation and defaults.

use crate::classify::ReconnectPolicy;
use crate::codec::Envelope;
use crate::{Algorithm, Coin, Error, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Keepalive interval used when the pool negotiates keepalive but none is configured
pub const DEFAULT_KEEPALIVE_SECS: u64 = 60;

/// Initial pause between retries, in seconds
pub const DEFAULT_RETRY_PAUSE_SECS: u64 = 5;

/// Cap on the pause between retries, in seconds
pub const DEFAULT_MAX_RETRY_PAUSE_SECS: u64 = 60;

/// How the pool hands out work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolMode {
    /// Pool sends complete work blobs
    #[default]
    Pool,
    /// Client builds its own template from `extra_nonce` and `pool_wallet`
    SelfSelect,
}

impl fmt::Display for PoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolMode::Pool => write!(f, "pool"),
            PoolMode::SelfSelect => write!(f, "self-select"),
        }
    }
}

/// Connection settings for a single pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Login (usually the wallet address)
    pub user: String,
    /// Password
    #[serde(default = "default_password")]
    pub password: String,
    /// Optional rig identifier
    #[serde(default)]
    pub rig_id: Option<String>,
    /// Fixed algorithm, used when jobs carry no `algo` field
    #[serde(default)]
    pub algo: Option<Algorithm>,
    /// Coin, used to derive the algorithm from the blob version
    #[serde(default)]
    pub coin: Option<Coin>,
    /// Force nicehash nonce handling
    #[serde(default)]
    pub nicehash: bool,
    /// Keepalive interval in seconds, 0 disables
    #[serde(default)]
    pub keepalive: u64,
    /// Work distribution mode
    #[serde(default)]
    pub mode: PoolMode,
    /// Disabled pools refuse to connect
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PoolConfig {
    /// Create a pool config with defaults for everything but url and user
    pub fn new(url: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: default_password(),
            rig_id: None,
            algo: None,
            coin: None,
            nicehash: false,
            keepalive: 0,
            mode: PoolMode::Pool,
            enabled: true,
        }
    }

    /// Whether the pool runs in self-select mode
    pub fn is_self_select(&self) -> bool {
        self.mode == PoolMode::SelfSelect
    }

    /// Interval between keepalive pings
    pub fn keepalive_interval(&self) -> Duration {
        if self.keepalive > 0 {
            Duration::from_secs(self.keepalive)
        } else {
            Duration::from_secs(DEFAULT_KEEPALIVE_SECS)
        }
    }

    /// Validate the pool settings
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("Invalid pool URL {}: {}", self.url, e)))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::config(format!(
                "Pool URL must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(Error::config("Pool URL has no host"));
        }

        if self.user.is_empty() {
            return Err(Error::config("Pool user must not be empty"));
        }

        Ok(())
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level: tracing::Level = (*self).into();
        write!(f, "{}", level.as_str().to_ascii_lowercase())
    }
}

/// Complete configuration for the pool client
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "ws-stratum-client",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mining pool client over WebSocket",
    long_about = "Logs in to a mining pool over WebSocket, tracks jobs and keeps the session alive across failures"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE", env = "WS_STRATUM_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Pool WebSocket URL
    #[arg(short = 'o', long, env = "WS_STRATUM_URL")]
    #[serde(default)]
    pub url: Option<String>,

    /// Pool login (wallet address)
    #[arg(short = 'u', long, env = "WS_STRATUM_USER")]
    #[serde(default)]
    pub user: Option<String>,

    /// Pool password
    #[arg(short = 'p', long = "pass", env = "WS_STRATUM_PASS")]
    #[serde(default)]
    pub password: Option<String>,

    /// Rig identifier sent at login
    #[arg(long)]
    #[serde(default)]
    pub rig_id: Option<String>,

    /// Algorithm, when the pool does not send one
    #[arg(short = 'a', long)]
    #[serde(default)]
    pub algo: Option<String>,

    /// Coin, used to pick the algorithm from the blob version
    #[arg(long)]
    #[serde(default)]
    pub coin: Option<String>,

    /// Force nicehash nonce handling
    #[arg(long)]
    #[serde(default)]
    pub nicehash: bool,

    /// Keepalive interval in seconds (0 disables) [default: 0]
    #[arg(short = 'k', long)]
    #[serde(default)]
    pub keepalive: Option<u64>,

    /// Self-select mode
    #[arg(long)]
    #[serde(default)]
    pub self_select: bool,

    /// Frame envelope used on the WebSocket [default: base64]
    #[arg(long, value_enum)]
    #[serde(default)]
    pub envelope: Option<Envelope>,

    /// User agent sent at login
    #[arg(long)]
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Suppress protocol warnings and errors in the log
    #[arg(short = 'q', long)]
    #[serde(default)]
    pub quiet: bool,

    /// Retries before giving up (0 retries forever) [default: 0]
    #[arg(short = 'r', long)]
    #[serde(default)]
    pub retries: Option<u32>,

    /// Initial pause between retries in seconds [default: 5]
    #[arg(short = 'R', long)]
    #[serde(default)]
    pub retry_pause: Option<u64>,

    /// Maximum pause between retries in seconds [default: 60]
    #[arg(long)]
    #[serde(default)]
    pub max_retry_pause: Option<u64>,

    /// Log level [default: info]
    #[arg(short = 'l', long, value_enum)]
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Log as JSON
    #[arg(long)]
    #[serde(default)]
    pub log_json: bool,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the command line and, if given, a config file
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = config.config_file.clone() {
            let file_config = Self::load_from_file(&config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config.with_defaults())
    }

    /// Load configuration from file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config (CLI takes precedence)
    fn merge_with_file(mut self, file: Self) -> Self {
        // Values given on the command line win; switches are OR-ed
        self.url = self.url.or(file.url);
        self.user = self.user.or(file.user);
        self.password = self.password.or(file.password);
        self.rig_id = self.rig_id.or(file.rig_id);
        self.algo = self.algo.or(file.algo);
        self.coin = self.coin.or(file.coin);
        self.user_agent = self.user_agent.or(file.user_agent);
        self.log_file = self.log_file.or(file.log_file);
        self.keepalive = self.keepalive.or(file.keepalive);
        self.envelope = self.envelope.or(file.envelope);
        self.retries = self.retries.or(file.retries);
        self.retry_pause = self.retry_pause.or(file.retry_pause);
        self.max_retry_pause = self.max_retry_pause.or(file.max_retry_pause);
        self.log_level = self.log_level.or(file.log_level);
        self.nicehash |= file.nicehash;
        self.self_select |= file.self_select;
        self.quiet |= file.quiet;
        self.log_json |= file.log_json;

        self
    }

    /// Fill every unset option with its default, so the printed config is complete
    fn with_defaults(mut self) -> Self {
        self.keepalive = Some(self.keepalive.unwrap_or(0));
        self.envelope = Some(self.envelope());
        self.retries = Some(self.retries.unwrap_or(0));
        self.retry_pause = Some(self.retry_pause());
        self.max_retry_pause = Some(self.max_retry_pause());
        self.log_level = Some(self.log_level());
        self
    }

    /// Frame envelope
    pub fn envelope(&self) -> Envelope {
        self.envelope.unwrap_or_default()
    }

    /// Log level
    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or(LogLevel::Info)
    }

    fn retry_pause(&self) -> u64 {
        self.retry_pause.unwrap_or(DEFAULT_RETRY_PAUSE_SECS)
    }

    fn max_retry_pause(&self) -> u64 {
        self.max_retry_pause.unwrap_or(DEFAULT_MAX_RETRY_PAUSE_SECS)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.pool()?.validate()?;

        if self.retry_pause() == 0 {
            return Err(Error::config("Retry pause must be greater than 0"));
        }

        if self.max_retry_pause() < self.retry_pause() {
            return Err(Error::config(
                "Maximum retry pause must not be smaller than the retry pause",
            ));
        }

        Ok(())
    }

    /// Build the pool settings
    pub fn pool(&self) -> Result<PoolConfig> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| Error::config("Pool URL is required (--url)"))?;
        let user = self
            .user
            .clone()
            .ok_or_else(|| Error::config("Pool user is required (--user)"))?;

        let mut pool = PoolConfig::new(url, user);
        if let Some(password) = &self.password {
            pool.password = password.clone();
        }
        pool.rig_id = self.rig_id.clone();
        pool.algo = self.algo.as_deref().map(str::parse).transpose()?;
        pool.coin = self.coin.as_deref().map(str::parse).transpose()?;
        pool.nicehash = self.nicehash;
        pool.keepalive = self.keepalive.unwrap_or(0);
        pool.mode = if self.self_select {
            PoolMode::SelfSelect
        } else {
            PoolMode::Pool
        };

        Ok(pool)
    }

    /// User agent sent at login
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", crate::APP_NAME, crate::APP_VERSION))
    }

    /// Retry policy for the supervisor
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.retries.unwrap_or(0),
            Duration::from_secs(self.retry_pause()),
            Duration::from_secs(self.max_retry_pause()),
        )
    }
}

// Default value functions for serde
fn default_password() -> String { "x".to_string() }
fn default_enabled() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{FailureCount, Teardown};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const URL: &str = "ws://pool.example.com:8080/ws";

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["ws-stratum-client", "-o", URL, "-u", "wallet"]).unwrap();

        assert_eq!(config.envelope(), Envelope::Base64);
        assert_eq!(config.log_level(), LogLevel::Info);
        assert_eq!(config.retry_pause(), DEFAULT_RETRY_PAUSE_SECS);
        assert!(!config.quiet);
        assert!(config.validate().is_ok());

        let pool = config.pool().unwrap();
        assert_eq!(pool.password, "x");
        assert_eq!(pool.mode, PoolMode::Pool);
        assert_eq!(pool.keepalive_interval(), Duration::from_secs(DEFAULT_KEEPALIVE_SECS));
    }

    #[test]
    fn test_pool_from_cli() {
        let config = Config::try_parse_from([
            "ws-stratum-client", "-o", URL, "-u", "wallet", "-p", "secret",
            "--rig-id", "rig1", "--coin", "monero", "--nicehash", "-k", "30", "--self-select",
        ])
        .unwrap();

        let pool = config.pool().unwrap();
        assert_eq!(pool.password, "secret");
        assert_eq!(pool.rig_id.as_deref(), Some("rig1"));
        assert_eq!(pool.coin, Some(Coin::Monero));
        assert!(pool.nicehash);
        assert!(pool.is_self_select());
        assert_eq!(pool.keepalive_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_pool_settings() {
        let config = Config::try_parse_from(["ws-stratum-client", "-o", "http://x:1", "-u", "w"]).unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from(["ws-stratum-client", "-u", "w"]).unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::try_parse_from(["ws-stratum-client", "-o", URL, "-u", "w", "-a", "sha256d"]).unwrap();
        assert!(config.pool().is_err());
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
url: "wss://pool.example.com/ws"
user: "wallet-from-file"
password: "file-pass"
algo: "rx/0"
keepalive: 45
envelope: plain
retries: 3
retry_pause: 9
log_level: debug
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let file = Config::load_from_file(&temp_file.path().to_path_buf()).await.unwrap();
        assert_eq!(file.envelope, Some(Envelope::Plain));

        let cli = Config::try_parse_from(["ws-stratum-client", "-u", "cli-wallet"]).unwrap();
        let merged = cli.merge_with_file(file);
        let pool = merged.pool().unwrap();

        assert_eq!(merged.envelope(), Envelope::Plain);
        assert_eq!(merged.log_level(), LogLevel::Debug);
        let policy = merged.reconnect_policy();
        let reason = Teardown::Timeout;
        assert_eq!(policy.next_delay(FailureCount::Attempts(1), &reason), Some(Duration::from_secs(9)));
        assert_eq!(policy.next_delay(FailureCount::Attempts(4), &reason), None);

        assert_eq!(pool.url, "wss://pool.example.com/ws");
        assert_eq!(pool.user, "cli-wallet");
        assert_eq!(pool.password, "file-pass");
        assert_eq!(pool.algo, Some(Algorithm::Rx0));
        assert_eq!(pool.keepalive, 45);
        assert!(merged.validate().is_ok());
    }

    #[tokio::test]
    async fn test_cli_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "url: \"{}\"\nuser: wallet\nenvelope: plain\nretry_pause: 9\nkeepalive: 45\n", URL).unwrap();
        let file = Config::load_from_file(&temp_file.path().to_path_buf()).await.unwrap();

        let cli = Config::try_parse_from([
            "ws-stratum-client", "--envelope", "base64", "-R", "2", "-k", "0", "-l", "warn",
        ])
        .unwrap();
        let merged = cli.merge_with_file(file).with_defaults();

        assert_eq!(merged.envelope, Some(Envelope::Base64));
        assert_eq!(merged.retry_pause, Some(2));
        assert_eq!(merged.keepalive, Some(0));
        assert_eq!(merged.log_level, Some(LogLevel::Warn));
        assert_eq!(merged.max_retry_pause, Some(DEFAULT_MAX_RETRY_PAUSE_SECS));
        assert_eq!(merged.retries, Some(0));
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
