//! WebSocket Stratum Client - Main Application
//!
//! Connects to one pool, logs jobs and submission results, and keeps the
//! session alive until interrupted.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ws_stratum_client::{
    classify::{FailureCount, Teardown},
    client::ClientOptions,
    codec::Codec,
    correlator::SubmitResult,
    job::Job,
    strategy::Supervisor,
    transport::WebSocketConnector,
    Config, Error, PoolClient, Result, SessionListener, APP_DESCRIPTION, APP_NAME, APP_VERSION,
};

/// Listener that reports session activity through the log
#[derive(Debug, Default)]
struct LoggingListener;

impl SessionListener for LoggingListener {
    fn on_login_success(&self) {
        info!("Login succeeded");
    }

    fn on_job_received(&self, job: &Job, _params: &serde_json::Value) {
        info!("New job {}", job);
    }

    fn on_result_accepted(&self, result: &SubmitResult, error: Option<&str>) {
        match error {
            None => info!(
                "Share #{} accepted (diff {}, {} ms)",
                result.seq,
                result.diff,
                result.elapsed().as_millis()
            ),
            Some(reason) => warn!(
                "Share #{} rejected: {} ({} ms)",
                result.seq,
                reason,
                result.elapsed().as_millis()
            ),
        }
    }

    fn on_connect_error(&self, message: &str) {
        warn!("Connect error: {}", message);
    }

    fn on_close(&self, failures: FailureCount, reason: &Teardown) {
        info!("Session closed: {} (failures: {})", reason, failures);
    }
}

/// Install the tracing subscriber; the guard must outlive logging
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level().to_string()));

    let text_layer = (!config.log_json).then(|| fmt::layer().with_target(false));
    let json_layer = config.log_json.then(|| fmt::layer().json());

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.log", APP_NAME));

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name)
                .build(directory)
                .map_err(|e| Error::config(format!("Cannot open log file {}: {}", path.display(), e)))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let config = Config::load().await?;
    let _log_guard = init_logging(&config)?;

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    let pool = config.pool()?;

    info!("Starting {} v{}: {}", APP_NAME, APP_VERSION, APP_DESCRIPTION);
    info!(
        "Configuration: pool={}, mode={}, envelope={:?}, keepalive={}s",
        pool.url, pool.mode, config.envelope(), pool.keepalive
    );

    let (listener, closes) = Supervisor::listener(Arc::new(LoggingListener));
    let options = ClientOptions {
        agent: config.user_agent(),
        quiet: config.quiet,
        codec: Codec::new(config.envelope()),
    };
    let connector = Arc::new(WebSocketConnector::current()?);
    let client = PoolClient::with_options(pool, options, connector, listener);

    let cancel = CancellationToken::new();
    let supervisor = tokio::spawn(
        Supervisor::new(client.clone(), config.reconnect_policy(), closes).run(cancel.clone()),
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, disconnecting");

    client.disconnect();
    cancel.cancel();

    if let Err(e) = supervisor.await {
        error!("Supervisor task failed: {}", e);
    }

    Ok(())
}

/// Print current configuration
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_printing() {
        let config = Config::try_parse_from([
            "ws-stratum-client",
            "-o",
            "ws://pool.example.com:8080",
            "-u",
            "wallet",
        ])
        .unwrap();

        assert!(print_configuration(&config).is_ok());
    }

    #[test]
    fn test_logging_listener_defaults() {
        let listener = LoggingListener;
        assert!(listener.on_verify_algorithm(&ws_stratum_client::Algorithm::Rx0));
    }
}
