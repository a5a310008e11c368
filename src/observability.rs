//! Logging setup plus the server lifecycle events.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{env_flag, env_value, DashboardConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Unparseable values fall back to the default instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_value("HEXWATCH_LOG_LEVEL").unwrap_or(defaults.level),
            format: env_value("HEXWATCH_LOG_FORMAT")
                .and_then(|raw| LogFormat::parse(&raw))
                .unwrap_or(defaults.format),
            include_target: env_flag("HEXWATCH_LOG_TARGET").unwrap_or(defaults.include_target),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let registry = tracing_subscriber::registry().with(config.filter());

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(config.include_target))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(config.include_target))
            .try_init()?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "dashboard_server",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format
    );
}

pub fn log_config_loaded(config: &DashboardConfig) {
    info!(
        component = "dashboard_server",
        event = "config.loaded",
        chain = config.chain.as_str(),
        http_timeout_ms = config.http_timeout_ms,
        max_retries = config.max_retries,
        send_target = %config.flush_targets.send,
        receive_target = %config.flush_targets.receive
    );
}

pub fn log_sources_selected(chain: &str, subgraph_url: &str, csv_source: &str) {
    info!(
        component = "dashboard_server",
        event = "source.selected",
        chain,
        subgraph_url,
        csv_source
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = "/api/lobby,/api/stakes,/api/flush,/api/flush/sort,/flush"
    );
}
