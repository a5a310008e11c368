//! Environment-driven dashboard configuration.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;

use crate::address::{is_valid_address, normalize_address};
use crate::flush::FlushTargets;
use crate::http::RetryPolicy;
use crate::links::Chain;

pub const DEFAULT_DASHBOARD_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CSV_SOURCE: &str = "public";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub bind_addr: SocketAddr,
    pub chain: Chain,
    pub subgraph_url: String,
    pub csv_source: String,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub flush_targets: FlushTargets,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let chain = Chain::PulseChain;
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            chain,
            subgraph_url: chain.default_subgraph_url().to_string(),
            csv_source: DEFAULT_CSV_SOURCE.to_string(),
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            max_retries: 0,
            flush_targets: FlushTargets::default(),
        }
    }
}

impl DashboardConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }
}

pub fn dashboard_config_from_env() -> Result<DashboardConfig, ConfigError> {
    let mut config = DashboardConfig::default();

    if let Some(raw) = env_value("HEXWATCH_DASHBOARD_ADDR") {
        config.bind_addr = raw.parse().map_err(|err| {
            ConfigError::invalid("HEXWATCH_DASHBOARD_ADDR", &raw, format!("{err}"))
        })?;
    }

    if let Some(raw) = env_value("HEXWATCH_CHAIN") {
        config.chain = Chain::parse(&raw).ok_or_else(|| {
            ConfigError::invalid("HEXWATCH_CHAIN", &raw, "expected pulsechain or ethereum")
        })?;
    }

    config.subgraph_url = match env_value("HEXWATCH_SUBGRAPH_URL") {
        Some(raw) if raw.starts_with("http://") || raw.starts_with("https://") => raw,
        Some(raw) => {
            return Err(ConfigError::invalid(
                "HEXWATCH_SUBGRAPH_URL",
                &raw,
                "expected an http(s) URL",
            ))
        }
        None => config.chain.default_subgraph_url().to_string(),
    };

    if let Some(raw) = env_value("HEXWATCH_CSV_SOURCE") {
        config.csv_source = raw;
    }

    if let Some(raw) = env_value("HEXWATCH_HTTP_TIMEOUT_MS") {
        config.http_timeout_ms = match raw.parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                return Err(ConfigError::invalid(
                    "HEXWATCH_HTTP_TIMEOUT_MS",
                    &raw,
                    "expected a positive integer",
                ))
            }
        };
    }

    if let Some(raw) = env_value("HEXWATCH_MAX_RETRIES") {
        config.max_retries = raw.parse().map_err(|_| {
            ConfigError::invalid("HEXWATCH_MAX_RETRIES", &raw, "expected a non-negative integer")
        })?;
    }

    if let Some(raw) = env_value("HEXWATCH_FLUSH_SEND_TARGET") {
        config.flush_targets.send = parse_target("HEXWATCH_FLUSH_SEND_TARGET", &raw)?;
    }
    if let Some(raw) = env_value("HEXWATCH_FLUSH_RECEIVE_TARGET") {
        config.flush_targets.receive = parse_target("HEXWATCH_FLUSH_RECEIVE_TARGET", &raw)?;
    }

    Ok(config)
}

fn parse_target(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let normalized = normalize_address(raw);
    if is_valid_address(&normalized) {
        Ok(normalized)
    } else {
        Err(ConfigError::invalid(key, raw, "expected a 0x-prefixed 40 hex digit address"))
    }
}

/// Trimmed value of `key`; blank counts as unset.
pub(crate) fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub(crate) fn env_flag(key: &str) -> Option<bool> {
    env_value(key).and_then(|raw| parse_bool(&raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock, PoisonError};

    use crate::flush::FLUSH_ADDRESS;

    /// Serializes env mutation across every test in the crate.
    pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(key, _)| (*key, env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            set_or_remove(key, *value);
        }

        let output = f();

        for (key, value) in &previous {
            set_or_remove(key, value.as_deref());
        }
        output
    }

    fn set_or_remove(key: &str, value: Option<&str>) {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    const ALL_KEYS: [&str; 8] = [
        "HEXWATCH_DASHBOARD_ADDR",
        "HEXWATCH_CHAIN",
        "HEXWATCH_SUBGRAPH_URL",
        "HEXWATCH_CSV_SOURCE",
        "HEXWATCH_HTTP_TIMEOUT_MS",
        "HEXWATCH_MAX_RETRIES",
        "HEXWATCH_FLUSH_SEND_TARGET",
        "HEXWATCH_FLUSH_RECEIVE_TARGET",
    ];

    fn with_config_env<R>(set: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = ALL_KEYS
            .iter()
            .map(|key| {
                let value = set.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
                (*key, value)
            })
            .collect();
        with_env_vars(&vars, f)
    }

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_config_env(&[], dashboard_config_from_env).unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_DASHBOARD_ADDR);
        assert_eq!(cfg.flush_targets.send, FLUSH_ADDRESS);
        assert_eq!(cfg.retry_policy().max_retries, 0);
    }

    #[test]
    fn chain_switch_changes_default_subgraph() {
        let cfg = with_config_env(&[("HEXWATCH_CHAIN", "ethereum")], dashboard_config_from_env)
            .unwrap();
        assert_eq!(cfg.chain, Chain::Ethereum);
        assert_eq!(cfg.subgraph_url, Chain::Ethereum.default_subgraph_url());
    }

    #[test]
    fn parses_overrides() {
        let cfg = with_config_env(
            &[
                ("HEXWATCH_DASHBOARD_ADDR", "0.0.0.0:9000"),
                ("HEXWATCH_SUBGRAPH_URL", "http://localhost:8000/subgraphs/name/hex"),
                ("HEXWATCH_CSV_SOURCE", "https://dash.example"),
                ("HEXWATCH_HTTP_TIMEOUT_MS", "2500"),
                ("HEXWATCH_MAX_RETRIES", "3"),
                (
                    "HEXWATCH_FLUSH_RECEIVE_TARGET",
                    " 0xABCDEFabcdef0123456789012345678901234567 ",
                ),
            ],
            dashboard_config_from_env,
        )
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.subgraph_url, "http://localhost:8000/subgraphs/name/hex");
        assert_eq!(cfg.csv_source, "https://dash.example");
        assert_eq!(cfg.http_timeout_ms, 2500);
        assert_eq!(cfg.retry_policy().max_retries, 3);
        assert_eq!(
            cfg.flush_targets.receive,
            "0xabcdefabcdef0123456789012345678901234567"
        );
        assert_eq!(cfg.flush_targets.send, FLUSH_ADDRESS);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, value) in [
            ("HEXWATCH_DASHBOARD_ADDR", "localhost"),
            ("HEXWATCH_CHAIN", "solana"),
            ("HEXWATCH_SUBGRAPH_URL", "ftp://graph"),
            ("HEXWATCH_HTTP_TIMEOUT_MS", "0"),
            ("HEXWATCH_MAX_RETRIES", "-1"),
            ("HEXWATCH_FLUSH_SEND_TARGET", "0x123"),
        ] {
            let err = with_config_env(&[(key, value)], dashboard_config_from_env).unwrap_err();
            let ConfigError::InvalidValue { key: got, .. } = &err;
            assert_eq!(*got, key);
            assert!(err.to_string().contains(value));
        }
    }
}
