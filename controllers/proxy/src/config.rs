//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::time::Duration;

/// Fixed requeue interval after a failed reconciliation
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 10;
/// Concurrent reconciliations per watched kind
pub const DEFAULT_CONCURRENCY: u16 = 3;
/// Quiet period before a burst of events is reconciled
pub const DEFAULT_DEBOUNCE_SECS: u64 = 1;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Runtime configuration of the proxy controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Backoff before a failed reconciliation is retried
    pub requeue_interval: Duration,
    /// Upper bound on reconciliations running at once
    pub concurrency: u16,
    /// Window in which bursts of events collapse into one reconciliation
    pub debounce: Duration,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            debounce: Duration::from_secs(DEFAULT_DEBOUNCE_SECS),
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    ///
    /// - `WATCH_NAMESPACE`: namespace to watch (all namespaces when unset)
    /// - `REQUEUE_INTERVAL_SECS`: retry backoff, default 10
    /// - `RECONCILE_CONCURRENCY`: default 3
    /// - `RECONCILE_DEBOUNCE_SECS`: default 1
    /// - `LOG_FORMAT`: `text` or `json`
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let requeue_interval = match lookup("REQUEUE_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_number("REQUEUE_INTERVAL_SECS", &raw)?),
            None => defaults.requeue_interval,
        };
        if requeue_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "REQUEUE_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let concurrency = match lookup("RECONCILE_CONCURRENCY") {
            Some(raw) => parse_number("RECONCILE_CONCURRENCY", &raw)?,
            None => defaults.concurrency,
        };

        let debounce = match lookup("RECONCILE_DEBOUNCE_SECS") {
            Some(raw) => Duration::from_secs(parse_number("RECONCILE_DEBOUNCE_SECS", &raw)?),
            None => defaults.debounce,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "LOG_FORMAT must be \"text\" or \"json\", got {:?}",
                    other
                )));
            }
        };

        Ok(Self {
            namespace,
            requeue_interval,
            concurrency,
            debounce,
            log_format,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ControllerError> {
    raw.trim().parse::<T>().map_err(|_| {
        ControllerError::InvalidConfig(format!("{} must be a non-negative integer, got {:?}", key, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.requeue_interval, Duration::from_secs(10));
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WATCH_NAMESPACE", "shardingsphere"),
            ("REQUEUE_INTERVAL_SECS", "30"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("shardingsphere"));
        assert_eq!(config.requeue_interval, Duration::from_secs(30));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_blank_namespace_means_all_namespaces() {
        let config = load(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(matches!(
            load(&[("REQUEUE_INTERVAL_SECS", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("REQUEUE_INTERVAL_SECS", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
