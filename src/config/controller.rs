//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::fetch::FetchConfig;
use std::str::FromStr;
use std::time::Duration;

/// How a GitOpsSet with no generators at all is expanded
///
/// A set without generators can reasonably mean "render nothing" or "render
/// every template exactly once". The default renders nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyGeneratorsPolicy {
    /// No combined elements, so no resources
    #[default]
    NoElements,
    /// One empty combined element, so each template renders once
    SingleEmptyElement,
}

impl FromStr for EmptyGeneratorsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "noelements" | "none" => Ok(Self::NoElements),
            "singleemptyelement" | "single" => Ok(Self::SingleEmptyElement),
            other => Err(format!("unknown empty generators policy: {other}")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Minimum backoff after a failed reconciliation (minutes)
    pub error_backoff_min_minutes: u64,
    /// Maximum backoff after a failed reconciliation (minutes)
    pub error_backoff_max_minutes: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Port for the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable metrics collection
    pub enable_metrics: bool,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Upper bound on a single reconcile pass (seconds)
    pub reconcile_timeout_secs: u64,
    /// Timeout for outbound HTTP requests (seconds)
    pub http_timeout_secs: u64,
    /// Retries when downloading an artifact
    pub fetch_retries: u32,
    /// First delay between artifact download attempts (milliseconds)
    pub fetch_backoff_min_ms: u64,
    /// Upper bound on the delay between artifact download attempts (milliseconds)
    pub fetch_backoff_max_ms: u64,
    /// Largest artifact accepted for download, unlimited when unset
    pub max_download_bytes: Option<u64>,
    /// Largest total size of extracted archive members, unlimited when unset
    pub max_untar_bytes: Option<u64>,
    /// Expansion of GitOpsSets that declare no generators
    pub empty_generators_policy: EmptyGeneratorsPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            error_backoff_min_minutes: DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            error_backoff_max_minutes: DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            enable_metrics: true,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            fetch_backoff_min_ms: DEFAULT_FETCH_BACKOFF_MIN_MS,
            fetch_backoff_max_ms: DEFAULT_FETCH_BACKOFF_MAX_MS,
            max_download_bytes: None,
            max_untar_bytes: None,
            empty_generators_policy: EmptyGeneratorsPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            error_backoff_min_minutes: env_var_or_default(
                "ERROR_BACKOFF_MIN_MINUTES",
                DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            ),
            error_backoff_max_minutes: env_var_or_default(
                "ERROR_BACKOFF_MAX_MINUTES",
                DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            enable_metrics: env_var_or_default_bool("ENABLE_METRICS", true),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            fetch_retries: env_var_or_default("FETCH_RETRIES", DEFAULT_FETCH_RETRIES),
            fetch_backoff_min_ms: env_var_or_default(
                "FETCH_BACKOFF_MIN_MS",
                DEFAULT_FETCH_BACKOFF_MIN_MS,
            ),
            fetch_backoff_max_ms: env_var_or_default(
                "FETCH_BACKOFF_MAX_MS",
                DEFAULT_FETCH_BACKOFF_MAX_MS,
            ),
            max_download_bytes: env_var_opt("MAX_DOWNLOAD_BYTES"),
            max_untar_bytes: env_var_opt("MAX_UNTAR_BYTES"),
            empty_generators_policy: env_var_or_default(
                "EMPTY_GENERATORS_POLICY",
                EmptyGeneratorsPolicy::default(),
            ),
        }
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get reconcile pass timeout
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get outbound HTTP timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings for the artifact fetcher
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            retries: self.fetch_retries,
            backoff_min: Duration::from_millis(self.fetch_backoff_min_ms),
            backoff_max: Duration::from_millis(self.fetch_backoff_max_ms),
            max_download_bytes: self.max_download_bytes,
            max_untar_bytes: self.max_untar_bytes,
        }
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read an optional numeric environment variable
fn env_var_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_generators_policy_parsing() {
        assert_eq!(
            "NoElements".parse::<EmptyGeneratorsPolicy>(),
            Ok(EmptyGeneratorsPolicy::NoElements)
        );
        assert_eq!(
            "single-empty-element".parse::<EmptyGeneratorsPolicy>(),
            Ok(EmptyGeneratorsPolicy::SingleEmptyElement)
        );
        assert!("sometimes".parse::<EmptyGeneratorsPolicy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.fetch_retries, 9);
        assert_eq!(config.empty_generators_policy, EmptyGeneratorsPolicy::NoElements);
        assert!(config.max_download_bytes.is_none());
        assert_eq!(config.fetch_config().backoff_min, Duration::from_secs(1));
    }
}
