//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::SlidingWindowCounter;

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Sliding window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sliding window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Total window span in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Number of buckets the window is split into
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    /// Event count at which the limit opens
    #[serde(default = "default_threshold")]
    pub threshold: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            buckets: default_buckets(),
            threshold: default_threshold(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_buckets() -> usize {
    60
}

fn default_threshold() -> i64 {
    10
}

impl WindowConfig {
    /// Total window span.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Build a counter from this configuration and start its rotation.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(&self) -> Result<SlidingWindowCounter> {
        SlidingWindowCounter::start(self.window(), self.buckets, self.threshold)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.window.window(), Duration::from_secs(60));
        assert_eq!(config.window.buckets, 60);
        assert_eq!(config.window.threshold, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
window:
  window_ms: 5000
  buckets: 5
  threshold: 100
logging:
  level: debug
  json: true
"#;
        let config = assert_ok!(TurnstileConfig::from_yaml(yaml));
        assert_eq!(config.window.window(), Duration::from_secs(5));
        assert_eq!(config.window.buckets, 5);
        assert_eq!(config.window.threshold, 100);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
window:
  threshold: 3
"#;
        let config = assert_ok!(TurnstileConfig::from_yaml(yaml));
        assert_eq!(config.window.window_ms, 60_000);
        assert_eq!(config.window.buckets, 60);
        assert_eq!(config.window.threshold, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_invalid_config() {
        let err = assert_err!(TurnstileConfig::from_yaml("window: [1, 2"));
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(TurnstileConfig::from_file("/nonexistent/turnstile.yaml"));
        assert!(matches!(err, TurnstileError::Io(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_from_config() {
        let config = WindowConfig {
            window_ms: 5000,
            buckets: 5,
            threshold: 2,
        };
        let win = assert_ok!(config.start());
        assert_eq!(win.bucket_duration(), Duration::from_secs(1));
        assert_eq!(win.threshold(), 2);
    }

    #[tokio::test]
    async fn test_start_rejects_uneven_window() {
        let config = WindowConfig {
            window_ms: 1000,
            buckets: 3,
            threshold: 2,
        };
        let err = assert_err!(config.start());
        assert!(matches!(err, TurnstileError::InvalidConfiguration(_)));
    }
}
