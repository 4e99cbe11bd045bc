//! Telemetry and tracing configuration
//!
//! This module configures structured logging for the model hub binary. Logs go
//! to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
    Registry,
};

use crate::config::LoggingConfig;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log level, used when RUST_LOG is unset
    pub log_level: String,

    /// Whether to use JSON formatting
    pub json_format: bool,

    /// Whether to include timestamps
    pub include_timestamps: bool,

    /// Whether to include thread IDs
    pub include_thread_ids: bool,

    /// Whether to include target module
    pub include_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_format: false,
            include_timestamps: true,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new telemetry config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON formatting
    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Configure timestamp inclusion
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.include_timestamps = enabled;
        self
    }

    /// Configure thread ID inclusion
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.include_thread_ids = enabled;
        self
    }

    /// Configure target module inclusion
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.include_target = enabled;
        self
    }
}

impl From<&LoggingConfig> for TelemetryConfig {
    fn from(logging: &LoggingConfig) -> Self {
        TelemetryConfig::new()
            .with_log_level(logging.level.clone())
            .with_json_format(logging.json_format)
            .with_timestamps(logging.include_timestamps)
            .with_thread_ids(logging.include_thread_ids)
            .with_target(logging.include_target)
    }
}

/// Filter from RUST_LOG, falling back to the configured level
fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn fmt_layer(config: &TelemetryConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids);

    match (config.json_format, config.include_timestamps) {
        (true, true) => layer
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        (true, false) => layer
            .json()
            .without_time()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        (false, true) => layer.boxed(),
        (false, false) => layer.without_time().boxed(),
    }
}

/// Initialize telemetry with custom configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(env_filter(config))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_format);
        assert!(config.include_timestamps);
        assert!(!config.include_thread_ids);
        assert!(config.include_target);
    }

    #[test]
    fn test_telemetry_config_from_logging() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            json_format: true,
            include_timestamps: false,
            ..LoggingConfig::default()
        };
        let config = TelemetryConfig::from(&logging);

        assert_eq!(config.log_level, "debug");
        assert!(config.json_format);
        assert!(!config.include_timestamps);
    }

    #[test]
    fn test_every_format_builds() {
        for json in [true, false] {
            for timestamps in [true, false] {
                let config = TelemetryConfig::new()
                    .with_json_format(json)
                    .with_timestamps(timestamps);
                let _layer = fmt_layer(&config);
            }
        }
    }
}
