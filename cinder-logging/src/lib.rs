//! Structured logging setup for Cinder services

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for service logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Human-readable lines, for local runs
    Console,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else falls back to console
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            Some(s) if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Console,
        }
    }
}

/// Initialize logging in the requested format
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) {
    match format {
        LogFormat::Json => init_logging(service_name, default_level),
        LogFormat::Console => init_console_logging(service_name, default_level),
    }
}

/// Initialize structured JSON logging
///
/// This sets up:
/// - JSON formatted logs with file and line
/// - Environment-based log level filtering
pub fn init_logging(service_name: &str, default_level: &str) {
    let env_filter = build_filter(default_level);

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(false)
                .with_span_list(false),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!(service = service_name, format = "json", "Logging initialized");
    }
}

/// Initialize simple console logging (for development)
pub fn init_console_logging(service_name: &str, default_level: &str) {
    let env_filter = build_filter(default_level);

    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();

    if result.is_ok() {
        tracing::info!(service = service_name, format = "console", "Logging initialized");
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
