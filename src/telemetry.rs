//! Structured logging setup
//!
//! JSON output by default for log collectors, plain text for terminals.
//! The filter comes from `RUST_LOG` when set.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::bootstrap;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,rack_provider=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A filter directive could not be parsed
    #[error("invalid log filter directive: {0}")]
    Directive(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Build the log filter, including bootstrap suppressions
pub fn build_filter() -> Result<EnvFilter, TelemetryError> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    for directive in bootstrap::log_directives() {
        let directive = directive
            .parse()
            .map_err(|e| TelemetryError::Directive(format!("{}: {}", directive, e)))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

/// Install the global tracing subscriber
pub fn init_logging(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = build_filter()?;

    let (json, text) = match format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            ),
            None,
        ),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_includes_runtime_suppression_after_bootstrap() {
        bootstrap::install();
        let filter = build_filter().unwrap();
        assert!(filter.to_string().contains("kube_runtime::watcher=off"));
    }

    #[test]
    fn test_default_format_is_json() {
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }
}
