//! Tracing subscriber setup for the server binary.

use anyhow::anyhow;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// Filter precedence: CLI flag, then `RUST_LOG`, then the config file, then `info`.
pub fn init(
    logging: &LoggingConfig,
    cli_level: Option<&str>,
    cli_format: Option<LogFormat>,
) -> anyhow::Result<()> {
    let filter = resolve_filter(logging, cli_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    match cli_format.unwrap_or(logging.format) {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .json(),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    }
    .map_err(|err| anyhow!("initialize logging subscriber: {err}"))
}

fn resolve_filter(logging: &LoggingConfig, cli_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Some(level) = cli_level {
        return parse_filter(level);
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    parse_filter(logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
}

fn parse_filter(raw: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(raw.trim())
        .map_err(|_| anyhow!("invalid log level `{raw}`; expected e.g. info, debug or mimic_http_mock=trace"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_wins() {
        let logging = LoggingConfig {
            level: Some("warn".to_string()),
            format: LogFormat::Pretty,
        };
        let filter = resolve_filter(&logging, Some("debug")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_directive_filters_accepted() {
        assert!(parse_filter("mimic_http_mock=trace,hyper=warn").is_ok());
        assert!(parse_filter(" info ").is_ok());
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert!(parse_filter("mimic_http_mock=verbose").is_err());
    }
}
