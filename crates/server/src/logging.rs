//! Structured file logging for the server process.
//!
//! Events go to `<data dir>/logs/server.log` through a non-blocking writer.
//! `VIEWDECK_LOG_FILTER` (then `RUST_LOG`) picks the filter and
//! `VIEWDECK_LOG_FORMAT` picks `json` or `pretty`.

use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::paths;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";
const LOG_FILE: &str = "server.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Keeps the file writer flushing. Drop it last.
pub struct LoggingHandle {
    pub run_id: String,
    _guard: WorkerGuard,
}

/// Filter directive in effect: `VIEWDECK_LOG_FILTER`, then `RUST_LOG`, then the default.
fn filter_directive(ours: Option<String>, rust_log: Option<String>) -> String {
    ours.or(rust_log)
        .filter(|value| EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let log_dir = paths::log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let directive = filter_directive(
        std::env::var("VIEWDECK_LOG_FILTER").ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let format = std::env::var("VIEWDECK_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<LogFormat>().ok())
        .unwrap_or_default();

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, LOG_FILE));
    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(&directive)?);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?,
    }

    let run_id = Uuid::new_v4().simple().to_string()[..12].to_string();
    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        pid = std::process::id(),
        log_path = %log_dir.join(LOG_FILE).display(),
        format = ?format,
        filter = %directive,
    );

    Ok(LoggingHandle {
        run_id,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_filter_beats_rust_log() {
        assert_eq!(
            filter_directive(Some("debug".into()), Some("trace".into())),
            "debug"
        );
        assert_eq!(filter_directive(None, Some("trace".into())), "trace");
        assert_eq!(filter_directive(None, None), DEFAULT_FILTER);
    }

    #[test]
    fn unparseable_filter_falls_back_to_default() {
        assert_eq!(
            filter_directive(Some("info,viewdeck=loud".into()), None),
            DEFAULT_FILTER
        );
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
