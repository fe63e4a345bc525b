//! Logging initialisation for the facts rules tools
//!
//! Console output uses the format `timestamp [LEVEL] message`; the level
//! filter comes from `RUST_LOG` when set, otherwise from [`LogConfig`].

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{CommonError, Result};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-10-16T08:12:03.418520Z [DEBUG] Asserting fact path="x" value=3`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info",
    /// "warn,facts_rules=debug")
    pub level: String,
    /// Colour the level tag
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Build the level filter; a non-empty `RUST_LOG` wins over the configured level
fn build_filter(config: &LogConfig, rust_log: Option<String>) -> Result<EnvFilter> {
    let directive = match rust_log {
        Some(env) if !env.trim().is_empty() => env,
        _ => config.level.clone(),
    };
    EnvFilter::try_new(&directive)
        .map_err(|e| CommonError::Logging(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Install the global console subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed, so calling
/// this more than once is harmless.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    let filter = build_filter(config, std::env::var("RUST_LOG").ok())?;

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .event_format(BracketedLevelFormat);

    match tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
    {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::debug!("Logging already initialised: {}", e);
            Ok(false)
        },
    }
}
