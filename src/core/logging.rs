//! Logging setup on top of flexi_logger
//!
//! The library only ever talks to the `log` facade; this module installs the
//! backend for the binary. Three output formats are supported:
//!
//! - `text`: `YYYY-MM-DD HH:MM:SS.mmm INF message (container/receiver.rs:42)`
//! - `ext`:  same as text, with the source location dimmed when colored
//! - `json`: one compact JSON object per line

use flexi_logger::{DeferredNow, FileSpec, Logger, LoggerHandle};
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

// Dropping the handle would stop file output, so it lives for the process.
static LOGGER_HANDLE: OnceLock<Mutex<LoggerHandle>> = OnceLock::new();

/// Error raised while installing or reconfiguring the logger
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log specification '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("Unknown log format '{format}' (expected text, ext or json)")]
    UnknownFormat { format: String },

    #[error("Logger could not be started: {reason}")]
    StartFailed { reason: String },
}

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Ext,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "simple" => Ok(LogFormat::Text),
            "ext" => Ok(LogFormat::Ext),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::UnknownFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Resolved logging options
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub level: Option<String>,
    pub format: LogFormat,
    pub file: Option<String>,
    pub color: bool,
}

/// Install the global logger
///
/// Calling this twice keeps the first logger; the second call fails with
/// `StartFailed` as `log` only accepts one backend per process.
pub fn init_logging(options: &LoggingOptions) -> Result<(), LoggingError> {
    let spec = options.level.as_deref().unwrap_or("info");
    let mut logger = Logger::try_with_str(spec).map_err(|e| LoggingError::InvalidSpec {
        spec: spec.to_string(),
        reason: e.to_string(),
    })?;

    logger = match (options.format, options.color) {
        (LogFormat::Json, _) => logger.format(json_format),
        (LogFormat::Ext, true) => logger.format(extended_color_format),
        (LogFormat::Ext, false) | (LogFormat::Text, false) => logger.format(text_format),
        (LogFormat::Text, true) => logger.format(text_color_format),
    };

    if let Some(file_path) = options.file.as_deref().filter(|p| *p != "none") {
        let file_spec = FileSpec::try_from(std::path::Path::new(file_path)).map_err(|e| {
            LoggingError::StartFailed {
                reason: format!("invalid log file '{}': {}", file_path, e),
            }
        })?;
        logger = logger.log_to_file(file_spec);
    }

    let handle = logger.start().map_err(|e| LoggingError::StartFailed {
        reason: e.to_string(),
    })?;
    let _ = LOGGER_HANDLE.set(Mutex::new(handle));
    Ok(())
}

fn level_abbr(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    }
}

fn text_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbr(record.level()),
        record.args(),
        format_target_as_path(record.target(), record.line())
    )
}

fn colored_level(level: log::Level) -> colored::ColoredString {
    use colored::Colorize;

    match level {
        log::Level::Error => "ERR".red().bold(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Info => "INF".green(),
        log::Level::Debug => "DBG".blue(),
        log::Level::Trace => "TRC".magenta(),
    }
}

fn text_color_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    use colored::Colorize;

    write!(
        w,
        "{} {} {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        colored_level(record.level()),
        record.args()
    )
}

fn extended_color_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    use colored::Colorize;

    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        colored_level(record.level()),
        record.args(),
        format_target_as_path(record.target(), record.line()).dimmed()
    )
}

fn json_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let json_obj = serde_json::json!({
        "timestamp": now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": level_abbr(record.level()),
        "message": record.args().to_string(),
        "target": format_target_as_path(record.target(), record.line()),
    });

    match serde_json::to_string(&json_obj) {
        Ok(line) => w.write_all(line.as_bytes()),
        Err(_) => w.write_all(b"{\"error\":\"Failed to serialize log message\"}"),
    }
}

// brokerpool::container::receiver -> container/receiver.rs:42
fn format_target_as_path(target: &str, line: Option<u32>) -> String {
    let path_like = match target.strip_prefix("brokerpool::") {
        Some(module_path) => module_path.replace("::", "/") + ".rs",
        None => target.replace("::", "/"),
    };

    match line {
        Some(line_num) => format!("{}:{}", path_like, line_num),
        None => path_like,
    }
}
