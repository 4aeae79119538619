//! Structured log setup

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::ConfigError;

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,

    /// Append logs to this file; empty means stdout only
    pub path: String,

    /// Also log to stdout when `path` is set
    pub stdout: bool,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,

    /// Rotate the log file once it reaches this size
    pub max_size_mb: usize,

    /// Rotated files kept next to the active one
    pub max_backups: usize,

    /// Gzip rotated files
    pub compress: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: String::new(),
            stdout: true,
            json: true,
            max_size_mb: 500,
            max_backups: 20,
            compress: true,
        }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}

/// Size-rotating writer for the configured log file
///
/// Rotated files are named `<path>.1`, `<path>.2`, ... with `.1` the most
/// recent, plus `.gz` when compressed.
pub fn rotating_writer(config: &LogConfig) -> Result<FileRotate<AppendCount>, ConfigError> {
    if config.max_size_mb == 0 {
        return Err(ConfigError::Invalid("log max_size_mb must be positive".into()));
    }

    // Surface permission and missing-directory errors before rotation takes over
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", config.path, e)))?;

    let limit = ContentLimit::Bytes(config.max_size_mb.saturating_mul(1024 * 1024));
    let compression = if config.compress {
        Compression::OnRotate(0)
    } else {
        Compression::None
    };

    Ok(open_rotating(
        Path::new(&config.path),
        AppendCount::new(config.max_backups),
        limit,
        compression,
    ))
}

#[cfg(unix)]
fn open_rotating(
    path: &Path,
    suffix: AppendCount,
    limit: ContentLimit,
    compression: Compression,
) -> FileRotate<AppendCount> {
    FileRotate::new(path, suffix, limit, compression, None)
}

#[cfg(not(unix))]
fn open_rotating(
    path: &Path,
    suffix: AppendCount,
    limit: ContentLimit,
    compression: Compression,
) -> FileRotate<AppendCount> {
    FileRotate::new(path, suffix, limit, compression)
}

fn output_layer<S, W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(true)
        .with_line_number(true);

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let file_layer = if config.path.is_empty() {
        None
    } else {
        let file = rotating_writer(config)?;
        Some(output_layer(Mutex::new(file), config.json, false))
    };

    let stdout_layer = (file_layer.is_none() || config.stdout)
        .then(|| output_layer(std::io::stdout, config.json, !config.json));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
