use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lenient parse; unknown names fall back to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_filter().to_uppercase())
    }
}

/// Keeps the file writer alive. Dropping it flushes and stops file logging.
#[derive(Debug, Default)]
pub struct LogHandle {
    pub path: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%dT%H%M%S").to_string();
    log_dir.join(format!("{}.log", timestamp))
}

/// Install the global tracing subscriber.
///
/// With `print` set, logs go to stderr; otherwise to a timestamped file in
/// `log_dir`. `RUST_LOG` overrides `level`.
pub fn init_tracing(
    level: Option<LogLevel>,
    log_dir: Option<PathBuf>,
    print: bool,
) -> Result<LogHandle> {
    let level = level.unwrap_or_default();

    if print {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("tracing subscriber already installed")?;
        return Ok(LogHandle::default());
    }

    let log_dir = log_dir.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;
    let log_path = log_file_path(&log_dir);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(LogHandle {
        path: Some(log_path),
        _guard: Some(guard),
    })
}
