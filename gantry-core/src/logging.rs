//! Logging configuration
//!
//! Structured logging over `tracing`, JSON to stdout by default. The
//! engine itself only emits events; installing a subscriber is the
//! application's choice, made once at assembly time through
//! [`LogConfig`].

use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON (default).
    Json,
    /// Human-readable single-line.
    Plain,
    /// Multi-line, colored, for development.
    Pretty,
    Compact,
}

/// Output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

/// File rotation strategy for [`LogOutput::RollingFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    fn to_appender_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

/// Logging configuration builder.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    pub targets: bool,
    pub colors: bool,
    /// Custom filter directive, e.g. `"gantry=debug,hyper=info"`.
    /// Overrides `level` when set.
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Install the subscriber.
    ///
    /// Returns the non-blocking writer guard; keep it alive for the
    /// program's lifetime so buffered logs flush on shutdown. Does
    /// nothing if a global subscriber is already installed.
    pub fn init(self) -> Option<WorkerGuard> {
        let env_filter = match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        };

        match &self.output {
            LogOutput::Stdout => {
                let (writer, guard) = tracing_appender::non_blocking(io::stdout());
                self.install(writer, env_filter);
                Some(guard)
            }
            LogOutput::Stderr => {
                let (writer, guard) = tracing_appender::non_blocking(io::stderr());
                self.install(writer, env_filter);
                Some(guard)
            }
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok()?;
                let (writer, guard) = tracing_appender::non_blocking(file);
                self.install(writer, env_filter);
                Some(guard)
            }
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => {
                let appender = tracing_appender::rolling::RollingFileAppender::new(
                    rotation.to_appender_rotation(),
                    directory,
                    prefix,
                );
                let (writer, guard) = tracing_appender::non_blocking(appender);
                self.install(writer, env_filter);
                Some(guard)
            }
        }
    }

    fn install<W>(&self, writer: W, env_filter: EnvFilter)
    where
        W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        match self.format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Plain => {
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
        }
    }
}

impl Default for LogConfig {
    /// JSON to stdout at INFO.
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            thread_ids: false,
            targets: true,
            colors: false,
            env_filter: None,
        }
    }
}
