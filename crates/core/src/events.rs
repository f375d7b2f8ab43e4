//! Append-only lifecycle log shared with the presentation layer.
//!
//! The supervisor only ever writes; a consumer on the other end of the
//! channel renders events at its own pace.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn render(&self) -> String {
        format!(
            "[{}] {:<5} {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Cloneable write end of the log.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<LogEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only mirrors to `tracing`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Level of the `tracing` mirror. With a consumer attached the consumer
    /// owns the terminal and the mirror is kept at debug (`None`).
    fn mirror_level(&self, level: LogLevel) -> Option<LogLevel> {
        self.tx.is_none().then_some(level)
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        match self.mirror_level(level) {
            Some(LogLevel::Info) => tracing::info!("{}", message),
            Some(LogLevel::Warn) => tracing::warn!("{}", message),
            Some(LogLevel::Error) => tracing::error!("{}", message),
            None => tracing::debug!(level = %level, "{}", message),
        }

        if let Some(tx) = &self.tx {
            // A closed receiver just means nobody is watching anymore.
            let _ = tx.send(LogEvent {
                at: Local::now(),
                level,
                message,
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }
}
