//! Application-facing log sink.
//!
//! The server internals emit structured [`tracing`] events directly. On top
//! of that, applications get a pluggable [`Logger`] seam: everything routed
//! through [`crate::HttpServer::log`] or [`crate::Task::log`] goes to the
//! configured sink. The default [`TracingLogger`] forwards to `tracing`
//! events so both streams end up in the same subscriber.

use std::fmt;

/// Severity levels accepted by [`Logger::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// Pluggable sink for application log messages.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default logger: forwards each message as a `tracing` event.
///
/// `Fatal` has no `tracing` counterpart and is emitted at error level with
/// a `fatal` field set.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "gantry::app", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "gantry::app", "{message}"),
            LogLevel::Info => tracing::info!(target: "gantry::app", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "gantry::app", "{message}"),
            LogLevel::Error => tracing::error!(target: "gantry::app", "{message}"),
            LogLevel::Fatal => tracing::error!(target: "gantry::app", fatal = true, "{message}"),
        }
    }
}

/// Logger that discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display_names() {
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert_eq!(LogLevel::Fatal.to_string(), "FATAL");
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn null_logger_accepts_everything() {
        NullLogger.log(LogLevel::Fatal, "dropped");
    }
}
