//! Leveled progress and diagnostic output for an encode run.
//!
//! Every component logs through a [`LogSink`]. [`NoopSink`] is the default so
//! library callers that do not care about progress pay nothing; the CLI uses
//! [`FacadeSink`], which forwards to the `log` facade.

use std::fmt;

use log::{Level, log};

pub const LOG_TARGET: &str = "db_encoder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Notice,
    Critical,
}

impl Severity {
    fn as_level(self) -> Level {
        match self {
            Severity::Debug => Level::Debug,
            Severity::Notice => Level::Info,
            Severity::Critical => Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "debug",
            Severity::Notice => "notice",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Key/value pairs attached to a message.
pub type LogContext<'a> = &'a [(&'a str, String)];

pub trait LogSink {
    fn log(&self, severity: Severity, message: &str, context: LogContext<'_>);

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message, &[]);
    }

    fn notice(&self, message: &str) {
        self.log(Severity::Notice, message, &[]);
    }

    fn critical(&self, message: &str) {
        self.log(Severity::Critical, message, &[]);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _severity: Severity, _message: &str, _context: LogContext<'_>) {}
}

pub static NOOP_SINK: NoopSink = NoopSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, severity: Severity, message: &str, context: LogContext<'_>) {
        let level = severity.as_level();
        if context.is_empty() {
            log!(target: LOG_TARGET, level, "{message}");
        } else {
            log!(
                target: LOG_TARGET,
                level,
                "{message} ({})",
                render_context(context)
            );
        }
    }
}

fn render_context(context: LogContext<'_>) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
