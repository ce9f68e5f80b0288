//! Structured JSON logger.
//!
//! Per OBSERVABILITY.md §1:
//! - One log line = one event, JSON, synchronous, unbuffered
//! - Deterministic key ordering: event, severity, subsystem first, then
//!   fields sorted alphabetically
//! - Log output must never affect pipeline execution

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues (duplicate delivery, dead channels)
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synchronous structured logger.
pub struct Logger;

impl Logger {
    /// Log an event from a subsystem with the given fields.
    pub fn log(severity: Severity, subsystem: &str, event: &str, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, subsystem, event, fields, &mut io::stdout());
    }

    pub fn info(subsystem: &str, event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, subsystem, event, fields);
    }

    pub fn warn(subsystem: &str, event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, subsystem, event, fields);
    }

    /// Errors go to stderr.
    pub fn error(subsystem: &str, event: &str, fields: &[(&str, &str)]) {
        Self::log_to_writer(Severity::Error, subsystem, event, fields, &mut io::stderr());
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        subsystem: &str,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        // Built by hand for deterministic ordering.
        let mut output = String::with_capacity(256);

        output.push_str("{\"event\":\"");
        Self::escape_json_string(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push_str("\",\"subsystem\":\"");
        Self::escape_json_string(&mut output, subsystem);
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            Self::escape_json_string(&mut output, key);
            output.push_str("\":\"");
            Self::escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output.push('\n');

        let _ = writer.write_all(output.as_bytes());
        let _ = writer.flush();
    }

    fn escape_json_string(output: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c.is_control() => {
                    output.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => output.push(c),
            }
        }
    }
}
