//! Observability: structured logging and typed pipeline events.
//!
//! Per OBSERVABILITY.md:
//! - Structured logs (JSON), one line per event
//! - Observability is read-only: no side effects on pipeline execution
//! - Deterministic output (sorted field keys)

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a pipeline event with fields.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_error() {
        Severity::Error
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.subsystem(), event.as_str(), fields);
}
