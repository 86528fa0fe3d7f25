//! Operator-facing reporting of background failures
//!
//! Failures that happen after a record has been handed off (a batch that could
//! not be written) are not returned to the execution pipeline. They are
//! formatted here and delivered to a [`DiagnosticSink`].

use log::error;
use std::panic::{self, AssertUnwindSafe};

use crate::error::LogError;

/// Receives background failures together with a readable message
pub trait DiagnosticSink: Send + Sync + 'static {
    fn error(&self, message: &str, error: &LogError);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str, &LogError) + Send + Sync + 'static,
{
    fn error(&self, message: &str, error: &LogError) {
        self(message, error)
    }
}

/// Sink that writes to the `log` facade at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn error(&self, message: &str, _error: &LogError) {
        error!(target: "execlog::diagnostic", "{}", message);
    }
}

/// Message delivered for a batch that failed to reach durable storage
pub fn failure_message(error: &LogError) -> String {
    format!("Error writing logs to durable storage: {}", error)
}

/// Report a failed background write to the sink.
///
/// Never panics outward; a panicking sink is logged and otherwise ignored.
pub fn report_write_failure(sink: &dyn DiagnosticSink, error: &LogError) {
    let message = failure_message(error);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.error(&message, error)));
    if outcome.is_err() {
        error!("Diagnostic sink panicked while reporting: {}", message);
    }
}
