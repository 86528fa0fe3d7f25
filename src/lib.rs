//! Ships function execution telemetry to durable storage without letting
//! storage failures reach the execution pipeline.

pub mod collector;
pub mod config;
pub mod connection;
pub mod diagnostic;
pub mod error;
pub mod naming;
pub mod record;
pub mod retry;
pub mod scope;
pub mod storage;
pub mod util;
pub mod writer;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::collector::{Collector, CollectorBuilder};
    pub use crate::config::CollectorConfig;
    pub use crate::diagnostic::{DiagnosticSink, LogSink};
    pub use crate::error::{LogError, Result};
    pub use crate::record::{DurableLogItem, TelemetryRecord};
    pub use crate::storage::LogStore;
    pub use crate::writer::{BatchWriter, LogWriter};
    pub use tokio_util::sync::CancellationToken;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
