//! The ingest boundary between the execution host and the log writer
use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::builder::CollectorBuilder;
use crate::config::CollectorConfig;
use crate::diagnostic::{DiagnosticSink, report_write_failure};
use crate::error::{LogError, Result};
use crate::record::{DurableLogItem, TelemetryRecord};
use crate::writer::{FailureHandler, LogWriter};

/// Receives telemetry records from the host and hands them to a log writer.
///
/// Holds no per-record state and no locks; it is safe to share behind an
/// `Arc` and call from many tasks at once.
pub struct Collector {
    writer: Arc<dyn LogWriter>,
    sink: Arc<dyn DiagnosticSink>,
    host_name: String,
    scope_name: String,
}

impl Collector {
    /// Start building a collector for the given host
    pub fn builder(host_name: impl Into<String>) -> CollectorBuilder {
        CollectorBuilder::new(host_name)
    }

    /// Connect to the backend described by `connection_string`
    pub async fn new(
        host_name: impl Into<String>,
        connection_string: impl Into<String>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        Self::builder(host_name)
            .connection_string(connection_string)
            .diagnostic_sink(sink)
            .build()
            .await
    }

    /// Build from loaded configuration
    pub async fn from_config(
        config: &CollectorConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        config.validate()?;
        CollectorBuilder::from_config(config).diagnostic_sink(sink).build().await
    }

    /// Use an existing writer. The writer is expected to report its
    /// background failures through [`Collector::failure_handler`].
    pub fn with_writer(writer: Arc<dyn LogWriter>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::assemble(writer, sink, "local".to_string(), "local".to_string())
    }

    pub(crate) fn assemble(
        writer: Arc<dyn LogWriter>,
        sink: Arc<dyn DiagnosticSink>,
        host_name: String,
        scope_name: String,
    ) -> Self {
        info!("Collector ready for host '{}' in scope '{}'", host_name, scope_name);
        Self {
            writer,
            sink,
            host_name,
            scope_name,
        }
    }

    /// Failure handler that forwards writer failures to `sink`
    pub fn failure_handler(sink: Arc<dyn DiagnosticSink>) -> FailureHandler {
        Arc::new(move |error: LogError| report_write_failure(sink.as_ref(), &error))
    }

    /// Normalize a record and hand it to the writer.
    ///
    /// May wait while the writer applies backpressure. The cancellation token
    /// is passed through untouched.
    pub async fn collect(&self, record: TelemetryRecord, cancel: &CancellationToken) -> Result<()> {
        let item = DurableLogItem::from(record);
        debug!("Collecting {} ({})", item.function_name, item.instance_id);
        self.writer.add(item, cancel).await
    }

    /// Push everything buffered to durable storage and wait for the attempt.
    ///
    /// Batches that fail are reported to the diagnostic sink, not here.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<()> {
        self.writer.flush(cancel).await
    }

    /// Flush and stop the writer. Later calls fail with `WriterClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down collector for host '{}'", self.host_name);
        self.writer.close().await
    }

    /// Report a writer failure through this collector's sink
    pub fn on_writer_failure(&self, error: &LogError) {
        report_write_failure(self.sink.as_ref(), error);
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }
}
