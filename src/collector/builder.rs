use log::debug;
use std::sync::Arc;

use super::core::Collector;
use crate::config::{CollectorConfig, ConnectionConfig, TlsConfig, WriterConfig};
use crate::connection;
use crate::diagnostic::DiagnosticSink;
use crate::error::{LogError, Result};
use crate::retry::RetryConfig;
use crate::scope::{FixedScope, MachineName, ScopeNamer};
use crate::storage::PostgresStore;
use crate::writer::BatchWriter;

/// Builder for a [`Collector`] backed by PostgreSQL
pub struct CollectorBuilder {
    host_name: String,
    connection: ConnectionConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    scope: Box<dyn ScopeNamer>,
    writer: WriterConfig,
    retry: RetryConfig,
}

impl CollectorBuilder {
    /// Create a new builder for the given host
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            connection: ConnectionConfig {
                connection_string: String::new(),
                verify: true,
                pool_size: 4,
                tls: TlsConfig::default(),
            },
            sink: None,
            scope: Box::new(MachineName),
            writer: WriterConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Start from loaded configuration
    pub fn from_config(config: &CollectorConfig) -> Self {
        let mut builder = Self::new(config.host_name.clone());
        builder.connection = config.connection.clone();
        builder.writer = config.writer.clone();
        builder.retry = config.retry.clone();
        if let Some(scope) = &config.scope_name {
            builder.scope = Box::new(FixedScope::new(scope.clone()));
        }
        builder
    }

    /// Set the backend connection string
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection.connection_string = connection_string.into();
        self
    }

    /// Set the sink background failures are reported to. Required.
    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set how the storage scope is named
    pub fn scope_namer(mut self, scope: impl ScopeNamer + 'static) -> Self {
        self.scope = Box::new(scope);
        self
    }

    /// Set the batching configuration
    pub fn writer_config(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Set the retry policy for batch writes
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set TLS material
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.connection.tls = tls;
        self
    }

    /// Whether to run a test query while building
    pub fn verify_connection(mut self, verify: bool) -> Self {
        self.connection.verify = verify;
        self
    }

    /// Connect, prepare storage and start the writer.
    ///
    /// Fails without contacting the backend when the sink is missing, the
    /// writer configuration is invalid or the connection string is malformed.
    pub async fn build(self) -> Result<Collector> {
        let sink = self.sink.ok_or(LogError::MissingDiagnosticSink)?;

        if self.host_name.trim().is_empty() {
            return Err(LogError::Config("host name must not be empty".to_string()));
        }
        self.writer.validate()?;

        let pool = connection::connect(&self.connection).await?;
        let scope_name = self.scope.scope_name()?;
        debug!("Resolved scope '{}' for host '{}'", scope_name, self.host_name);

        let store =
            PostgresStore::new(pool, &self.writer, self.host_name.clone(), scope_name.clone())
                .await?;
        let writer = BatchWriter::spawn(
            Arc::new(store),
            self.writer,
            self.retry,
            Collector::failure_handler(Arc::clone(&sink)),
        );

        Ok(Collector::assemble(Arc::new(writer), sink, self.host_name, scope_name))
    }
}
