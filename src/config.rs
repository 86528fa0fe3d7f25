use config::{self, File};
use log::{debug, error, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LogError, Result};
use crate::retry::RetryConfig;

/// Prefix for environment variable overrides, e.g. `EXECLOG__HOST_NAME`
pub const ENV_PREFIX: &str = "EXECLOG";

/// Top-level configuration for a collector
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Identifier of the host instance producing telemetry
    pub host_name: String,
    /// Backend connection settings
    pub connection: ConnectionConfig,
    /// Scope (container) name; the machine name is used when absent
    #[serde(default)]
    pub scope_name: Option<String>,
    /// Batching behaviour of the writer
    #[serde(default)]
    pub writer: WriterConfig,
    /// Retry policy for batch writes
    #[serde(default)]
    pub retry: RetryConfig,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Backend connection configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// libpq-style key/value string or `postgres://` URL
    pub connection_string: String,
    /// Run a test query while constructing the collector
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// TLS material, used unless the connection string says `sslmode=disable`
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_verify() -> bool {
    true
}

fn default_pool_size() -> usize {
    4
}

/// TLS settings for the backend connection
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// CA certificate path
    #[serde(default)]
    pub ca_cert: Option<String>,
    /// Client certificate path
    #[serde(default)]
    pub client_cert: Option<String>,
    /// Client key path
    #[serde(default)]
    pub client_key: Option<String>,
    /// Skip certificate verification
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Batching configuration for the background writer
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WriterConfig {
    /// Items buffered before a batch is written
    pub batch_size: usize,
    /// Longest time an item stays buffered, in milliseconds
    pub flush_interval_ms: u64,
    /// Capacity of the command channel; `add` waits when it is full
    pub channel_capacity: usize,
    /// Destination table
    pub table: String,
    /// Create the destination table if it does not exist
    pub create_table: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 5_000,
            channel_capacity: 1_024,
            table: "function_logs".to_string(),
            create_table: true,
        }
    }
}

/// Largest accepted `batch_size`; one batch is one transaction
pub const MAX_BATCH_SIZE: usize = 10_000;

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Reject batching values the writer can't run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(LogError::Config(format!(
                "writer.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.channel_capacity == 0 {
            return Err(LogError::Config("writer.channel_capacity must be at least 1".to_string()));
        }
        if !is_valid_table_name(&self.table) {
            return Err(LogError::Config(format!("Invalid table name: {}", self.table)));
        }
        Ok(())
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path; format chosen by extension
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
}

/// Layered configuration builder. Later sources override earlier ones.
pub struct ConfigBuilder<T: for<'de> Deserialize<'de>> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: for<'de> Deserialize<'de> + Debug> ConfigBuilder<T> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Add a configuration file
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<T> {
        let mut builder = config::Config::builder();

        for source in self.sources {
            match source {
                ConfigSource::File(path) => {
                    let format = file_format(&path)?;
                    debug!("Loading configuration from file: {}", path.display());
                    builder = builder.add_source(File::from(path).format(format));
                }
                ConfigSource::Environment(prefix) => {
                    debug!("Loading configuration from environment with prefix: {}", prefix);
                    builder = builder.add_source(
                        config::Environment::with_prefix(&prefix)
                            .prefix_separator("__")
                            .separator("__")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Toml(toml_str) => {
                    debug!("Loading configuration from TOML string");
                    builder =
                        builder.add_source(File::from_str(&toml_str, config::FileFormat::Toml));
                }
            }
        }

        let config = builder
            .build()
            .map_err(|e| LogError::Config(format!("Failed to build configuration: {}", e)))?;

        let result = config
            .try_deserialize()
            .map_err(|e| LogError::Config(format!("Failed to deserialize configuration: {}", e)))?;

        debug!("Configuration loaded successfully: {:?}", result);

        Ok(result)
    }
}

impl<T: for<'de> Deserialize<'de> + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick a file format from the path's extension
fn file_format(path: &Path) -> Result<config::FileFormat> {
    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(LogError::Config(format!("Configuration file not found: {}", path.display())));
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(LogError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            )));
        }
    };

    match extension.as_str() {
        "toml" => Ok(config::FileFormat::Toml),
        "json" => Ok(config::FileFormat::Json),
        "yaml" | "yml" => Ok(config::FileFormat::Yaml),
        format => {
            error!("Unsupported configuration format: {}", format);
            Err(LogError::Config(format!("Unsupported config format: {}", format)))
        }
    }
}

impl CollectorConfig {
    /// Load from a file, then apply `EXECLOG__` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = ConfigBuilder::new().add_file(path).add_env(ENV_PREFIX).build()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system can't
    pub fn validate(&self) -> Result<()> {
        if self.host_name.trim().is_empty() {
            return Err(LogError::Config("host_name must not be empty".to_string()));
        }
        self.writer.validate()?;
        if self.connection.tls.client_cert.is_some() != self.connection.tls.client_key.is_some() {
            warn!("Client certificate and key must be provided together");
            return Err(LogError::Config(
                "tls.client_cert and tls.client_key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts `name` or `schema.name` made of ASCII alphanumerics and underscores
pub fn is_valid_table_name(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
