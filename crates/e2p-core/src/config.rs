//! Configuration structures for e2p.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Record model configuration
    #[serde(default)]
    pub record: RecordConfig,

    /// Buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Columnar writer configuration
    #[serde(default)]
    pub writer: WriterConfig,

    /// Sink configuration
    pub sink: SinkConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Record variant selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordVariant {
    /// Fixed field layout with typed coercion
    #[default]
    Typed,
    /// Open key-value map with an out-of-band schema description
    Dynamic,
}

/// Record model configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordConfig {
    /// Which record variant the deployment ingests
    #[serde(default)]
    pub variant: RecordVariant,

    /// Path to a JSON schema description (required for the dynamic variant)
    pub dynamic_schema_path: Option<PathBuf>,
}

/// Buffer backend selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BufferBackend {
    /// In-process memory buffer
    #[default]
    Mem,
    /// Remote object-store backed buffer
    External,
}

/// Buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Which backend accumulates records
    #[serde(default)]
    pub backend: BufferBackend,

    /// Flush a partition once it holds this many records
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Periodic flush sweep interval in seconds
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,

    /// External store settings (used when backend = "external")
    #[serde(default)]
    pub external: ExternalStoreConfig,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            backend: BufferBackend::Mem,
            flush_threshold: default_flush_threshold(),
            flush_interval_seconds: default_flush_interval_seconds(),
            external: ExternalStoreConfig::default(),
        }
    }
}

/// External buffer store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalStoreConfig {
    /// Store location: a local path or an s3:// URL
    pub location: Option<String>,

    /// Object key prefix inside the store
    #[serde(default = "default_external_prefix")]
    pub prefix: String,
}

/// Parquet compression codec.
///
/// Deserialization is lenient: an unrecognized name selects Snappy rather
/// than failing configuration load.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Compression {
    /// Snappy compression (default, good balance)
    #[default]
    Snappy,
    /// Gzip compression
    Gzip,
    /// No compression
    None,
}

impl Compression {
    /// Resolve a codec by name, falling back to Snappy for anything unknown.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "gzip" => Compression::Gzip,
            "none" | "uncompressed" => Compression::None,
            _ => Compression::Snappy,
        }
    }
}

impl From<String> for Compression {
    fn from(name: String) -> Self {
        Compression::from_name(&name)
    }
}

/// Columnar writer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    /// Compression codec for generated Parquet files
    #[serde(default)]
    pub compression: Compression,

    /// Maximum records per row group
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Snappy,
            row_group_size: default_row_group_size(),
        }
    }
}

/// Sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Sink location: a local directory or an s3:// URL
    pub location: String,

    /// AWS region (for s3:// locations)
    pub s3_region: Option<String>,

    /// S3 endpoint override (for MinIO or other S3-compatible storage)
    pub s3_endpoint: Option<String>,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Ingress HTTP port
    #[serde(default = "default_ingest_port")]
    pub ingest_port: u16,

    /// Health check HTTP port
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            ingest_port: default_ingest_port(),
            health_port: default_health_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_flush_threshold() -> usize {
    5000
}
fn default_flush_interval_seconds() -> u64 {
    30
}
fn default_external_prefix() -> String {
    "buffer".to_string()
}
fn default_row_group_size() -> usize {
    1024
}
fn default_ingest_port() -> u16 {
    8080
}
fn default_health_port() -> u16 {
    8081
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sink.location.is_empty() {
            return Err(crate::Error::Config("Sink location is required".into()));
        }

        if self.buffer.flush_threshold == 0 {
            return Err(crate::Error::Config(
                "Buffer flush threshold must be at least 1".into(),
            ));
        }

        if self.writer.row_group_size == 0 {
            return Err(crate::Error::Config(
                "Writer row group size must be at least 1".into(),
            ));
        }

        if self.record.variant == RecordVariant::Dynamic
            && self.record.dynamic_schema_path.is_none()
        {
            return Err(crate::Error::Config(
                "Dynamic record variant requires a schema description path".into(),
            ));
        }

        if self.buffer.backend == BufferBackend::External
            && self.buffer.external.location.is_none()
        {
            return Err(crate::Error::Config(
                "External buffer backend requires a store location".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            record: RecordConfig::default(),
            buffer: BufferConfig::default(),
            writer: WriterConfig::default(),
            sink: SinkConfig {
                location: "/tmp/e2p-out".into(),
                s3_region: None,
                s3_endpoint: None,
            },
            monitoring: MonitoringConfig::default(),
        }
    }

    #[test]
    fn test_default_buffer_config() {
        let config = BufferConfig::default();
        assert_eq!(config.backend, BufferBackend::Mem);
        assert_eq!(config.flush_threshold, 5000);
        assert_eq!(config.flush_interval_seconds, 30);
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_sink() {
        let mut config = test_config();
        config.sink.location = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Sink location"));
    }

    #[test]
    fn test_config_validation_zero_threshold() {
        let mut config = test_config();
        config.buffer.flush_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_dynamic_without_schema() {
        let mut config = test_config();
        config.record.variant = RecordVariant::Dynamic;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("schema description"));
    }

    #[test]
    fn test_config_validation_external_without_location() {
        let mut config = test_config();
        config.buffer.backend = BufferBackend::External;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store location"));
    }

    #[test]
    fn test_compression_lenient_parsing() {
        assert_eq!(Compression::from_name("snappy"), Compression::Snappy);
        assert_eq!(Compression::from_name("GZIP"), Compression::Gzip);
        assert_eq!(Compression::from_name("none"), Compression::None);
        // Unrecognized names default to snappy, never a config error
        assert_eq!(Compression::from_name("xz"), Compression::Snappy);
        assert_eq!(Compression::from_name(""), Compression::Snappy);
    }

    #[test]
    fn test_compression_deserializes_unknown_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            compression: Compression,
        }
        let w: Wrapper = toml::from_str(r#"compression = "xz""#).unwrap();
        assert_eq!(w.compression, Compression::Snappy);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [record]
            variant = "typed"

            [buffer]
            backend = "mem"
            flush_threshold = 100

            [writer]
            compression = "gzip"
            row_group_size = 64

            [sink]
            location = "/data/out"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.buffer.flush_threshold, 100);
        assert_eq!(config.writer.compression, Compression::Gzip);
        assert_eq!(config.writer.row_group_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_defaults() {
        let config = MonitoringConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
