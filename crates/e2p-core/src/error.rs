//! Error types for the e2p core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for e2p operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for e2p.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record decode error
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Buffer-related error
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Conversion error
    #[error("Convert error: {0}")]
    Convert(#[from] ConvertError),

    /// Sink-related error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Record-level errors.
#[derive(Error, Debug)]
pub enum RecordError {
    /// A field value failed type coercion during decode.
    ///
    /// Construction is all-or-nothing: when this is returned no partially
    /// populated record escapes to the caller.
    #[error("decode failed for field '{field}': {reason}")]
    Decode { field: String, reason: String },

    /// A serialized payload could not be parsed at all
    #[error("malformed record payload: {0}")]
    Malformed(String),
}

/// Buffer-specific errors.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Backend cannot accept reads or writes (e.g. external store unreachable)
    #[error("buffer backend unavailable: {0}")]
    Unavailable(String),

    /// The partition key is empty or otherwise unusable
    #[error("invalid partition key: {0}")]
    InvalidKey(String),

    /// The buffer has been closed
    #[error("buffer is closed")]
    Closed,
}

/// Converter-specific errors.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A single record failed columnar encoding; the batch continues
    #[error("encode failed for field '{field}': {reason}")]
    Encode { field: String, reason: String },

    /// The columnar writer could not be finalized; fatal for the batch
    #[error("failed to finalize columnar file: {0}")]
    Finalize(String),

    /// The schema description is unusable
    #[error("invalid schema description: {0}")]
    Schema(String),
}

/// Sink-specific errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing the finalized file failed
    #[error("sink write failed for '{path}': {message}")]
    Write { path: String, message: String },

    /// The sink backend is unreachable
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The sink has been closed
    #[error("sink is closed")]
    Closed,
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let decode = RecordError::Decode {
            field: "timestamp".into(),
            reason: "expected number, got string".into(),
        };
        let err: Error = decode.into();
        assert!(err.to_string().contains("decode failed for field 'timestamp'"));
    }

    #[test]
    fn test_buffer_error() {
        let err = BufferError::Unavailable("connection refused".into());
        assert_eq!(
            err.to_string(),
            "buffer backend unavailable: connection refused"
        );
    }

    #[test]
    fn test_convert_error() {
        let err = ConvertError::Finalize("footer write failed".into());
        assert!(err.to_string().contains("finalize"));

        let err = ConvertError::Encode {
            field: "status".into(),
            reason: "expected int64".into(),
        };
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_sink_error() {
        let err = SinkError::Write {
            path: "cap/year=2026/part.parquet".into(),
            message: "permission denied".into(),
        };
        assert!(err.to_string().contains("cap/year=2026"));
    }
}
