//! E2P Core - event-to-Parquet buffering and conversion engine
//!
//! This library ingests semi-structured event/log records, groups them by a
//! partition key derived from business taxonomy fields, buffers them until a
//! flush condition is met, and converts each buffered batch into a Parquet
//! file handed to a pluggable sink:
//!
//! - Typed and dynamic record variants with lossless JSON/MessagePack
//!   round-trips
//! - Key-partitioned buffering with swappable in-memory and external-store
//!   backends
//! - Batch conversion with per-record failure collection and a dead-letter
//!   path

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod health;
pub mod metrics;
pub mod record;
pub mod sink;

// Re-export commonly used types
pub use config::Config;
pub use error::{BufferError, ConvertError, RecordError, SinkError};
pub use error::{Error, Result};
