//! Key-partitioned record accumulation with swappable backends.
//!
//! The buffer exclusively owns pushed records until a drain transfers a
//! whole partition to the caller. Drains are atomic take-and-clear
//! operations: at most one caller observes a given record instance.

mod external;
mod memory;

pub use external::ExternalBuffer;
pub use memory::MemoryBuffer;

use crate::record::Record;
use crate::Result;
use async_trait::async_trait;

/// A key-partitioned record buffer.
///
/// Push semantics are at-least-once: a successful push makes the record
/// visible to subsequent `len`/`get`/`drain` calls for that key.
#[async_trait]
pub trait RecordBuffer: Send + Sync {
    /// Append a record under a key.
    ///
    /// Fails with `BufferError::Unavailable` when the backend cannot accept
    /// writes and `BufferError::InvalidKey` for an empty key.
    async fn push(&self, key: &str, record: Record) -> Result<()>;

    /// Append records under a key, preserving the given order.
    ///
    /// Both backends accept a batch all-or-nothing per call: a failed call
    /// has accepted none of the records.
    async fn push_batch(&self, key: &str, records: Vec<Record>) -> Result<()>;

    /// Current buffered record count for a key.
    async fn len(&self, key: &str) -> usize;

    /// Non-destructive peek at a key's records.
    async fn get(&self, key: &str) -> Result<Vec<Record>>;

    /// Destructively take a key's records.
    ///
    /// Returns the records in push order and clears the key atomically with
    /// the transfer; concurrent drains never observe the same record.
    async fn drain(&self, key: &str) -> Result<Vec<Record>>;

    /// All keys with at least one buffered record.
    async fn keys(&self) -> Vec<String>;

    /// Backend health.
    async fn is_ready(&self) -> bool;

    /// Release backend resources. Idempotent.
    async fn close(&self) -> Result<()>;
}
