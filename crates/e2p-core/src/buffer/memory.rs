//! In-memory buffer backend.

use super::RecordBuffer;
use crate::record::Record;
use crate::{BufferError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// In-process buffer: a map from partition key to an ordered record
/// sequence.
///
/// Appends run under the map's shard lock; a drain is `DashMap::remove`, an
/// atomic swap of the key's whole sequence. There is no separate
/// read-then-clear pair, so a drain cannot lose records pushed concurrently
/// with it and two drains can never return the same record.
pub struct MemoryBuffer {
    partitions: DashMap<String, Vec<Record>>,
    closed: AtomicBool,
    pushed_total: AtomicU64,
    drained_total: AtomicU64,
}

impl MemoryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            closed: AtomicBool::new(false),
            pushed_total: AtomicU64::new(0),
            drained_total: AtomicU64::new(0),
        }
    }

    /// Total records pushed over the buffer's lifetime.
    pub fn pushed_total(&self) -> u64 {
        self.pushed_total.load(Ordering::Relaxed)
    }

    /// Total records drained over the buffer's lifetime.
    pub fn drained_total(&self) -> u64 {
        self.drained_total.load(Ordering::Relaxed)
    }

    fn check_open(&self, key: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed.into());
        }
        if key.is_empty() {
            return Err(BufferError::InvalidKey("empty key".into()).into());
        }
        Ok(())
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordBuffer for MemoryBuffer {
    async fn push(&self, key: &str, record: Record) -> Result<()> {
        self.check_open(key)?;
        self.partitions.entry(key.to_string()).or_default().push(record);
        self.pushed_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn push_batch(&self, key: &str, records: Vec<Record>) -> Result<()> {
        self.check_open(key)?;
        let count = records.len() as u64;
        self.partitions
            .entry(key.to_string())
            .or_default()
            .extend(records);
        self.pushed_total.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    async fn len(&self, key: &str) -> usize {
        self.partitions.get(key).map(|p| p.len()).unwrap_or(0)
    }

    async fn get(&self, key: &str) -> Result<Vec<Record>> {
        Ok(self
            .partitions
            .get(key)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn drain(&self, key: &str) -> Result<Vec<Record>> {
        let records = self
            .partitions
            .remove(key)
            .map(|(_, records)| records)
            .unwrap_or_default();
        if !records.is_empty() {
            self.drained_total
                .fetch_add(records.len() as u64, Ordering::Relaxed);
            debug!(key = %key, count = records.len(), "Drained partition");
        }
        Ok(records)
    }

    async fn keys(&self) -> Vec<String> {
        self.partitions
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordVariant;
    use std::sync::Arc;

    fn test_record(n: usize) -> Record {
        let map = serde_json::json!({
            "capability": "cap",
            "domain": "dom",
            "service": "svc",
            "application": "app",
            "message": format!("event-{}", n),
        });
        match map {
            serde_json::Value::Object(m) => Record::new(RecordVariant::Typed, m).unwrap(),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_push_then_drain_preserves_order() {
        let buffer = MemoryBuffer::new();
        for i in 0..10 {
            buffer.push("k", test_record(i)).await.unwrap();
        }
        assert_eq!(buffer.len("k").await, 10);

        let drained = buffer.drain("k").await.unwrap();
        assert_eq!(drained.len(), 10);
        for (i, record) in drained.iter().enumerate() {
            let Record::Typed(typed) = record else {
                panic!("expected typed");
            };
            assert_eq!(typed.message, format!("event-{}", i));
        }
        assert_eq!(buffer.len("k").await, 0);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let buffer = MemoryBuffer::new();
        let err = buffer.push("", test_record(0)).await.unwrap_err();
        assert!(err.to_string().contains("invalid partition key"));
    }

    #[tokio::test]
    async fn test_get_is_non_destructive() {
        let buffer = MemoryBuffer::new();
        buffer.push("k", test_record(0)).await.unwrap();
        assert_eq!(buffer.get("k").await.unwrap().len(), 1);
        assert_eq!(buffer.len("k").await, 1);
    }

    #[tokio::test]
    async fn test_keys_lists_nonempty_partitions() {
        let buffer = MemoryBuffer::new();
        buffer.push("a", test_record(0)).await.unwrap();
        buffer.push("b", test_record(1)).await.unwrap();
        buffer.drain("a").await.unwrap();

        let keys = buffer.keys().await;
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_pushes() {
        let buffer = MemoryBuffer::new();
        buffer.close().await.unwrap();
        buffer.close().await.unwrap();
        assert!(!buffer.is_ready().await);

        let err = buffer.push("k", test_record(0)).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_push_no_loss() {
        let buffer = Arc::new(MemoryBuffer::new());
        let mut handles = Vec::new();
        for producer in 0..8 {
            let buffer = Arc::clone(&buffer);
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    buffer
                        .push("shared", test_record(producer * 1000 + i))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(buffer.len("shared").await, 2000);
        let drained = buffer.drain("shared").await.unwrap();
        assert_eq!(drained.len(), 2000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drain_no_duplication() {
        let buffer = Arc::new(MemoryBuffer::new());
        for i in 0..1000 {
            buffer.push("k", test_record(i)).await.unwrap();
        }

        // Two racing drains: every record is observed exactly once
        let b1 = Arc::clone(&buffer);
        let b2 = Arc::clone(&buffer);
        let (d1, d2) = tokio::join!(
            tokio::spawn(async move { b1.drain("k").await.unwrap() }),
            tokio::spawn(async move { b2.drain("k").await.unwrap() }),
        );
        let total = d1.unwrap().len() + d2.unwrap().len();
        assert_eq!(total, 1000);
        assert_eq!(buffer.len("k").await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drain_concurrent_with_push_loses_nothing() {
        let buffer = Arc::new(MemoryBuffer::new());

        let pusher = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                for i in 0..2000 {
                    buffer.push("k", test_record(i)).await.unwrap();
                }
            })
        };
        let drainer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut collected = Vec::new();
                for _ in 0..50 {
                    collected.extend(buffer.drain("k").await.unwrap());
                    tokio::task::yield_now().await;
                }
                collected
            })
        };

        pusher.await.unwrap();
        let mut collected = drainer.await.unwrap();
        collected.extend(buffer.drain("k").await.unwrap());
        assert_eq!(collected.len(), 2000);
    }
}
