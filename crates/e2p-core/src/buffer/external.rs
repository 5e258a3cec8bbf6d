//! External-store buffer backend.
//!
//! Delegates accumulation to a remote object store through its
//! list/put/get/delete primitives. Each push writes one MessagePack-encoded
//! object under `<prefix>/<key>/<zero-padded-seq>.bin`, so a lexical listing
//! returns push order. Transport errors are translated into
//! `BufferError::Unavailable`, never propagated raw.
//!
//! The design assumes single-process ownership of each buffered key (per-key
//! record counts are tracked locally); sharing the store across processes
//! would require a distributed lock per key and is out of scope.

use super::RecordBuffer;
use crate::config::RecordVariant;
use crate::record::Record;
use crate::{BufferError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Object-store backed buffer.
pub struct ExternalBuffer {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    variant: RecordVariant,
    /// Next object sequence number per key
    seqs: DashMap<String, u64>,
    /// Locally tracked record count per key
    counts: DashMap<String, usize>,
    /// Per-key drain serialization so at most one caller observes a record
    drain_locks: DashMap<String, Arc<Mutex<()>>>,
    closed: AtomicBool,
}

impl ExternalBuffer {
    /// Create a buffer over an object store.
    ///
    /// The record variant is fixed per deployment and is needed to decode
    /// stored objects back into records.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, variant: RecordVariant) -> Self {
        Self {
            store,
            prefix: prefix.trim_matches('/').to_string(),
            variant,
            seqs: DashMap::new(),
            counts: DashMap::new(),
            drain_locks: DashMap::new(),
            closed: AtomicBool::new(false),
        }
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

    fn key_dir(&self, key: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.prefix, key_segment(key)))
    }

    fn object_path(&self, key: &str, seq: u64) -> ObjectPath {
        ObjectPath::from(format!("{}/{}/{:020}.bin", self.prefix, key_segment(key), seq))
    }

    fn drain_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.drain_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn next_seq(&self, key: &str) -> u64 {
        let mut entry = self.seqs.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// List a key's objects in push order.
    async fn list_objects(&self, key: &str) -> Result<Vec<ObjectPath>> {
        let dir = self.key_dir(key);
        let mut stream = self.store.list(Some(&dir));
        let mut paths = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(unavailable)?;
            paths.push(meta.location);
        }
        paths.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        Ok(paths)
    }

    /// Fetch and decode a key's objects without deleting them.
    async fn fetch_all(&self, key: &str) -> Result<(Vec<ObjectPath>, Vec<Record>)> {
        let paths = self.list_objects(key).await?;
        let mut records = Vec::new();
        for path in &paths {
            let data = self
                .store
                .get(path)
                .await
                .map_err(unavailable)?
                .bytes()
                .await
                .map_err(unavailable)?;
            records.extend(decode_records(self.variant, &data)?);
        }
        Ok((paths, records))
    }

    async fn put_records(&self, key: &str, records: &[Record]) -> Result<()> {
        let data = encode_records(records)?;
        let seq = self.next_seq(key);
        let path = self.object_path(key, seq);
        self.store
            .put(&path, PutPayload::from_bytes(Bytes::from(data)))
            .await
            .map_err(unavailable)?;
        self.counts
            .entry(key.to_string())
            .and_modify(|c| *c += records.len())
            .or_insert(records.len());
        debug!(key = %key, seq = seq, count = records.len(), "Pushed records to external store");
        Ok(())
    }
}

#[async_trait]
impl RecordBuffer for ExternalBuffer {
    async fn push(&self, key: &str, record: Record) -> Result<()> {
        self.check_open(key)?;
        self.put_records(key, std::slice::from_ref(&record)).await
    }

    async fn push_batch(&self, key: &str, records: Vec<Record>) -> Result<()> {
        self.check_open(key)?;
        if records.is_empty() {
            return Ok(());
        }
        // One object per call: the batch is accepted or not as a whole
        self.put_records(key, &records).await
    }

    async fn len(&self, key: &str) -> usize {
        self.counts.get(key).map(|c| *c).unwrap_or(0)
    }

    async fn get(&self, key: &str) -> Result<Vec<Record>> {
        let lock = self.drain_lock(key);
        let _guard = lock.lock().await;
        let (_, records) = self.fetch_all(key).await?;
        Ok(records)
    }

    async fn drain(&self, key: &str) -> Result<Vec<Record>> {
        let lock = self.drain_lock(key);
        let _guard = lock.lock().await;

        let (paths, records) = self.fetch_all(key).await?;
        for path in &paths {
            // A failed delete leaves the object for a later drain: duplicate
            // delivery is possible, loss is not (at-least-once).
            if let Err(e) = self.store.delete(path).await {
                warn!(path = %path, error = %e, "Failed to delete drained buffer object");
            }
        }
        self.counts
            .entry(key.to_string())
            .and_modify(|c| *c = c.saturating_sub(records.len()));
        if !records.is_empty() {
            debug!(key = %key, count = records.len(), "Drained partition from external store");
        }
        Ok(records)
    }

    async fn keys(&self) -> Vec<String> {
        self.counts
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn is_ready(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let prefix = ObjectPath::from(self.prefix.clone());
        let mut stream = self.store.list(Some(&prefix));
        !matches!(stream.next().await, Some(Err(_)))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Keys may contain characters with path meaning; flatten them for object
/// names. The local count/seq maps still use the original key.
fn key_segment(key: &str) -> String {
    key.replace('/', "_")
}

fn encode_records(records: &[Record]) -> Result<Vec<u8>> {
    let frames: Vec<Vec<u8>> = records
        .iter()
        .map(|r| r.to_binary())
        .collect::<Result<_>>()?;
    Ok(rmp_serde::to_vec(&frames)?)
}

fn decode_records(variant: RecordVariant, data: &[u8]) -> Result<Vec<Record>> {
    let frames: Vec<Vec<u8>> = rmp_serde::from_slice(data)?;
    frames
        .iter()
        .map(|frame| Record::from_binary(variant, frame))
        .collect()
}

fn unavailable(err: object_store::Error) -> crate::Error {
    BufferError::Unavailable(err.to_string()).into()
}
