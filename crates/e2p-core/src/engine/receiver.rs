//! The receiver sequences push, threshold check, drain, convert and
//! hand-off to the sink.
//!
//! Each partition key cycles Accumulating -> Flushing -> Accumulating; on
//! shutdown every key is drained once more before the buffer closes.
//! Conversion runs on its own task so ingestion is never blocked behind
//! encoding, and a flush in progress during shutdown is allowed to complete.

use super::dead_letter::DeadLetterQueue;
use crate::backoff::RetryPolicy;
use crate::buffer::{ExternalBuffer, MemoryBuffer, RecordBuffer};
use crate::config::{BufferBackend, Config};
use crate::convert::{schema_for, ParquetConverter, WriteResult};
use crate::health::HealthCheck;
use crate::metrics::ReceiverMetrics;
use crate::record::{Record, RecordInfo};
use crate::sink::{open_object_store, FileSink, ObjectStoreSink};
use crate::{BufferError, ConvertError, Error, Result};
use arrow::datatypes::SchemaRef;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receiver tuning knobs.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Flush a partition once it holds this many records
    pub flush_threshold: usize,
    /// Periodic flush sweep interval
    pub flush_interval: Duration,
    /// Backoff for pushes while the buffer backend is unavailable
    pub retry: RetryPolicy,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            flush_threshold: 5000,
            flush_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrator wiring buffer, converter and sink.
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Receiver {
    shared: Arc<Shared>,
}

struct Shared {
    options: ReceiverOptions,
    buffer: Arc<dyn RecordBuffer>,
    converter: ParquetConverter,
    sink: Arc<dyn FileSink>,
    schema: SchemaRef,
    /// Per-key flush serialization
    flush_locks: DashMap<String, Arc<Mutex<()>>>,
    dead_letters: DeadLetterQueue,
    metrics: Arc<ReceiverMetrics>,
    health: Arc<HealthCheck>,
    closed: AtomicBool,
}

impl Receiver {
    /// Wire a receiver from explicit parts.
    pub fn new(
        buffer: Arc<dyn RecordBuffer>,
        sink: Arc<dyn FileSink>,
        schema: SchemaRef,
        converter: ParquetConverter,
        options: ReceiverOptions,
    ) -> Self {
        let health = Arc::new(HealthCheck::new());
        health.register("buffer");
        health.register("converter");
        health.register("sink");

        Self {
            shared: Arc::new(Shared {
                options,
                buffer,
                converter,
                sink,
                schema,
                flush_locks: DashMap::new(),
                dead_letters: DeadLetterQueue::default(),
                metrics: Arc::new(ReceiverMetrics::new()),
                health,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Build a receiver from configuration.
    pub fn from_config(config: &Config) -> Result<Receiver> {
        config.validate()?;

        let schema = schema_for(config)?;

        let buffer: Arc<dyn RecordBuffer> = match config.buffer.backend {
            BufferBackend::Mem => Arc::new(MemoryBuffer::new()),
            BufferBackend::External => {
                let location = config.buffer.external.location.as_ref().ok_or_else(|| {
                    Error::Config("External buffer backend requires a store location".into())
                })?;
                let store = open_object_store(
                    location,
                    config.sink.s3_region.as_deref(),
                    config.sink.s3_endpoint.as_deref(),
                )?;
                Arc::new(ExternalBuffer::new(
                    store,
                    &config.buffer.external.prefix,
                    config.record.variant,
                ))
            }
        };

        let sink = Arc::new(ObjectStoreSink::from_config(&config.sink)?);
        let converter = ParquetConverter::new(
            config.writer.compression,
            config.writer.row_group_size,
        );
        let options = ReceiverOptions {
            flush_threshold: config.buffer.flush_threshold,
            flush_interval: Duration::from_secs(config.buffer.flush_interval_seconds),
            retry: RetryPolicy::default(),
        };

        Ok(Receiver::new(buffer, sink, schema, converter, options))
    }

    /// Ingest one record: derive its key, push it, and trigger an
    /// asynchronous flush when the partition crosses the threshold.
    pub async fn write(&self, record: Record) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed.into());
        }

        let key = record.key().to_string();
        self.push_with_retry(&key, record).await?;
        self.shared.metrics.record_accepted();

        if self.shared.buffer.len(&key).await >= self.shared.options.flush_threshold {
            let receiver = self.clone();
            tokio::spawn(async move {
                receiver.flush_if_idle(&key).await;
            });
        }
        Ok(())
    }

    /// Push with exponential backoff while the backend reports itself
    /// unavailable. The record is never dropped: retries are exhausted
    /// before the error reaches the caller.
    async fn push_with_retry(&self, key: &str, record: Record) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.shared.buffer.push(key, record.clone()).await {
                Ok(()) => {
                    self.shared.health.mark_healthy("buffer");
                    return Ok(());
                }
                Err(err @ Error::Buffer(BufferError::Unavailable(_))) => {
                    if attempt >= self.shared.options.retry.max_retries {
                        self.shared
                            .health
                            .mark_unhealthy("buffer", &err.to_string());
                        return Err(err);
                    }
                    let delay = self.shared.options.retry.delay_for(attempt);
                    warn!(
                        key = %key,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Buffer unavailable, retrying push"
                    );
                    self.shared
                        .health
                        .mark_degraded("buffer", "backend unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Flush one partition: drain, convert, hand the file to the sink.
    ///
    /// On finalize or sink failure the drained records are pushed back so
    /// buffered data is retained until a flush fully succeeds; encode-failed
    /// records go to the dead-letter queue.
    pub async fn flush(&self, key: &str) -> Result<()> {
        let lock = self.flush_lock(key);
        let _guard = lock.lock().await;
        self.flush_locked(key).await
    }

    /// Threshold-triggered variant: skips when another flush for the key is
    /// already running (that flush drains the same records).
    async fn flush_if_idle(&self, key: &str) {
        let lock = self.flush_lock(key);
        let Ok(_guard) = lock.try_lock() else {
            return;
        };
        if let Err(e) = self.flush_locked(key).await {
            warn!(key = %key, error = %e, "Background flush failed");
        }
    }

    fn flush_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.shared
            .flush_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn flush_locked(&self, key: &str) -> Result<()> {
        let records = self.shared.buffer.drain(key).await?;
        if records.is_empty() {
            return Ok(());
        }
        let drained = records.len();
        let start = Instant::now();

        let output = self
            .shared
            .converter
            .write(key, records, &self.shared.schema);

        let mut batch_error: Option<String> = None;
        let mut encode_failures = 0usize;
        for result in output.results {
            if result.is_batch_failure() {
                if let Some(err) = &result.error {
                    batch_error = Some(err.to_string());
                }
            } else if result.error.is_some() {
                encode_failures += 1;
                self.shared.metrics.record_dead_letter();
                self.shared.dead_letters.push(result);
            }
        }
        if encode_failures > 0 {
            self.shared.metrics.record_encode_errors(encode_failures);
            self.shared.metrics.records_unbuffered(encode_failures);
            warn!(
                key = %key,
                count = encode_failures,
                "Records failed encoding and were dead-lettered"
            );
        }

        if let Some(message) = batch_error {
            // The output stream is not trustworthy; keep the batch
            self.shared.metrics.record_flush_failure();
            self.shared.health.mark_degraded("converter", &message);
            self.restore(key, output.encoded).await;
            return Err(ConvertError::Finalize(message).into());
        }

        let Some(bytes) = output.bytes else {
            // Every record failed encoding; nothing to write
            return Ok(());
        };
        self.shared.health.mark_healthy("converter");

        let rows = output.encoded.len();
        let generation_id = Uuid::new_v4().to_string();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes);
        let content_hash = format!("{:08x}", hasher.finalize());
        let info = RecordInfo::from_key(key);
        let path = info.target_path(Utc::now(), &generation_id, &content_hash);

        if let Err(err) = self.shared.sink.write(bytes, &path).await {
            self.shared.metrics.record_flush_failure();
            self.shared.health.mark_unhealthy("sink", &err.to_string());
            self.restore(key, output.encoded).await;
            return Err(err);
        }
        self.shared.health.mark_healthy("sink");

        let duration = start.elapsed();
        self.shared.metrics.record_flush(rows, duration);
        self.shared.metrics.records_unbuffered(rows);
        info!(
            key = %key,
            rows = rows,
            drained = drained,
            path = %path,
            duration_ms = duration.as_millis() as u64,
            "Partition flushed"
        );
        Ok(())
    }

    /// Push a failed batch back into the buffer. If even that fails the
    /// records go to the dead-letter queue rather than vanishing.
    async fn restore(&self, key: &str, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        let count = records.len();
        if let Err(err) = self.shared.buffer.push_batch(key, records.clone()).await {
            error!(
                key = %key,
                count = count,
                error = %err,
                "Failed to restore records after failed flush, dead-lettering them"
            );
            let message = err.to_string();
            for record in records {
                self.shared.metrics.record_dead_letter();
                self.shared.dead_letters.push(WriteResult::record_failure(
                    key,
                    BufferError::Unavailable(message.clone()).into(),
                    record,
                ));
            }
            self.shared.metrics.records_unbuffered(count);
        } else {
            debug!(key = %key, count = count, "Retained records after failed flush");
        }
    }

    /// Flush every partition with buffered records. All keys are attempted;
    /// the first error is reported.
    pub async fn flush_all(&self) -> Result<()> {
        let keys = self.shared.buffer.keys().await;
        let mut first_error = None;
        for key in keys {
            if let Err(err) = self.flush(&key).await {
                warn!(key = %key, error = %err, "Flush failed during sweep");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Run the periodic flush sweep until shutdown, then drain and close.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.shared.options.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_s = self.shared.options.flush_interval.as_secs(),
            "Receiver flush sweep started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_all().await {
                        warn!(error = %e, "Periodic flush sweep reported failures");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, draining buffered records");
                    break;
                }
            }
        }

        self.close().await
    }

    /// Flush everything, then close the buffer and sink. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flush_result = self.flush_all().await;
        self.shared.buffer.close().await?;
        self.shared.sink.close().await?;
        info!("Receiver closed");
        flush_result
    }

    /// Buffered record count for a key.
    pub async fn buffered(&self, key: &str) -> usize {
        self.shared.buffer.len(key).await
    }

    /// Whether buffer and sink both accept work.
    pub async fn is_ready(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
            && self.shared.buffer.is_ready().await
            && self.shared.sink.is_ready().await
    }

    /// Take every dead-lettered result collected so far.
    pub fn take_dead_letters(&self) -> Vec<WriteResult> {
        self.shared.dead_letters.take_all()
    }

    pub fn metrics(&self) -> Arc<ReceiverMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    pub fn health(&self) -> Arc<HealthCheck> {
        Arc::clone(&self.shared.health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Compression, RecordVariant};
    use crate::convert::typed_schema;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex as SyncMutex;

    /// Sink capturing writes, optionally failing them.
    struct TestSink {
        files: SyncMutex<Vec<(String, Bytes)>>,
        fail: AtomicBool,
    }

    impl TestSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                files: SyncMutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn files(&self) -> Vec<(String, Bytes)> {
            self.files.lock().clone()
        }
    }

    #[async_trait]
    impl FileSink for TestSink {
        async fn write(&self, data: Bytes, target_path: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::SinkError::Write {
                    path: target_path.to_string(),
                    message: "injected failure".into(),
                }
                .into());
            }
            self.files.lock().push((target_path.to_string(), data));
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn is_ready(&self) -> bool {
            true
        }
    }

    fn typed_record(n: usize) -> Record {
        let map = serde_json::json!({
            "capability": "alpha",
            "domain": "core",
            "service": "svc",
            "application": "app",
            "message": format!("event-{}", n),
        });
        match map {
            serde_json::Value::Object(m) => Record::new(RecordVariant::Typed, m).unwrap(),
            _ => unreachable!(),
        }
    }

    fn test_receiver(sink: Arc<TestSink>, threshold: usize) -> Receiver {
        Receiver::new(
            Arc::new(MemoryBuffer::new()),
            sink,
            typed_schema(),
            ParquetConverter::new(Compression::Snappy, 1024),
            ReceiverOptions {
                flush_threshold: threshold,
                flush_interval: Duration::from_secs(3600),
                retry: RetryPolicy::default().without_jitter(),
            },
        )
    }

    #[tokio::test]
    async fn test_explicit_flush_clears_partition() {
        let sink = TestSink::new();
        let receiver = test_receiver(Arc::clone(&sink), 1_000_000);

        for i in 0..25 {
            receiver.write(typed_record(i)).await.unwrap();
        }
        assert_eq!(receiver.buffered("alpha.core.svc.app").await, 25);

        receiver.flush("alpha.core.svc.app").await.unwrap();
        assert_eq!(receiver.buffered("alpha.core.svc.app").await, 0);

        let files = sink.files();
        assert_eq!(files.len(), 1);
        assert!(files[0].0.starts_with("alpha/year="));
        assert!(files[0].0.contains("-alpha.core.svc.app-"));
        assert!(files[0].0.ends_with(".parquet"));
        assert_eq!(receiver.metrics().rows_flushed_total(), 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_threshold_triggers_background_flush() {
        let sink = TestSink::new();
        let receiver = test_receiver(Arc::clone(&sink), 10);

        for i in 0..10 {
            receiver.write(typed_record(i)).await.unwrap();
        }

        // The flush runs off the write path; wait for it to land
        for _ in 0..100 {
            if !sink.files().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.files().len(), 1);
        assert_eq!(receiver.buffered("alpha.core.svc.app").await, 0);
    }

    #[tokio::test]
    async fn test_failed_sink_retains_records() {
        let sink = TestSink::new();
        let receiver = test_receiver(Arc::clone(&sink), 1_000_000);

        for i in 0..5 {
            receiver.write(typed_record(i)).await.unwrap();
        }

        sink.set_failing(true);
        let err = receiver.flush("alpha.core.svc.app").await.unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        // Buffered data is retained, not cleared, until a flush succeeds
        assert_eq!(receiver.buffered("alpha.core.svc.app").await, 5);
        assert_eq!(receiver.metrics().flush_failures_total(), 1);

        sink.set_failing(false);
        receiver.flush("alpha.core.svc.app").await.unwrap();
        assert_eq!(receiver.buffered("alpha.core.svc.app").await, 0);
        assert_eq!(sink.files().len(), 1);
    }

    #[tokio::test]
    async fn test_encode_failures_are_dead_lettered() {
        let schema = crate::convert::parse_schema_description(
            r#"[{"name": "user", "type": "string"}, {"name": "count", "type": "int64"}]"#,
        )
        .unwrap();
        let sink = TestSink::new();
        let receiver = Receiver::new(
            Arc::new(MemoryBuffer::new()),
            Arc::clone(&sink) as Arc<dyn FileSink>,
            schema,
            ParquetConverter::new(Compression::Snappy, 1024),
            ReceiverOptions {
                flush_threshold: 1_000_000,
                flush_interval: Duration::from_secs(3600),
                retry: RetryPolicy::default().without_jitter(),
            },
        );

        let good = serde_json::json!({"capability": "cap", "user": "alice", "count": 1});
        let bad = serde_json::json!({"capability": "cap", "user": "bob", "count": "seven"});
        for value in [good, bad] {
            let serde_json::Value::Object(map) = value else {
                unreachable!()
            };
            receiver
                .write(Record::new(RecordVariant::Dynamic, map).unwrap())
                .await
                .unwrap();
        }

        receiver.flush("cap.unknown.unknown.unknown").await.unwrap();
        assert_eq!(sink.files().len(), 1);

        let dead = receiver.take_dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].record.is_some());
        assert_eq!(receiver.metrics().encode_errors_total(), 1);
        // Taking drains the queue
        assert!(receiver.take_dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_flush_all_sweeps_every_key() {
        let sink = TestSink::new();
        let receiver = test_receiver(Arc::clone(&sink), 1_000_000);

        receiver.write(typed_record(0)).await.unwrap();
        let other = serde_json::json!({
            "capability": "beta", "domain": "core", "service": "svc", "application": "app",
        });
        let serde_json::Value::Object(map) = other else {
            unreachable!()
        };
        receiver
            .write(Record::new(RecordVariant::Typed, map).unwrap())
            .await
            .unwrap();

        receiver.flush_all().await.unwrap();
        assert_eq!(sink.files().len(), 2);
    }

    #[tokio::test]
    async fn test_close_flushes_and_rejects_writes() {
        let sink = TestSink::new();
        let receiver = test_receiver(Arc::clone(&sink), 1_000_000);

        receiver.write(typed_record(0)).await.unwrap();
        receiver.close().await.unwrap();
        receiver.close().await.unwrap();

        assert_eq!(sink.files().len(), 1);
        assert!(!receiver.is_ready().await);
        let err = receiver.write(typed_record(1)).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
