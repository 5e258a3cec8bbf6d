//! Pluggable sink for finalized columnar files.
//!
//! The sink owns final persistence; the core hands it a finalized byte
//! stream and a partition-aware target path and is done with the batch.

use crate::config::SinkConfig;
use crate::{Result, SinkError};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Destination for finalized files.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Persist a finalized file at the given target path.
    async fn write(&self, data: Bytes, target_path: &str) -> Result<()>;

    /// Release sink resources. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Sink health.
    async fn is_ready(&self) -> bool;
}

/// Resolve an object store for a location string: an `s3://` URL or a local
/// directory (created if missing).
pub fn open_object_store(
    location: &str,
    s3_region: Option<&str>,
    s3_endpoint: Option<&str>,
) -> Result<Arc<dyn ObjectStore>> {
    if let Some(rest) = location.strip_prefix("s3://") {
        use object_store::aws::AmazonS3Builder;

        let bucket = rest
            .split('/')
            .next()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| SinkError::Unavailable(format!("invalid S3 URL '{}'", location)))?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = s3_region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = s3_endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Arc::new(store))
    } else {
        use object_store::local::LocalFileSystem;

        let path = std::path::Path::new(location);
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Arc::new(store))
    }
}

/// Object-store backed sink (local filesystem or S3-compatible storage).
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    closed: AtomicBool,
}

impl ObjectStoreSink {
    /// Create a sink from its configuration.
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        let store = open_object_store(
            &config.location,
            config.s3_region.as_deref(),
            config.s3_endpoint.as_deref(),
        )?;
        Ok(Self::new(store))
    }

    /// Create a sink over an existing store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FileSink for ObjectStoreSink {
    async fn write(&self, data: Bytes, target_path: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed.into());
        }

        let size = data.len();
        let path = ObjectPath::from(target_path);
        self.store
            .put(&path, PutPayload::from_bytes(data))
            .await
            .map_err(|e| SinkError::Write {
                path: target_path.to_string(),
                message: e.to_string(),
            })?;

        debug!(path = %target_path, size_bytes = size, "Wrote finalized file");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_sink_writes_file() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig {
            location: dir.path().to_str().unwrap().to_string(),
            s3_region: None,
            s3_endpoint: None,
        };
        let sink = ObjectStoreSink::from_config(&config).unwrap();
        assert!(sink.is_ready().await);

        sink.write(
            Bytes::from_static(b"PAR1data"),
            "cap/year=2026/month=08/day=08/hour=10/id-key-hash.parquet",
        )
        .await
        .unwrap();

        let written = dir
            .path()
            .join("cap/year=2026/month=08/day=08/hour=10/id-key-hash.parquet");
        assert_eq!(std::fs::read(written).unwrap(), b"PAR1data");
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig {
            location: dir.path().to_str().unwrap().to_string(),
            s3_region: None,
            s3_endpoint: None,
        };
        let sink = ObjectStoreSink::from_config(&config).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert!(!sink.is_ready().await);

        let err = sink
            .write(Bytes::from_static(b"x"), "a/b.parquet")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_invalid_s3_url_rejected() {
        assert!(open_object_store("s3://", None, None).is_err());
    }

    #[test]
    fn test_local_store_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("warehouse/out");
        let store = open_object_store(nested.to_str().unwrap(), None, None);
        assert!(store.is_ok());
        assert!(nested.exists());
    }
}
