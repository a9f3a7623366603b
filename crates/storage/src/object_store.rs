//! Object storage interface for archived granule bytes (MinIO/S3 compatible).

use bytes::Bytes;
use futures::Stream;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use pipeline_common::{PipelineError, PipelineResult};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "s2-granules".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

/// Object storage client for archived granules.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> PipelineResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| PipelineError::ObjectStore(format!("failed to create S3 client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Write `data` to `path`, verifying it against `expected_md5_hex` (the
    /// upstream-declared checksum) before it is considered persisted.
    ///
    /// `object_store` itself speaks to S3-compatible backends that validate
    /// an uploaded payload's MD5 server-side when given one; we additionally
    /// hash locally so a mismatch is caught uniformly across backends and
    /// surfaces as [`PipelineError::ChecksumMismatch`] rather than a bare
    /// transport error.
    #[instrument(skip(self, data, expected_md5_hex), fields(bucket = %self.bucket, path = %path))]
    pub async fn put_with_checksum(
        &self,
        path: &str,
        data: Bytes,
        expected_md5_hex: &str,
    ) -> PipelineResult<()> {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(&data);
        let actual = hex::encode(hasher.finalize());

        if !actual.eq_ignore_ascii_case(expected_md5_hex) {
            return Err(PipelineError::ChecksumMismatch {
                expected: expected_md5_hex.to_string(),
                actual,
            });
        }

        let location = Path::from(path);
        debug!(size = data.len(), "writing object");

        self.store
            .put(&location, PutPayload::from_bytes(data))
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("failed to write {path}: {e}")))?;

        Ok(())
    }

    /// Stream `body` (e.g. a download response's chunk stream) to `path` via
    /// a multipart upload, hashing as each chunk arrives rather than
    /// buffering the whole product in memory first (§4.3 step 5, §6 object
    /// store egress: a client-declared MD5 must match the upstream
    /// checksum). A mismatch — or any chunk read failure — aborts the
    /// multipart upload so no partial or corrupt object is left behind.
    #[instrument(skip(self, body, expected_md5_hex), fields(bucket = %self.bucket, path = %path))]
    pub async fn put_stream_with_checksum<S>(
        &self,
        path: &str,
        mut body: S,
        expected_md5_hex: &str,
    ) -> PipelineResult<()>
    where
        S: Stream<Item = PipelineResult<Bytes>> + Unpin,
    {
        use futures::StreamExt;
        use md5::{Digest, Md5};

        let location = Path::from(path);
        let (multipart_id, mut writer) = self.store.put_multipart(&location).await.map_err(|e| {
            PipelineError::ObjectStore(format!("failed to start multipart upload for {path}: {e}"))
        })?;

        let mut hasher = Md5::new();
        let mut write_failed = false;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    write_failed = true;
                    let _ = writer.shutdown().await;
                    let _ = self.store.abort_multipart(&location, &multipart_id).await;
                    return Err(e);
                }
            };
            hasher.update(&chunk);
            if writer.write_all(&chunk).await.is_err() {
                write_failed = true;
                break;
            }
        }

        let actual = hex::encode(hasher.finalize());
        let checksum_matches = actual.eq_ignore_ascii_case(expected_md5_hex);

        if write_failed || !checksum_matches {
            let _ = writer.shutdown().await;
            let _ = self.store.abort_multipart(&location, &multipart_id).await;

            if !checksum_matches {
                return Err(PipelineError::ChecksumMismatch {
                    expected: expected_md5_hex.to_string(),
                    actual,
                });
            }
            return Err(PipelineError::ObjectStore(format!(
                "streaming upload to {path} failed mid-transfer"
            )));
        }

        writer.shutdown().await.map_err(|e| {
            PipelineError::ObjectStore(format!("failed to finalize upload to {path}: {e}"))
        })?;

        debug!("streamed object written");
        Ok(())
    }

    /// Write bytes to a path without checksum verification (used for
    /// ad hoc writes outside the granule archival path).
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> PipelineResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "writing object");

        self.store
            .put(&location, PutPayload::from_bytes(data))
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("failed to write {path}: {e}")))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> PipelineResult<Bytes> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("failed to read {path}: {e}")))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("failed to read bytes: {e}")))?;

        debug!(size = bytes.len(), "read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> PipelineResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(PipelineError::ObjectStore(format!(
                "failed to check {path}: {e}"
            ))),
        }
    }

    /// List objects with a given prefix.
    pub async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("list failed: {e}")))?
        {
            paths.push(meta.location.to_string());
        }

        Ok(paths)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn delete(&self, path: &str) -> PipelineResult<()> {
        let location = Path::from(path);

        self.store
            .delete(&location)
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("failed to delete {path}: {e}")))?;

        Ok(())
    }

    /// Get storage statistics (total size and object count).
    pub async fn stats(&self) -> PipelineResult<StorageStats> {
        use futures::TryStreamExt;

        let mut total_size: u64 = 0;
        let mut object_count: u64 = 0;

        let mut stream = self.store.list(None);
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| PipelineError::ObjectStore(format!("list failed: {e}")))?
        {
            total_size += meta.size as u64;
            object_count += 1;
        }

        Ok(StorageStats {
            total_size,
            object_count,
            bucket: self.bucket.clone(),
        })
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    /// Total size in bytes
    pub total_size: u64,
    /// Number of objects
    pub object_count: u64,
    /// Bucket name
    pub bucket: String,
}

/// Path builder for the granule archive layout.
pub struct StoragePath;

impl StoragePath {
    /// Build the archive key for a granule: `<YYYY-MM-DD>/<filename>` where
    /// the date is the granule's acquisition date (`beginposition.date()`),
    /// per the object-store egress contract.
    pub fn granule_key(acquisition_date: &chrono::NaiveDate, filename: &str) -> String {
        format!("{}/{}", acquisition_date.format("%Y-%m-%d"), filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granule_key_uses_acquisition_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
        assert_eq!(
            StoragePath::granule_key(&date, "S2B_MSIL1C_20250127T103021.zip"),
            "2025-01-27/S2B_MSIL1C_20250127T103021.zip"
        );
    }
}
