//! Storage abstractions for the granule pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (MinIO/S3) for archived granule bytes
//! - PostgreSQL for the granule/granule_count/status data model
//! - Redis Streams for the "to-download" queue

pub mod catalog;
pub mod object_store;
pub mod queue;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, StoragePath, StorageStats};
pub use catalog::{AdmissionOutcome, Catalog, ClaimOutcome};
pub use queue::{DownloadQueue, QueueEntry};
