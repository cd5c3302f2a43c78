pub mod memory;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Blob store holding source and processed images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs and metrics
    fn backend(&self) -> &'static str;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn health_check(&self) -> bool {
        true
    }
}

pub(crate) fn record_operation(operation: &str, result: &Result<impl Sized, StorageError>) {
    let status = match result {
        Ok(_) => "success",
        Err(StorageError::NotFound { .. }) => "not_found",
        Err(StorageError::Backend(_)) => "error",
    };
    telemetry::metrics::CROWD_STORAGE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}
