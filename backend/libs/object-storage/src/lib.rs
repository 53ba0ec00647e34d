//! Object storage access for the people pipelines
//!
//! Reading people files, writing demo objects, and making sure the target
//! bucket exists, behind one trait with S3 and in-memory implementations.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub mod config;
mod memory;
mod s3;

pub use config::ObjectStoreConfig;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Access denied to bucket: {0}")]
    AccessDenied(String),

    #[error("Object store error: {0}")]
    Backend(String),
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::NotFound { .. } | ObjectStoreError::BucketNotFound(_)
        )
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ObjectStoreError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    /// Create the bucket when missing; returns whether it had to be created
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, ObjectStoreError> {
        if self.bucket_exists(bucket).await? {
            return Ok(false);
        }

        self.create_bucket(bucket).await?;
        info!(bucket = %bucket, "Created missing bucket");
        Ok(true)
    }
}
