//! S3-backed object store

use crate::config::ObjectStoreConfig;
use crate::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Arc<Client>,
    config: ObjectStoreConfig,
}

impl S3ObjectStore {
    /// Create a store with AWS credentials from the environment
    pub async fn new(config: ObjectStoreConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            region = %config.region,
            endpoint = ?config.endpoint,
            default_bucket = %config.default_bucket,
            "S3 object store initialized"
        );

        Self::with_client(Client::from_conf(builder.build()), config)
    }

    pub fn with_client(client: Client, config: ObjectStoreConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }

    /// Get reference to underlying AWS S3 client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("NoSuchKey")
        || message.contains("NoSuchBucket")
        || message.contains("NotFound")
        || message.contains("404")
}

fn classify(bucket: &str, key: Option<&str>, message: String) -> ObjectStoreError {
    if message.contains("NoSuchBucket") {
        ObjectStoreError::BucketNotFound(bucket.to_string())
    } else if is_not_found(&message) {
        match key {
            Some(key) => ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            None => ObjectStoreError::BucketNotFound(bucket.to_string()),
        }
    } else if message.contains("AccessDenied") || message.contains("403") {
        ObjectStoreError::AccessDenied(bucket.to_string())
    } else {
        ObjectStoreError::Backend(message)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(bucket, Some(key), format!("{:?}", e)))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        let bytes = body.into_bytes().to_vec();
        debug!(bucket = %bucket, key = %key, bytes = bytes.len(), "Object downloaded");
        Ok(bytes)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let size = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(bucket, Some(key), format!("{:?}", e)))?;

        debug!(bucket = %bucket, key = %key, bytes = size, "Object uploaded");
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ObjectStoreError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = format!("{:?}", e);
                if is_not_found(&message) {
                    Ok(false)
                } else {
                    Err(classify(bucket, None, message))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(bucket, None, format!("{:?}", e)))?;

        info!(bucket = %bucket, "Bucket created");
        Ok(())
    }
}
