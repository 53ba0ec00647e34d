//! AWS Secrets Manager provider with TTL caching

use crate::{SecretBundle, SecretContent, SecretError, SecretProvider};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsClient;
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, info};

/// Cached bundle with fetch metadata
#[derive(Clone, Debug)]
struct CachedSecret {
    bundle: SecretBundle,
    fetched_at: chrono::DateTime<chrono::Utc>,
}

/// AWS Secrets Manager client with caching
///
/// String secrets become [`SecretContent::Text`], binary secrets
/// [`SecretContent::Binary`]. Set `base64_strings` when string secrets hold
/// base64-wrapped payloads.
pub struct AwsSecretsProvider {
    client: SecretsClient,
    cache: Cache<String, CachedSecret>,
    cache_ttl: Duration,
    base64_strings: bool,
}

impl AwsSecretsProvider {
    /// Create a provider with default AWS configuration and a 5 minute cache
    ///
    /// Uses AWS credentials from:
    /// 1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
    /// 2. AWS credentials file (~/.aws/credentials)
    /// 3. IAM instance profile or IRSA
    pub async fn new() -> Self {
        AwsSecretsProviderBuilder::default().build().await
    }

    pub fn builder() -> AwsSecretsProviderBuilder {
        AwsSecretsProviderBuilder::default()
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Fetch from AWS and update the cache
    async fn fetch_secret(&self, secret_id: &str) -> Result<SecretBundle, SecretError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(secret_id, &e.to_string()))?;

        let content = match (response.secret_string(), response.secret_binary()) {
            (Some(text), _) if self.base64_strings => SecretContent::Base64(text.to_string()),
            (Some(text), _) => SecretContent::Text(text.to_string()),
            (None, Some(blob)) => SecretContent::Binary(blob.as_ref().to_vec()),
            (None, None) => {
                return Err(SecretError::InvalidFormat(format!(
                    "Secret '{}' has no value",
                    secret_id
                )))
            }
        };

        let bundle = SecretBundle {
            secret_id: secret_id.to_string(),
            version_id: response.version_id().map(|s| s.to_string()),
            content,
        };

        self.cache
            .insert(
                secret_id.to_string(),
                CachedSecret {
                    bundle: bundle.clone(),
                    fetched_at: chrono::Utc::now(),
                },
            )
            .await;

        info!(
            secret_id = %secret_id,
            version_id = ?bundle.version_id,
            "Secret fetched and cached from AWS Secrets Manager"
        );

        Ok(bundle)
    }

    /// Invalidate cache for a specific secret (useful after rotation)
    pub async fn invalidate_cache(&self, secret_id: &str) {
        self.cache.invalidate(secret_id).await;
        info!(secret_id = %secret_id, "Secret cache invalidated");
    }

    /// Number of cached secrets
    pub async fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl SecretProvider for AwsSecretsProvider {
    async fn get_secret_bundle(&self, secret_id: &str) -> Result<SecretBundle, SecretError> {
        if let Some(cached) = self.cache.get(secret_id).await {
            debug!(
                secret_id = %secret_id,
                version_id = ?cached.bundle.version_id,
                cached_at = %cached.fetched_at,
                "Secret retrieved from cache"
            );
            return Ok(cached.bundle);
        }

        debug!(secret_id = %secret_id, "Fetching secret from AWS Secrets Manager");
        self.fetch_secret(secret_id).await
    }
}

/// Map an SDK error message to the error taxonomy
fn classify_sdk_error(secret_id: &str, message: &str) -> SecretError {
    if message.contains("ResourceNotFoundException") {
        SecretError::NotFound(secret_id.to_string())
    } else if message.contains("AccessDeniedException") {
        SecretError::AccessDenied(secret_id.to_string())
    } else if message.contains("DecryptionFailure") {
        SecretError::DecryptionFailed(secret_id.to_string())
    } else {
        SecretError::AwsSdk(message.to_string())
    }
}

/// Builder for [`AwsSecretsProvider`]
pub struct AwsSecretsProviderBuilder {
    cache_ttl: Duration,
    max_cache_entries: u64,
    region: Option<String>,
    base64_strings: bool,
}

impl Default for AwsSecretsProviderBuilder {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300), // 5 minutes
            max_cache_entries: 100,
            region: None,
            base64_strings: false,
        }
    }
}

impl AwsSecretsProviderBuilder {
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn max_cache_entries(mut self, max: u64) -> Self {
        self.max_cache_entries = max;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Treat string secrets as base64-wrapped payloads
    pub fn base64_strings(mut self, enabled: bool) -> Self {
        self.base64_strings = enabled;
        self
    }

    pub async fn build(self) -> AwsSecretsProvider {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = self.region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        let client = SecretsClient::new(&config);

        info!(
            cache_ttl = ?self.cache_ttl,
            max_entries = self.max_cache_entries,
            "Initialized AWS Secrets Manager provider"
        );

        let cache = Cache::builder()
            .max_capacity(self.max_cache_entries)
            .time_to_live(self.cache_ttl)
            .build();

        AwsSecretsProvider {
            client,
            cache,
            cache_ttl: self.cache_ttl,
            base64_strings: self.base64_strings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sdk_error() {
        assert!(matches!(
            classify_sdk_error("db", "service error: ResourceNotFoundException: gone"),
            SecretError::NotFound(id) if id == "db"
        ));
        assert!(matches!(
            classify_sdk_error("db", "AccessDeniedException"),
            SecretError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_sdk_error("db", "DecryptionFailure: kms"),
            SecretError::DecryptionFailed(_)
        ));
        assert!(matches!(
            classify_sdk_error("db", "dispatch failure"),
            SecretError::AwsSdk(_)
        ));
    }
}
