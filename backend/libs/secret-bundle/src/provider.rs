//! Secret provider abstraction and a fixed in-memory provider

use crate::{SecretBundle, SecretContent, SecretError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Source of secret bundles by id
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret_bundle(&self, secret_id: &str) -> Result<SecretBundle, SecretError>;
}

/// Provider serving a fixed set of secrets (local runs and tests)
#[derive(Debug, Default)]
pub struct StaticSecretProvider {
    secrets: RwLock<HashMap<String, SecretContent>>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, secret_id: impl Into<String>, content: SecretContent) -> Self {
        self.insert(secret_id, content);
        self
    }

    pub fn insert(&self, secret_id: impl Into<String>, content: SecretContent) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(secret_id.into(), content);
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret_bundle(&self, secret_id: &str) -> Result<SecretBundle, SecretError> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| SecretError::Cache("static secret store poisoned".to_string()))?;

        let content = secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(secret_id.to_string()))?;

        debug!(secret_id = %secret_id, "Secret served from static provider");
        Ok(SecretBundle::new(secret_id, content))
    }
}
