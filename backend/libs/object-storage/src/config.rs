//! Object store configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket used when a request names none
    pub default_bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (MinIO, LocalStack); `None` uses AWS
    pub endpoint: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            default_bucket: "people-demo".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            path_style: false,
        }
    }
}

impl ObjectStoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_bucket: std::env::var("S3_BUCKET").unwrap_or(defaults.default_bucket),
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            path_style: std::env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.path_style),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("S3_BUCKET", "people-files");
        std::env::set_var("S3_ENDPOINT", "http://localhost:9000");
        std::env::set_var("S3_PATH_STYLE", "true");

        let config = ObjectStoreConfig::from_env();
        assert_eq!(config.default_bucket, "people-files");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.path_style);

        std::env::remove_var("S3_BUCKET");
        std::env::remove_var("S3_ENDPOINT");
        std::env::remove_var("S3_PATH_STYLE");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("S3_BUCKET");
        std::env::remove_var("S3_ENDPOINT");
        std::env::set_var("S3_PATH_STYLE", "not-a-bool");

        let config = ObjectStoreConfig::from_env();
        assert_eq!(config.default_bucket, "people-demo");
        assert!(config.endpoint.is_none());
        assert!(!config.path_style);

        std::env::remove_var("S3_PATH_STYLE");
    }
}
