//! Secret lookup with explicitly tagged content
//!
//! This library provides:
//! - A [`SecretProvider`] trait returning [`SecretBundle`]s
//! - [`SecretContent`] that records whether a payload is base64, text or
//!   raw bytes, so decoding is always an explicit step
//! - JSON parsing of decoded bundles into typed connection details
//! - Writing decoded secrets (e.g. wallet files) to disk
//! - An AWS Secrets Manager provider with TTL caching and a static provider
//!
//! # Example
//!
//! ```no_run
//! use secret_bundle::{AwsSecretsProvider, SecretProvider};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct StreamDetails {
//!     stream_messages_endpoint: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = AwsSecretsProvider::new().await;
//!
//!     let bundle = provider.get_secret_bundle("prod/people/stream").await?;
//!     let details: StreamDetails = bundle.parse_json()?;
//!     println!("streaming from {}", details.stream_messages_endpoint);
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

mod aws;
mod bundle;
mod provider;

pub use aws::{AwsSecretsProvider, AwsSecretsProviderBuilder};
pub use bundle::{SecretBundle, SecretContent};
pub use provider::{SecretProvider, StaticSecretProvider};

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Access denied to secret: {0}")]
    AccessDenied(String),

    #[error("Secret decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid secret format: {0}")]
    InvalidFormat(String),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Failed to write secret: {0}")]
    Io(#[from] std::io::Error),
}
