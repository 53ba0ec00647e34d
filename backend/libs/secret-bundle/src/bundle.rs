//! Secret bundles and their tagged content

use crate::SecretError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Raw secret payload as delivered by the provider
///
/// The encoding is explicit so callers never guess whether a string still
/// needs base64 decoding.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretContent {
    /// Base64 text wrapping the actual bytes
    Base64(String),
    /// Plain text (already decoded)
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
}

impl SecretContent {
    /// Resolve the payload to its bytes
    pub fn decode(&self) -> Result<Vec<u8>, SecretError> {
        match self {
            SecretContent::Base64(encoded) => {
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64.decode(compact.as_bytes()).map_err(|e| {
                    SecretError::InvalidFormat(format!("Secret is not valid base64: {}", e))
                })
            }
            SecretContent::Text(text) => Ok(text.as_bytes().to_vec()),
            SecretContent::Binary(bytes) => Ok(bytes.clone()),
        }
    }

    /// Resolve the payload to UTF-8 text
    pub fn decode_string(&self) -> Result<String, SecretError> {
        String::from_utf8(self.decode()?)
            .map_err(|e| SecretError::InvalidFormat(format!("Secret is not UTF-8: {}", e)))
    }

    fn kind(&self) -> &'static str {
        match self {
            SecretContent::Base64(_) => "base64",
            SecretContent::Text(_) => "text",
            SecretContent::Binary(_) => "binary",
        }
    }
}

// Never print secret material
impl fmt::Debug for SecretContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretContent::{}(<redacted>)", self.kind())
    }
}

/// A secret as returned by a [`SecretProvider`](crate::SecretProvider)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBundle {
    pub secret_id: String,
    pub version_id: Option<String>,
    pub content: SecretContent,
}

impl SecretBundle {
    pub fn new(secret_id: impl Into<String>, content: SecretContent) -> Self {
        Self {
            secret_id: secret_id.into(),
            version_id: None,
            content,
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, SecretError> {
        self.content.decode()
    }

    /// Decode the content and parse it as JSON
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, SecretError> {
        let bytes = self.decode()?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SecretError::InvalidFormat(format!(
                "Secret '{}' is not the expected JSON: {}",
                self.secret_id, e
            ))
        })
    }

    /// Write the decoded bytes to `path`, creating parent directories
    ///
    /// On unix the file is readable by the owner only.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), SecretError> {
        let path = path.as_ref();
        let bytes = self.decode()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(path, &bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!(
            secret_id = %self.secret_id,
            path = %path.display(),
            bytes = bytes.len(),
            "Secret written to file"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(
            SecretContent::Base64("aGVsbG8=".into()).decode().unwrap(),
            b"hello".to_vec()
        );
        assert_eq!(
            SecretContent::Text("hello".into()).decode().unwrap(),
            b"hello".to_vec()
        );
        assert_eq!(
            SecretContent::Binary(vec![0, 159, 146]).decode().unwrap(),
            vec![0, 159, 146]
        );
    }

    #[test]
    fn test_base64_tolerates_line_breaks() {
        let wrapped = SecretContent::Base64("aGVs\nbG8=\n".into());
        assert_eq!(wrapped.decode_string().unwrap(), "hello");
    }

    #[test]
    fn test_invalid_base64() {
        let err = SecretContent::Base64("%%%".into()).decode().unwrap_err();
        assert!(matches!(err, SecretError::InvalidFormat(_)));
    }

    #[test]
    fn test_non_utf8_binary() {
        let err = SecretContent::Binary(vec![0xff, 0xfe])
            .decode_string()
            .unwrap_err();
        assert!(matches!(err, SecretError::InvalidFormat(_)));
    }

    #[test]
    fn test_parse_json_from_base64() {
        // {"host":"db","port":1522}
        let bundle = SecretBundle::new(
            "db-details",
            SecretContent::Base64("eyJob3N0IjoiZGIiLCJwb3J0IjoxNTIyfQ==".into()),
        );
        let endpoint: Endpoint = bundle.parse_json().unwrap();
        assert_eq!(
            endpoint,
            Endpoint {
                host: "db".into(),
                port: 1522
            }
        );
    }

    #[test]
    fn test_parse_json_wrong_shape() {
        let bundle = SecretBundle::new("x", SecretContent::Text(r#"{"host":"db"}"#.into()));
        assert!(matches!(
            bundle.parse_json::<Endpoint>(),
            Err(SecretError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_debug_redacts() {
        let rendered = format!("{:?}", SecretContent::Text("hunter2".into()));
        assert!(!rendered.contains("hunter2"));
    }
}
