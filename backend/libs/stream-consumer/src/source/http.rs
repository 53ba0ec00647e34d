//! Managed streaming service over its REST API
//!
//! Speaks the cursor-based shape used by managed streaming endpoints:
//!
//! - `POST {endpoint}/20180418/streams/{id}/groupCursors` (consumer group cursor)
//! - `POST {endpoint}/20180418/streams/{id}/cursors` (partition cursor)
//! - `GET  {endpoint}/20180418/streams/{id}/messages?cursor=&limit=`
//!   (next cursor returned in the `opc-next-cursor` header)
//! - `POST {endpoint}/20180418/streams/{id}/commit?cursor=`
//!
//! Keys and values travel base64-encoded. Request signing is not handled
//! here; put an authenticating proxy or a pre-configured `reqwest::Client`
//! in front of the endpoint.

use super::{CursorCommitter, MessageSource};
use crate::cursor::{Batch, Cursor, CursorMode, Message};
use crate::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "20180418";
const NEXT_CURSOR_HEADER: &str = "opc-next-cursor";

/// Connection parameters as stored in the stream details secret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamConnectDetails {
    pub stream_messages_endpoint: String,
    #[serde(rename = "streamOCID")]
    pub stream_ocid: String,
}

/// HTTP stream source configuration
#[derive(Debug, Clone)]
pub struct HttpStreamSourceConfig {
    pub endpoint: String,
    pub stream_id: String,
    /// Consumer group; when unset, EARLIEST/LATEST/AT_TIME use a partition cursor
    pub group_name: Option<String>,
    pub instance_name: Option<String>,
    /// Partition used for non-group cursors
    pub partition: String,
    /// Let the service advance the group offset on every fetch
    pub commit_on_get: bool,
    /// Group cursor inactivity timeout
    pub group_timeout_ms: u32,
    pub request_timeout: Duration,
}

impl Default for HttpStreamSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8081".to_string(),
            stream_id: String::new(),
            group_name: Some("person-message-1".to_string()),
            instance_name: None,
            partition: "0".to_string(),
            commit_on_get: true,
            group_timeout_ms: 1000,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpStreamSourceConfig {
    pub fn from_connect_details(details: &StreamConnectDetails) -> Self {
        Self {
            endpoint: details.stream_messages_endpoint.clone(),
            stream_id: details.stream_ocid.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupCursorDetails<'a> {
    #[serde(rename = "type")]
    cursor_type: &'static str,
    group_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    timeout_in_ms: u32,
    commit_on_get: bool,
}

#[derive(Debug, Serialize)]
struct CreateCursorDetails<'a> {
    partition: &'a str,
    #[serde(rename = "type")]
    cursor_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CursorResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    partition: String,
    offset: i64,
}

/// Cursor-addressed reader for a managed stream's REST endpoint
pub struct HttpStreamSource {
    client: reqwest::Client,
    config: HttpStreamSourceConfig,
}

impl HttpStreamSource {
    pub fn new(config: HttpStreamSourceConfig) -> ConsumerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConsumerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: HttpStreamSourceConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/{}/streams/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            API_VERSION,
            self.config.stream_id,
            resource
        )
    }

    fn group_cursor_type(mode: &CursorMode) -> Option<(&'static str, Option<DateTime<Utc>>)> {
        match mode {
            CursorMode::Earliest => Some(("TRIM_HORIZON", None)),
            CursorMode::Latest => Some(("LATEST", None)),
            CursorMode::AtTime { time } => Some(("AT_TIME", Some(*time))),
            CursorMode::AfterOffset { .. } => None,
        }
    }

    async fn post_cursor<B: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &B,
    ) -> ConsumerResult<Cursor> {
        let response = self.client.post(self.url(resource)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_create_failure(status, &text));
        }

        let cursor: CursorResponse = response
            .json()
            .await
            .map_err(|e| ConsumerError::SourceUnavailable(format!("Malformed cursor response: {}", e)))?;

        Ok(Cursor::new(cursor.value))
    }
}

/// Map a failed cursor creation to the error taxonomy
fn classify_create_failure(status: StatusCode, body: &str) -> ConsumerError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ConsumerError::SourceUnavailable(format!("{}: {}", status, body))
    } else if status == StatusCode::BAD_REQUEST {
        ConsumerError::InvalidCursor(format!("{}: {}", status, body))
    } else {
        ConsumerError::Config(format!("{}: {}", status, body))
    }
}

/// Map a failed fetch or commit to the error taxonomy
fn classify_cursor_failure(status: StatusCode, body: &str) -> ConsumerError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
            ConsumerError::InvalidCursor(format!("{}: {}", status, body))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ConsumerError::Config(format!("{}: {}", status, body))
        }
        _ => ConsumerError::SourceUnavailable(format!("{}: {}", status, body)),
    }
}

fn decode_field(field: Option<String>, what: &str) -> ConsumerResult<Vec<u8>> {
    match field {
        None => Ok(Vec::new()),
        Some(encoded) => BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ConsumerError::Deserialization(format!("{} is not base64: {}", what, e))),
    }
}

#[async_trait]
impl MessageSource for HttpStreamSource {
    async fn create_cursor(&self, mode: &CursorMode) -> ConsumerResult<Cursor> {
        if let (Some(group_name), Some((cursor_type, time))) =
            (self.config.group_name.as_deref(), Self::group_cursor_type(mode))
        {
            debug!(group = %group_name, mode = %mode, "Creating group cursor");
            let details = CreateGroupCursorDetails {
                cursor_type,
                group_name,
                instance_name: self.config.instance_name.as_deref(),
                time,
                timeout_in_ms: self.config.group_timeout_ms,
                commit_on_get: self.config.commit_on_get,
            };
            return self.post_cursor("groupCursors", &details).await;
        }

        let details = match mode {
            CursorMode::Earliest => CreateCursorDetails {
                partition: &self.config.partition,
                cursor_type: "TRIM_HORIZON",
                offset: None,
                time: None,
            },
            CursorMode::Latest => CreateCursorDetails {
                partition: &self.config.partition,
                cursor_type: "LATEST",
                offset: None,
                time: None,
            },
            CursorMode::AtTime { time } => CreateCursorDetails {
                partition: &self.config.partition,
                cursor_type: "AT_TIME",
                offset: None,
                time: Some(*time),
            },
            CursorMode::AfterOffset { partition, offset } => CreateCursorDetails {
                partition,
                cursor_type: "AFTER_OFFSET",
                offset: Some(*offset),
                time: None,
            },
        };

        debug!(mode = %mode, partition = %details.partition, "Creating partition cursor");
        self.post_cursor("cursors", &details).await
    }

    async fn get_messages(
        &self,
        cursor: &Cursor,
        limit: usize,
        timeout: Duration,
    ) -> ConsumerResult<Batch> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.url("messages"))
            .query(&[("cursor", cursor.as_str()), ("limit", limit.as_str())])
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_cursor_failure(status, &text));
        }

        let next_cursor = response
            .headers()
            .get(NEXT_CURSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Cursor::new);

        let items: Vec<WireMessage> = response
            .json()
            .await
            .map_err(|e| ConsumerError::SourceUnavailable(format!("Malformed messages response: {}", e)))?;

        let next_cursor = match next_cursor {
            Some(c) => c,
            None => {
                warn!("Response carried no next cursor, holding position");
                cursor.clone()
            }
        };

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            let key = decode_field(item.key, "key");
            let value = decode_field(item.value, "value");
            match key.and_then(|key| value.map(|value| (key, value))) {
                Ok((key, value)) => {
                    messages.push(Message::new(key, value, item.partition, item.offset))
                }
                // dropped; the rest of the batch and the next cursor still apply
                Err(e) => warn!(
                    partition = %item.partition,
                    offset = item.offset,
                    error = %e,
                    "Skipping undecodable message"
                ),
            }
        }

        Ok(Batch {
            messages,
            next_cursor,
        })
    }
}

#[async_trait]
impl CursorCommitter for HttpStreamSource {
    async fn commit(&self, next_cursor: &Cursor) -> ConsumerResult<()> {
        let response = self
            .client
            .post(self.url("commit"))
            .query(&[("cursor", next_cursor.as_str())])
            .send()
            .await
            .map_err(|e| ConsumerError::Commit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match classify_cursor_failure(status, &text) {
                ConsumerError::SourceUnavailable(msg) => ConsumerError::Commit(msg),
                other => other,
            });
        }

        Ok(())
    }
}
