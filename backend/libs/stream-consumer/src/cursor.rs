//! Cursor, message and batch types shared by every source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque position token into a partitioned, ordered log.
///
/// Sources define the token format; the consumer loop only stores and
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a fresh cursor is positioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CursorMode {
    /// Oldest retained message
    Earliest,
    /// Only messages produced after the cursor is created
    Latest,
    /// First message after `offset` in `partition`
    AfterOffset { partition: String, offset: i64 },
    /// First message at or after the timestamp
    AtTime { time: DateTime<Utc> },
}

impl CursorMode {
    pub fn at_time(time: DateTime<Utc>) -> Self {
        CursorMode::AtTime { time }
    }

    pub fn after_offset(partition: impl Into<String>, offset: i64) -> Self {
        CursorMode::AfterOffset {
            partition: partition.into(),
            offset,
        }
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorMode::Earliest => f.write_str("EARLIEST"),
            CursorMode::Latest => f.write_str("LATEST"),
            CursorMode::AfterOffset { partition, offset } => {
                write!(f, "AFTER_OFFSET({}, {})", partition, offset)
            }
            CursorMode::AtTime { time } => write!(f, "AT_TIME({})", time.to_rfc3339()),
        }
    }
}

/// A single record read from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub partition: String,
    pub offset: i64,
}

impl Message {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        partition: impl Into<String>,
        offset: i64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            partition: partition.into(),
            offset,
        }
    }

    /// Lossy key rendering for log lines
    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    /// Decode the value as JSON
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.value)
    }
}

/// Messages returned by one fetch, in log order, plus the position after them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub messages: Vec<Message>,
    pub next_cursor: Cursor,
}

impl Batch {
    pub fn empty(cursor: Cursor) -> Self {
        Self {
            messages: Vec::new(),
            next_cursor: cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_mode_display() {
        assert_eq!(CursorMode::Earliest.to_string(), "EARLIEST");
        assert_eq!(
            CursorMode::after_offset("0", 5).to_string(),
            "AFTER_OFFSET(0, 5)"
        );
    }

    #[test]
    fn test_cursor_mode_serde() {
        let mode: CursorMode =
            serde_json::from_str(r#"{"type":"AFTER_OFFSET","partition":"0","offset":5}"#).unwrap();
        assert_eq!(mode, CursorMode::after_offset("0", 5));

        let mode: CursorMode = serde_json::from_str(r#"{"type":"LATEST"}"#).unwrap();
        assert_eq!(mode, CursorMode::Latest);
    }

    #[test]
    fn test_message_decode() {
        #[derive(Deserialize)]
        struct Named {
            name: String,
        }

        let msg = Message::new("A", r#"{"name":"X"}"#, "0", 0);
        let named: Named = msg.decode().unwrap();
        assert_eq!(named.name, "X");
        assert_eq!(msg.key_str(), "A");

        let bad = Message::new("A", "not json", "0", 1);
        assert!(bad.decode::<Named>().is_err());
    }
}
