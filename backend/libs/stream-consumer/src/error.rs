//! Error types for the stream consumer library

use thiserror::Error;

/// Result type for source and loop operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors raised while creating cursors, fetching batches or committing positions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The log or consumer group could not be reached (retry with the same cursor)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The cursor is expired, malformed or belongs to another log (reinitialize)
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// A message payload could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A manual commit of the consumed position failed
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Source was built with unusable settings
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConsumerError {
    /// Check if error is transient (retry with the unchanged cursor)
    pub fn is_transient(&self) -> bool {
        matches!(self, ConsumerError::SourceUnavailable(_))
    }

    /// Check if the cursor has to be reinitialized before fetching again
    pub fn requires_reinitialize(&self) -> bool {
        matches!(self, ConsumerError::InvalidCursor(_))
    }
}

impl From<rdkafka::error::KafkaError> for ConsumerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        use rdkafka::error::KafkaError;
        use rdkafka::types::RDKafkaErrorCode;

        match &err {
            KafkaError::MessageConsumption(RDKafkaErrorCode::OffsetOutOfRange)
            | KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownPartition)
            | KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition) => {
                ConsumerError::InvalidCursor(err.to_string())
            }
            KafkaError::ConsumerCommit(_) => ConsumerError::Commit(err.to_string()),
            KafkaError::ClientCreation(_) | KafkaError::ClientConfig(..) => {
                ConsumerError::Config(err.to_string())
            }
            _ => ConsumerError::SourceUnavailable(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for ConsumerError {
    fn from(err: reqwest::Error) -> Self {
        ConsumerError::SourceUnavailable(err.to_string())
    }
}
