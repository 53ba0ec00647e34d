//! Configuration for people-service, loaded from environment variables
use serde::Deserialize;
use std::time::Duration;
use stream_consumer::{ConsumerLoopConfig, CursorMode, InvalidCursorPolicy};

/// What the binary runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// HTTP server only
    Server,
    /// Stream consumer only; exits when the loop ends
    Consumer,
    /// HTTP server with the consumer loop in the background
    Both,
}

/// Which log the consumer reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Kafka,
    /// Managed streaming REST endpoint; details come from the stream secret
    Http,
    /// In-process log, only useful for local runs
    Memory,
}

/// Where a fresh consumer starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    Earliest,
    Latest,
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_http_server_port")]
    pub http_server_port: u16,

    #[serde(default = "default_version")]
    pub version_of_myserver: String,

    #[serde(default = "default_run_mode")]
    pub run_mode: RunMode,

    /// Directory served under /site
    #[serde(default = "default_website_dir")]
    pub website_dir: String,

    /// Used when no database secret is configured
    #[serde(default)]
    pub database_url: Option<String>,

    /// Secret holding `DatabaseConnectDetails` JSON
    #[serde(default)]
    pub db_connect_details_secret_id: Option<String>,

    /// Secret holding the database TLS root certificate
    #[serde(default)]
    pub db_wallet_secret_id: Option<String>,

    /// Secret holding `StreamConnectDetails` JSON
    #[serde(default)]
    pub stream_details_secret_id: Option<String>,

    /// Interpret plain-string secrets as base64
    #[serde(default)]
    pub secrets_base64: bool,

    #[serde(default = "default_source_kind")]
    pub source_kind: SourceKind,

    #[serde(default = "default_kafka_brokers")]
    pub kafka_brokers: String,

    #[serde(default = "default_kafka_topic")]
    pub kafka_topic: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    #[serde(default)]
    pub kafka_partition: i32,

    /// Where to start when the source has no committed position
    #[serde(default = "default_start_position")]
    pub consumer_start_position: StartPosition,

    #[serde(default = "default_max_iterations")]
    pub consumer_max_iterations: u32,

    #[serde(default = "default_batch_size")]
    pub consumer_batch_size: usize,

    #[serde(default = "default_batch_delay_secs")]
    pub consumer_batch_delay_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub consumer_fetch_timeout_secs: u64,

    /// Recreate the cursor from the start position instead of stopping when
    /// the source rejects it
    #[serde(default)]
    pub consumer_reinitialize_on_invalid_cursor: bool,

    /// Commit each batch explicitly instead of relying on commit-on-read
    #[serde(default)]
    pub consumer_manual_commit: bool,
}

fn default_http_server_port() -> u16 {
    8080
}

fn default_version() -> String {
    "unknown".to_string()
}

fn default_run_mode() -> RunMode {
    RunMode::Server
}

fn default_website_dir() -> String {
    "./website".to_string()
}

fn default_source_kind() -> SourceKind {
    SourceKind::Kafka
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_topic() -> String {
    "people".to_string()
}

fn default_consumer_group() -> String {
    "person-message-1".to_string()
}

fn default_start_position() -> StartPosition {
    StartPosition::Latest
}

fn default_max_iterations() -> u32 {
    15
}

fn default_batch_size() -> usize {
    15
}

fn default_batch_delay_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env::<Config>()
    }

    pub fn start_mode(&self) -> CursorMode {
        match self.consumer_start_position {
            StartPosition::Earliest => CursorMode::Earliest,
            StartPosition::Latest => CursorMode::Latest,
        }
    }

    pub fn consumer_loop_config(&self) -> ConsumerLoopConfig {
        let invalid_cursor_policy = if self.consumer_reinitialize_on_invalid_cursor {
            InvalidCursorPolicy::Reinitialize(self.start_mode())
        } else {
            InvalidCursorPolicy::Stop
        };

        ConsumerLoopConfig {
            max_iterations: self.consumer_max_iterations,
            batch_size: self.consumer_batch_size,
            inter_batch_delay: Duration::from_secs(self.consumer_batch_delay_secs),
            fetch_timeout: Duration::from_secs(self.consumer_fetch_timeout_secs),
            invalid_cursor_policy,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.http_server_port, 8080);
        assert_eq!(config.version_of_myserver, "unknown");
        assert_eq!(config.run_mode, RunMode::Server);
        assert_eq!(config.source_kind, SourceKind::Kafka);
        assert_eq!(config.consumer_group, "person-message-1");
        assert!(config.database_url.is_none());

        let loop_config = config.consumer_loop_config();
        assert_eq!(loop_config.max_iterations, 15);
        assert_eq!(loop_config.batch_size, 15);
        assert_eq!(loop_config.inter_batch_delay, Duration::from_secs(10));
        assert_eq!(loop_config.invalid_cursor_policy, InvalidCursorPolicy::Stop);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HTTP_SERVER_PORT", "9090"),
            ("RUN_MODE", "both"),
            ("SOURCE_KIND", "http"),
            ("CONSUMER_START_POSITION", "earliest"),
            ("CONSUMER_REINITIALIZE_ON_INVALID_CURSOR", "true"),
            ("CONSUMER_MAX_ITERATIONS", "3"),
        ]);

        assert_eq!(config.http_server_port, 9090);
        assert_eq!(config.run_mode, RunMode::Both);
        assert_eq!(config.source_kind, SourceKind::Http);
        assert_eq!(config.start_mode(), CursorMode::Earliest);

        let loop_config = config.consumer_loop_config();
        assert_eq!(loop_config.max_iterations, 3);
        assert_eq!(
            loop_config.invalid_cursor_policy,
            InvalidCursorPolicy::Reinitialize(CursorMode::Earliest)
        );
    }

    #[test]
    fn test_rejects_unknown_run_mode() {
        let result = envy::from_iter::<_, Config>(vec![(
            "RUN_MODE".to_string(),
            "lambda".to_string(),
        )]);
        assert!(result.is_err());
    }
}
