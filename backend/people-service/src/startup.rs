//! Builds the sink, object store and message source from configuration
//!
//! Connection parameters come from secrets when secret ids are configured and
//! fall back to plain environment variables otherwise.

use anyhow::{Context, Result};
use db_pool::{create_pool, DatabaseConnectDetails, DbConfig, Workload};
use idempotent_sink::{MemorySink, PgSink, Sink};
use object_storage::{ObjectStore, ObjectStoreConfig, S3ObjectStore};
use rand::thread_rng;
use secret_bundle::{AwsSecretsProvider, SecretProvider};
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use stream_consumer::{
    CursorCommitter, HttpStreamSource, HttpStreamSourceConfig, InMemoryLog, KafkaPartitionSource,
    KafkaSourceConfig, MessageSource, StreamConnectDetails,
};
use tracing::{info, warn};

use crate::config::{Config, RunMode, SourceKind};
use crate::producer::{encode_person, random_person};

/// File name of the TLS root certificate inside the wallet directory
pub const WALLET_ROOT_CERT: &str = "root.crt";

/// Number of sample people a memory source starts with
const MEMORY_SEED_PEOPLE: usize = 5;

/// Message source plus the committer used for manual commits
pub struct SourceParts {
    pub source: Arc<dyn MessageSource>,
    /// `None` means commit-on-read
    pub committer: Option<Arc<dyn CursorCommitter>>,
}

/// Pool workload matching `RUN_MODE`
pub fn workload(config: &Config) -> Workload {
    match config.run_mode {
        RunMode::Server => Workload::Http,
        RunMode::Consumer => Workload::Consumer,
        RunMode::Both => Workload::Combined,
    }
}

/// Secret provider, only when at least one secret id is configured
pub async fn secret_provider(config: &Config) -> Option<Arc<dyn SecretProvider>> {
    let wanted = config.db_connect_details_secret_id.is_some()
        || config.stream_details_secret_id.is_some();
    if !wanted {
        return None;
    }

    let provider = AwsSecretsProvider::builder()
        .base64_strings(config.secrets_base64)
        .build()
        .await;
    Some(Arc::new(provider))
}

/// Database pool settings from the connect-details secret or `DATABASE_URL`
///
/// Returns `None` when neither is configured. When the secret names a wallet
/// location and a wallet secret is configured, the certificate is written
/// there before the pool is created.
pub async fn resolve_db_config(
    config: &Config,
    secrets: Option<&dyn SecretProvider>,
) -> Result<Option<DbConfig>> {
    if let Some(secret_id) = &config.db_connect_details_secret_id {
        let provider = secrets.context("A secret provider is required for database secrets")?;

        let details: DatabaseConnectDetails = provider
            .get_secret_bundle(secret_id)
            .await
            .context("Failed to read database connect details")?
            .parse_json()?;

        if let (Some(wallet_dir), Some(wallet_secret)) =
            (&details.wallet_location, &config.db_wallet_secret_id)
        {
            let cert_path = Path::new(wallet_dir).join(WALLET_ROOT_CERT);
            provider
                .get_secret_bundle(wallet_secret)
                .await
                .context("Failed to read database wallet")?
                .write_to(&cert_path)
                .await?;
        }

        info!(server = %details.server, service = %details.service, "Using database connect details from secret");
        return Ok(Some(DbConfig::from_connect_details(workload(config), &details)));
    }

    Ok(config
        .database_url
        .as_ref()
        .map(|url| DbConfig::new(workload(config), url.clone())))
}

/// PostgreSQL sink when a database is configured, otherwise an in-memory one
pub async fn build_sink(
    config: &Config,
    secrets: Option<&dyn SecretProvider>,
) -> Result<(Arc<dyn Sink>, Option<PgPool>)> {
    let Some(db_config) = resolve_db_config(config, secrets).await? else {
        warn!("No database configured; people are kept in memory only");
        return Ok((Arc::new(MemorySink::new()), None));
    };

    let pool = create_pool(&db_config)
        .await
        .context("Failed to create database pool")?;

    let sink = PgSink::new(pool.clone());
    sink.ensure_schema()
        .await
        .context("Failed to create people table")?;

    Ok((Arc::new(sink), Some(pool)))
}

pub async fn build_object_store() -> Arc<dyn ObjectStore> {
    Arc::new(S3ObjectStore::new(ObjectStoreConfig::from_env()).await)
}

/// Message source selected by `SOURCE_KIND`
pub async fn build_source(
    config: &Config,
    secrets: Option<&dyn SecretProvider>,
) -> Result<SourceParts> {
    match config.source_kind {
        SourceKind::Kafka => {
            let source = Arc::new(KafkaPartitionSource::new(KafkaSourceConfig {
                brokers: config.kafka_brokers.clone(),
                group_id: config.consumer_group.clone(),
                topic: config.kafka_topic.clone(),
                partition: config.kafka_partition,
                ..Default::default()
            })?);

            // Kafka offsets only move through explicit commits
            let committer: Arc<dyn CursorCommitter> = source.clone();
            Ok(SourceParts {
                source,
                committer: Some(committer),
            })
        }
        SourceKind::Http => {
            let secret_id = config
                .stream_details_secret_id
                .as_ref()
                .context("STREAM_DETAILS_SECRET_ID is required for the http source")?;
            let provider = secrets.context("A secret provider is required for stream secrets")?;

            let details: StreamConnectDetails = provider
                .get_secret_bundle(secret_id)
                .await
                .context("Failed to read stream connect details")?
                .parse_json()?;

            let source = Arc::new(HttpStreamSource::new(HttpStreamSourceConfig {
                group_name: Some(config.consumer_group.clone()),
                commit_on_get: !config.consumer_manual_commit,
                ..HttpStreamSourceConfig::from_connect_details(&details)
            })?);

            let committer = if config.consumer_manual_commit {
                Some(source.clone() as Arc<dyn CursorCommitter>)
            } else {
                None
            };
            Ok(SourceParts { source, committer })
        }
        SourceKind::Memory => {
            let records = {
                let mut rng = thread_rng();
                (0..MEMORY_SEED_PEOPLE)
                    .map(|_| encode_person(&random_person(&mut rng)))
                    .collect::<Result<Vec<_>, _>>()?
            };

            let log = InMemoryLog::single_partition();
            for (key, payload) in records {
                log.append("0", key, payload).await;
            }
            info!(messages = MEMORY_SEED_PEOPLE, "Seeded in-memory log");

            Ok(SourceParts {
                source: Arc::new(log),
                committer: None,
            })
        }
    }
}
