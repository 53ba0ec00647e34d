//! Publishes a handful of random people to the people topic
//!
//! Each record is keyed by name so that all updates for one person land on
//! the same partition.

use anyhow::{Context, Result};
use people_service::producer::{encode_person, random_person};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct ProducerConfig {
    #[serde(default = "default_kafka_brokers")]
    kafka_brokers: String,

    #[serde(default = "default_kafka_topic")]
    kafka_topic: String,

    /// Number of people to publish
    #[serde(default = "default_count")]
    producer_count: usize,

    /// Pause between two publishes
    #[serde(default = "default_pause_secs")]
    producer_pause_secs: u64,
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_topic() -> String {
    "people".to_string()
}

fn default_count() -> usize {
    5
}

fn default_pause_secs() -> u64 {
    5
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "person_producer=info,rdkafka=warn,info".into()),
        )
        .init();

    let config: ProducerConfig = envy::from_env().context("Invalid producer configuration")?;

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .set("acks", "all")
        .set("message.timeout.ms", "30000")
        .create()
        .context("Failed to create Kafka producer")?;

    info!(
        brokers = %config.kafka_brokers,
        topic = %config.kafka_topic,
        count = config.producer_count,
        "Publishing random people"
    );

    for i in 0..config.producer_count {
        let (key, payload) = {
            let mut rng = rand::thread_rng();
            encode_person(&random_person(&mut rng))?
        };

        let record = FutureRecord::to(&config.kafka_topic)
            .key(&key)
            .payload(&payload);

        match producer.send(record, Duration::from_secs(30)).await {
            Ok((partition, offset)) => {
                info!(name = %key, partition, offset, "Published person");
            }
            Err((err, _)) => {
                error!(name = %key, error = %err, "Failed to publish person");
            }
        }

        if i + 1 < config.producer_count {
            tokio::time::sleep(Duration::from_secs(config.producer_pause_secs)).await;
        }
    }

    Ok(())
}
