//! PostgreSQL pool for the people pipelines
//!
//! A pool is sized by the [`Workload`] it serves: the HTTP surface handles
//! concurrent requests, while the consumer loop writes one message at a time.
//! Connection parameters come either from `DATABASE_URL` or from a database
//! secret decoded into [`DatabaseConnectDetails`]. Every `DB_*` variable
//! listed on [`DbConfig::new`] overrides the workload's default.

mod connect;
mod metrics;

pub use connect::DatabaseConnectDetails;
pub use metrics::{acquire, PoolStats};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Interval of the background pool gauge refresh
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("DATABASE_URL environment variable not set")]
    MissingUrl,
}

/// What the process does with its connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// HTTP handlers only
    Http,
    /// Stream consumer only
    Consumer,
    /// HTTP handlers plus a background consumer
    Combined,
}

impl Workload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workload::Http => "http",
            Workload::Consumer => "consumer",
            Workload::Combined => "combined",
        }
    }

    /// (max, min) connections
    fn pool_size(&self) -> (u32, u32) {
        match self {
            Workload::Http => (10, 2),
            Workload::Consumer => (2, 1),
            Workload::Combined => (12, 2),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool settings
#[derive(Clone)]
pub struct DbConfig {
    /// Label used for the pool's metrics
    pub pool_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Bound for opening the pool and the startup `SELECT 1`
    pub connect_timeout: Duration,
    /// Bound for checking a connection out of the pool
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("pool_name", &self.pool_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .finish()
    }
}

impl DbConfig {
    /// Settings for `workload` against `database_url`
    ///
    /// Overrides: `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`,
    /// `DB_CONNECT_TIMEOUT_SECS`, `DB_ACQUIRE_TIMEOUT_SECS`,
    /// `DB_IDLE_TIMEOUT_SECS`, `DB_MAX_LIFETIME_SECS`. Unparsable values are
    /// ignored.
    pub fn new(workload: Workload, database_url: impl Into<String>) -> Self {
        let (max, min) = workload.pool_size();

        Self {
            pool_name: format!("people-{}", workload),
            database_url: database_url.into(),
            max_connections: env_or("DB_MAX_CONNECTIONS", max),
            min_connections: env_or("DB_MIN_CONNECTIONS", min),
            connect_timeout: env_secs_or("DB_CONNECT_TIMEOUT_SECS", 5),
            acquire_timeout: env_secs_or("DB_ACQUIRE_TIMEOUT_SECS", 10),
            idle_timeout: env_secs_or("DB_IDLE_TIMEOUT_SECS", 600),
            max_lifetime: env_secs_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }

    /// Settings for `workload` against `DATABASE_URL`
    pub fn from_env(workload: Workload) -> Result<Self, DbConfigError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| DbConfigError::MissingUrl)?;
        Ok(Self::new(workload, url))
    }

    /// Settings for `workload` from a decoded database secret
    pub fn from_connect_details(workload: Workload, details: &DatabaseConnectDetails) -> Self {
        Self::new(workload, details.to_database_url())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(key, default_secs))
}

/// Open the pool, prove it with `SELECT 1` and start refreshing its gauges
///
/// The gauge task ends once the pool is closed.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        pool = %config.pool_name,
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout = ?config.acquire_timeout,
        "Opening database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!(pool = %config.pool_name, error = %e, "Database unreachable");
            e
        })?;

    verify(&pool, config).await?;

    metrics::publish(&config.pool_name, &PoolStats::of(&pool));
    tokio::spawn(refresh_stats(pool.clone(), config.pool_name.clone()));

    Ok(pool)
}

async fn verify(pool: &PgPool, config: &DbConfig) -> Result<(), sqlx::Error> {
    let probe = sqlx::query("SELECT 1").execute(pool);

    match tokio::time::timeout(config.connect_timeout, probe).await {
        Ok(Ok(_)) => {
            info!(pool = %config.pool_name, "Database pool verified");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(pool = %config.pool_name, error = %e, "Database verification failed");
            Err(e)
        }
        Err(_) => {
            warn!(pool = %config.pool_name, timeout = ?config.connect_timeout, "Database verification timed out");
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

async fn refresh_stats(pool: PgPool, pool_name: String) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    loop {
        interval.tick().await;
        if pool.is_closed() {
            break;
        }
        metrics::publish(&pool_name, &PoolStats::of(&pool));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const OVERRIDES: [&str; 6] = [
        "DB_MAX_CONNECTIONS",
        "DB_MIN_CONNECTIONS",
        "DB_CONNECT_TIMEOUT_SECS",
        "DB_ACQUIRE_TIMEOUT_SECS",
        "DB_IDLE_TIMEOUT_SECS",
        "DB_MAX_LIFETIME_SECS",
    ];

    fn clear_overrides() {
        for key in OVERRIDES {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_workload_sizes() {
        clear_overrides();

        let http = DbConfig::new(Workload::Http, "postgres://localhost/people");
        assert_eq!((http.max_connections, http.min_connections), (10, 2));
        assert_eq!(http.pool_name, "people-http");

        let consumer = DbConfig::new(Workload::Consumer, "postgres://localhost/people");
        assert_eq!((consumer.max_connections, consumer.min_connections), (2, 1));

        let combined = DbConfig::new(Workload::Combined, "postgres://localhost/people");
        assert_eq!(combined.max_connections, 12);
        assert_eq!(combined.acquire_timeout, Duration::from_secs(10));
        assert_eq!(combined.max_lifetime, Duration::from_secs(1800));
    }

    #[test]
    #[serial]
    fn test_env_overrides_and_bad_values() {
        clear_overrides();
        std::env::set_var("DB_MAX_CONNECTIONS", "40");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "soon");

        let config = DbConfig::new(Workload::Consumer, "postgres://localhost/people");
        assert_eq!(config.max_connections, 40);
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));

        clear_overrides();
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = DbConfig::new(Workload::Http, "postgres://app:hunter2@db/people");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(
            DbConfig::from_env(Workload::Http),
            Err(DbConfigError::MissingUrl)
        ));

        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let config = DbConfig::from_env(Workload::Http).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/test");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_from_connect_details() {
        clear_overrides();
        let details = DatabaseConnectDetails {
            service: "people".to_string(),
            username: "app".to_string(),
            server: "db".to_string(),
            port: "5432".to_string(),
            password: "pw".to_string(),
            wallet_location: None,
        };

        let config = DbConfig::from_connect_details(Workload::Combined, &details);
        assert_eq!(config.database_url, "postgres://app:pw@db:5432/people");
        assert_eq!(config.pool_name, "people-combined");
    }
}
