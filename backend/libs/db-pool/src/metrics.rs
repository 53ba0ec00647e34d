//! Pool occupancy and checkout metrics
//!
//! Checkouts are labelled by the caller's role (`sink`, `health`, ...) so a
//! stalled consumer and a starved HTTP handler show up separately.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use serde::Serialize;
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::time::Instant;
use tracing::warn;

lazy_static::lazy_static! {
    static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "people_db_pool_connections",
        "Pool connections by state (idle/in_use/max)",
        &["pool", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref CHECKOUT_SECONDS: HistogramVec = register_histogram_vec!(
        "people_db_checkout_seconds",
        "Time spent waiting for a pooled connection",
        &["role"],
        vec![0.001, 0.005, 0.025, 0.1, 0.5, 2.5, 10.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref CHECKOUT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "people_db_checkout_failures_total",
        "Failed connection checkouts",
        &["role", "reason"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub in_use: u32,
    pub max: u32,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        let size = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(size).min(size);
        Self {
            size,
            idle,
            in_use: size - idle,
            max: pool.options().get_max_connections(),
        }
    }
}

pub(crate) fn publish(pool_name: &str, stats: &PoolStats) {
    for (state, value) in [("idle", stats.idle), ("in_use", stats.in_use), ("max", stats.max)] {
        POOL_CONNECTIONS
            .with_label_values(&[pool_name, state])
            .set(i64::from(value));
    }
}

fn failure_reason(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::PoolTimedOut => "exhausted",
        sqlx::Error::PoolClosed => "closed",
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => "unreachable",
        _ => "other",
    }
}

/// Check a connection out of `pool` on behalf of `role`
///
/// # Example
/// ```no_run
/// # use db_pool::{acquire, create_pool, DbConfig, Workload};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = create_pool(&DbConfig::from_env(Workload::Http)?).await?;
/// let mut conn = acquire(&pool, "health").await?;
/// sqlx::query("SELECT 1").execute(&mut *conn).await?;
/// # Ok(())
/// # }
/// ```
pub async fn acquire(pool: &PgPool, role: &str) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    CHECKOUT_SECONDS
        .with_label_values(&[role])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        let reason = failure_reason(e);
        warn!(role = %role, reason, error = %e, "Connection checkout failed");
        CHECKOUT_FAILURES.with_label_values(&[role, reason]).inc();
    }

    result
}
