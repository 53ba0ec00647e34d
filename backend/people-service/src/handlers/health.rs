use actix_web::{web, HttpResponse};
use db_pool::{acquire, PoolStats};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::error::{AppError, Result};

/// Liveness plus a database round-trip when a pool is configured
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse> {
    let (database, pool_stats) = match &state.pool {
        Some(pool) => {
            let mut conn = acquire(pool, "health")
                .await
                .map_err(|e| {
                    warn!(error = %e, "Health check could not acquire a connection");
                    AppError::Unavailable(e.to_string())
                })?;

            sqlx::query("SELECT 1")
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::Unavailable(e.to_string()))?;
            drop(conn);
            ("postgres", Some(PoolStats::of(pool)))
        }
        None => ("memory", None),
    };

    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": state.version,
        "database": database,
        "pool": pool_stats,
    })))
}

pub async fn metrics() -> Result<HttpResponse> {
    let body = crate::metrics::render().map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}
