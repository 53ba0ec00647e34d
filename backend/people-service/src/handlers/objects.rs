/// Object-store backed endpoints
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::error::{AppError, Result};
use crate::pipeline::ingest_people_json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery {
    pub object_name: String,
    #[serde(default)]
    pub bucket_name: Option<String>,
}

impl ObjectQuery {
    fn bucket<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.bucket_name
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(&state.default_bucket)
    }

    fn validate(&self) -> Result<()> {
        if self.object_name.is_empty() {
            return Err(AppError::Validation("objectName is required".to_string()));
        }
        Ok(())
    }
}

/// Load a JSON array of people from the object store into the sink
pub async fn process_people_file(
    state: web::Data<AppState>,
    query: web::Query<ObjectQuery>,
) -> Result<HttpResponse> {
    query.validate()?;
    let bucket = query.bucket(&state);

    info!(object = %query.object_name, bucket = %bucket, "Processing people file");

    let document = state
        .object_store
        .get_object(bucket, &query.object_name)
        .await
        .map_err(|e| {
            error!(object = %query.object_name, bucket = %bucket, error = %e, "Failed to retrieve people file");
            AppError::from(e)
        })?;

    let report = ingest_people_json(state.sink.as_ref(), &document)
        .await
        .map_err(|e| AppError::Validation(format!("Not a JSON array of people: {}", e)))?;

    info!(
        object = %query.object_name,
        bucket = %bucket,
        persisted = report.persisted,
        failed = report.failed,
        "Processed people file"
    );

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(format!(
            "Processed file {} in bucket {}: {} persisted, {} failed",
            query.object_name, bucket, report.persisted, report.failed
        )))
}

/// Write the request body as an object and read it back
///
/// The bucket is created when it does not exist yet.
pub async fn store_object(
    state: web::Data<AppState>,
    query: web::Query<ObjectQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    query.validate()?;
    let bucket = query.bucket(&state);

    if state.object_store.ensure_bucket(bucket).await? {
        info!(bucket = %bucket, "Created bucket");
    }

    state
        .object_store
        .put_object(bucket, &query.object_name, body.to_vec(), "text/plain")
        .await?;

    let content = state
        .object_store
        .get_object(bucket, &query.object_name)
        .await?;

    info!(object = %query.object_name, bucket = %bucket, bytes = content.len(), "Stored object");

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(format!(
            "Object {} in bucket {} contains: {}",
            query.object_name,
            bucket,
            String::from_utf8_lossy(&content)
        )))
}
