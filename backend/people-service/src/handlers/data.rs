/// Person CRUD over the sink
use actix_web::{web, HttpResponse};
use idempotent_sink::{validate_name, Person};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::error::{AppError, Result};
use crate::metrics::record_write;

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub name: String,
}

/// Look up one person by name
pub async fn get_person(
    state: web::Data<AppState>,
    query: web::Query<NameQuery>,
) -> Result<HttpResponse> {
    validate_name(&query.name)?;

    let stored = state
        .sink
        .get(&query.name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No record for {}", query.name)))?;

    Ok(HttpResponse::Ok().json(stored))
}

/// Create or update a person (PUT and POST behave the same)
pub async fn put_person(
    state: web::Data<AppState>,
    body: web::Json<Person>,
) -> Result<HttpResponse> {
    let person = body.into_inner();

    let result = state.sink.upsert(&person).await;
    record_write("http", "upsert", result.is_ok());
    result?;

    info!(name = %person.name, age = person.age, "Persisted person");
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(format!("Persisted {}!", person.name)))
}

/// Remove a person; 404 when nobody had that name
pub async fn delete_person(
    state: web::Data<AppState>,
    body: web::Json<DeleteRequest>,
) -> Result<HttpResponse> {
    validate_name(&body.name)?;

    let result = state.sink.delete(&body.name).await;
    record_write("http", "delete", result.is_ok());

    if !result? {
        return Err(AppError::NotFound(format!("No record for {}", body.name)));
    }

    info!(name = %body.name, "Removed person");
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(format!("Removed record for {}!", body.name)))
}
