/// HTTP handlers and route table
use actix_web::{web, HttpRequest, HttpResponse};
use idempotent_sink::Sink;
use object_storage::ObjectStore;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

mod data;
mod greet;
mod health;
mod objects;

pub use data::{delete_person, get_person, put_person};
pub use greet::{compose_greeting, greet};
pub use health::{health, metrics};
pub use objects::{process_people_file, store_object};

pub const FALLBACK_MESSAGE: &str =
    "404 path/method combination not currently supported. Try /greet or /site";

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<dyn Sink>,
    pub object_store: Arc<dyn ObjectStore>,
    /// Bucket used when a request names none
    pub default_bucket: String,
    /// Present when the sink is backed by PostgreSQL
    pub pool: Option<PgPool>,
    pub version: String,
}

/// Register all routes; `website_dir` is served under `/site`
///
/// A known path called with an unsupported method gets the same 404 as an
/// unknown path.
pub fn configure(cfg: &mut web::ServiceConfig, website_dir: &str) {
    cfg.service(
        web::resource("/greet")
            .route(web::get().to(greet))
            .default_service(web::to(fallback)),
    )
    .service(
        web::resource("/data")
            .route(web::get().to(get_person))
            .route(web::put().to(put_person))
            .route(web::post().to(put_person))
            .route(web::delete().to(delete_person))
            .default_service(web::to(fallback)),
    )
    .service(
        web::resource("/people")
            .route(web::get().to(process_people_file))
            .default_service(web::to(fallback)),
    )
    .service(
        web::resource("/objects")
            .route(web::post().to(store_object))
            .default_service(web::to(fallback)),
    )
    .route("/health", web::get().to(health))
    .route("/metrics", web::get().to(metrics))
    .service(actix_files::Files::new("/site", website_dir).index_file("index.html"))
    .default_service(web::to(fallback));
}

async fn fallback(req: HttpRequest) -> HttpResponse {
    warn!(method = %req.method(), path = %req.path(), "Request for unhandled method/path");
    HttpResponse::NotFound()
        .content_type("text/plain; charset=utf-8")
        .body(FALLBACK_MESSAGE)
}
