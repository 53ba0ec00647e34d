use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct GreetQuery {
    #[serde(default)]
    pub name: Option<String>,
}

pub fn compose_greeting(name: Option<&str>) -> String {
    let name = name.filter(|n| !n.is_empty()).unwrap_or("Stranger");
    format!("Hello {}!", name)
}

pub async fn greet(query: web::Query<GreetQuery>) -> HttpResponse {
    debug!(name = ?query.name, "Greeting request");
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(compose_greeting(query.name.as_deref()))
}
