//! People Service
//!
//! Demo pipelines that persist `Person` records through one idempotent sink:
//!
//! - HTTP → database (`/data`)
//! - object-store file → database (`/people`)
//! - stream → database (cursor-driven consumer loop)
//!
//! plus a greeting endpoint, static site, object write/read round-trip,
//! health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod producer;
pub mod startup;

pub use config::{Config, RunMode, SourceKind, StartPosition};
pub use error::{AppError, Result};
pub use handlers::AppState;
pub use pipeline::{ingest_people_json, HandlerError, IngestReport, PersonMessageHandler};
