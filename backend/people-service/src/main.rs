//! People Service - Main entry point
//!
//! # Modes (`RUN_MODE`)
//! - `server` (default): HTTP server only
//! - `consumer`: run the stream consumer loop once and exit
//! - `both`: HTTP server with the consumer loop in the background

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use people_service::handlers::{self, AppState};
use people_service::startup::{self, SourceParts};
use people_service::{Config, PersonMessageHandler, RunMode};
use secret_bundle::SecretProvider;
use std::sync::Arc;
use stream_consumer::{ConsumerLoop, LoopReport};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    info!(
        version = %config.version_of_myserver,
        mode = ?config.run_mode,
        port = config.http_server_port,
        "Starting people-service"
    );

    let secrets = startup::secret_provider(&config).await;
    let (sink, pool) = startup::build_sink(&config, secrets.as_deref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    match config.run_mode {
        RunMode::Consumer => {
            let report = run_consumer(&config, secrets.as_deref(), sink, shutdown_rx).await?;
            info!(?report, "Consumer finished");
            Ok(())
        }
        RunMode::Server => serve(&config, sink, pool).await,
        RunMode::Both => {
            let consumer_config = config.clone();
            let consumer_sink = sink.clone();
            let consumer_secrets = secrets.clone();
            let consumer = tokio::spawn(async move {
                run_consumer(
                    &consumer_config,
                    consumer_secrets.as_deref(),
                    consumer_sink,
                    shutdown_rx,
                )
                .await
            });

            let served = serve(&config, sink, pool).await;

            let _ = shutdown_tx.send(true);
            match consumer.await {
                Ok(Ok(report)) => info!(?report, "Consumer finished"),
                Ok(Err(e)) => error!(error = %e, "Consumer failed"),
                Err(e) => error!(error = %e, "Consumer task panicked"),
            }

            served
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "people_service=debug,stream_consumer=info,rdkafka=warn,info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(
    config: &Config,
    sink: Arc<dyn idempotent_sink::Sink>,
    pool: Option<sqlx::PgPool>,
) -> Result<()> {
    let object_store = startup::build_object_store().await;
    let default_bucket = object_storage::ObjectStoreConfig::from_env().default_bucket;

    let state = AppState {
        sink,
        object_store,
        default_bucket,
        pool,
        version: config.version_of_myserver.clone(),
    };
    let website_dir = config.website_dir.clone();
    let bind_address = format!("0.0.0.0:{}", config.http_server_port);

    info!(
        address = %bind_address,
        version = %config.version_of_myserver,
        "HTTP server listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .configure(|cfg| handlers::configure(cfg, &website_dir))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn run_consumer(
    config: &Config,
    secrets: Option<&dyn SecretProvider>,
    sink: Arc<dyn idempotent_sink::Sink>,
    shutdown: watch::Receiver<bool>,
) -> Result<LoopReport> {
    let SourceParts { source, committer } = startup::build_source(config, secrets).await?;

    let mut consumer = ConsumerLoop::new(source, config.consumer_loop_config(), shutdown);
    if let Some(committer) = committer {
        consumer = consumer.with_committer(committer);
    }

    let handler = PersonMessageHandler::new(sink);
    let start = config.start_mode();
    info!(source = ?config.source_kind, start = %start, "Starting consumer loop");

    let report = consumer
        .run_resumed(&start, &handler)
        .await
        .context("Failed to initialize cursor")?;

    if report.handler_failures > 0 {
        warn!(
            failures = report.handler_failures,
            "Some messages could not be persisted"
        );
    }
    Ok(report)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
