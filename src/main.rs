//! # Audio Scribe Backend - Main Application Entry Point
//!
//! HTTP backend for Whisper-based audio transcription with managed storage
//! lifecycle. Uploads go in, three artifact files come out, and a clock-
//! gated maintenance cycle keeps the output directory and model cache from
//! growing without bound.
//!
//! ## Application Architecture:
//! - **config**: configuration (TOML file + environment variables)
//! - **state**: shared application state and metrics
//! - **maintenance**: clock gate, inventory, retention policy, reclaimer
//! - **transcription**: model catalog, weight loader, engine, handle cache
//! - **artifacts**: transcript/subtitle/segment file rendering
//! - **session**: bounded per-session key/value state
//! - **handlers**: HTTP request handlers
//! - **middleware**: request telemetry
//! - **error**: error types and HTTP error responses

mod artifacts;
mod config;
mod error;
mod handlers;
mod health;
mod maintenance;
mod middleware;
mod session;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use maintenance::{MaintenanceStore, Reclaimer, StoragePaths};
use state::AppState;
use transcription::{ModelCache, WhisperCliLoader};

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-scribe-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let store = MaintenanceStore::new(config.storage.record_path());
    let paths = StoragePaths::from_config(&config.storage);
    let reclaimer = Arc::new(Reclaimer::new(store, paths, config.retention.clone()));

    let loader = Arc::new(WhisperCliLoader::new(config.models.whisper_bin.clone()));
    let cache_dir = reclaimer.paths().cache_dir.clone();
    let model_cache = Arc::new(ModelCache::new(&config.cache, loader, cache_dir));

    if !transcription::engine::probe_binary(&config.models.whisper_bin) {
        warn!(
            binary = %config.models.whisper_bin,
            "Whisper binary not found on PATH; transcription requests will fail until it is installed"
        );
    }

    // Startup trigger: a process that slept through its cycle cleans up
    // before serving the first request.
    if let Some(startup) = reclaimer.run_if_due(Utc::now()) {
        info!(
            removed = startup.removed,
            failed = startup.failures.len(),
            "Startup maintenance cycle finished"
        );
    }

    let app_state = AppState::new(config.clone(), reclaimer, model_cache);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::TelemetryMiddleware)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::config::get_config))
                    .route("/config", web::put().to(handlers::config::update_config))
                    .route("/transcribe", web::post().to(handlers::transcribe::transcribe))
                    .route("/cache", web::get().to(handlers::maintenance::cache_report))
                    .route(
                        "/maintenance/cleanup",
                        web::post().to(handlers::maintenance::run_cleanup),
                    )
                    .route(
                        "/maintenance/reset",
                        web::post().to(handlers::maintenance::reset_all),
                    ),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_scribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
