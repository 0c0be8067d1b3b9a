//! # Maintenance & Cache Handlers
//!
//! Read-only inventory reporting plus the two manual triggers: the
//! clock-gated cleanup and the unconditional full reset.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;
use crate::transcription::ModelSize;

/// Inventory and cache report.
///
/// ## Endpoint: `GET /api/v1/cache`
///
/// Reports the weight files on disk, live handles in memory, total disk
/// usage, and how long until the next maintenance cycle is due. A report
/// of `0` seconds means the next trigger will run a cycle.
pub async fn cache_report(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let reclaimer = &app_state.reclaimer;
    let paths = reclaimer.paths();

    let models_on_disk: Vec<_> = paths
        .list_models()
        .into_iter()
        .map(|(model_id, size_bytes)| {
            json!({
                "model": model_id,
                "size_bytes": size_bytes,
                "size_mb": size_bytes / (1024 * 1024),
            })
        })
        .collect();

    let next_cycle_secs = reclaimer
        .store()
        .time_until_next_cycle(now, reclaimer.cycle_interval())
        .map(|d| d.num_seconds().max(0))
        .unwrap_or(0);

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": now.to_rfc3339(),
        "models_on_disk": models_on_disk,
        "total_size_bytes": paths.total_size(),
        "loaded_models": app_state.model_cache.loaded_models(),
        "cache_capacity": app_state.model_cache.capacity(),
        "cache_ttl_seconds": app_state.model_cache.ttl_secs(),
        "last_cleanup": reclaimer.store().last_run().map(|t| t.to_rfc3339()),
        "next_cycle_in_seconds": next_cycle_secs,
        "available_models": ModelSize::all().iter().map(|m| json!({
            "model": m.id(),
            "size_mb": m.size_mb(),
            "description": m.description(),
        })).collect::<Vec<_>>(),
    })))
}

/// Run the maintenance cycle if it is due.
///
/// ## Endpoint: `POST /api/v1/maintenance/cleanup`
///
/// The clock gate applies: calling this repeatedly within the cycle
/// interval does nothing after the first run. The response reports
/// whether a cycle actually ran.
pub async fn run_cleanup(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let reclaimer = app_state.reclaimer.clone();

    // run_if_due itself reports whether the gate opened; a racing trigger
    // may have re-armed it by the time the worker runs.
    let outcome = web::block(move || reclaimer.run_if_due(now))
        .await
        .map_err(|e| AppError::Internal(format!("Worker pool failure: {}", e)))?;

    let cycle_ran = outcome.is_some();
    let summary = outcome.unwrap_or_default();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": now.to_rfc3339(),
        "cycle_ran": cycle_ran,
        "removed": summary.removed,
        "failures": summary.failures,
        "next_cycle_in_seconds": app_state
            .reclaimer
            .store()
            .time_until_next_cycle(now, app_state.reclaimer.cycle_interval())
            .map(|d| d.num_seconds().max(0))
            .unwrap_or(0),
    })))
}

/// Reset everything: artifacts, weight files, scratch files, live model
/// handles, and session state.
///
/// ## Endpoint: `POST /api/v1/maintenance/reset`
pub async fn reset_all(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    info!("Full reset requested");

    let reclaimer = app_state.reclaimer.clone();
    let summary = web::block(move || reclaimer.wipe_all(now))
        .await
        .map_err(|e| AppError::Internal(format!("Worker pool failure: {}", e)))?;

    app_state.model_cache.clear();
    app_state.session.write().unwrap().reset();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": now.to_rfc3339(),
        "removed": summary.removed,
        "failures": summary.failures,
        "session_cleared": true,
        "model_cache_cleared": true,
    })))
}
