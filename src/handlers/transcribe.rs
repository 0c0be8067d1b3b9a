//! # Transcription Handler
//!
//! `POST /api/v1/transcribe` accepts a multipart upload with an `audio`
//! file plus optional `model` and `language` text fields, runs the engine,
//! and writes the artifact trio into the output directory.
//!
//! ## Request lifecycle:
//! 1. Stream the upload into a scratch file under the managed temp prefix
//! 2. Resolve the model handle through the cache (maintenance may run here)
//! 3. Transcribe on a blocking worker; whisper.cpp can take minutes
//! 4. Write artifacts, record the result in session state, trim if due
//! 5. Remove the scratch file best-effort; the stale-temp sweep covers
//!    anything a crash leaves behind

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactWriter;
use crate::error::AppError;
use crate::maintenance::inventory::TEMP_PREFIX;
use crate::state::AppState;
use crate::transcription::ModelSize;

struct Upload {
    audio_path: PathBuf,
    filename: String,
    model: Option<String>,
    language: Option<String>,
}

pub async fn transcribe(
    app_state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let started = Instant::now();
    let config = app_state.get_config();

    let temp_dir = app_state.reclaimer.paths().temp_dir.clone();
    let max_bytes = config.models.max_upload_mb as usize * 1024 * 1024;
    let upload = read_upload(payload, &temp_dir, max_bytes).await?;

    let model: ModelSize = upload
        .model
        .as_deref()
        .unwrap_or(&config.models.default_model)
        .parse()
        .map_err(|e| AppError::ValidationError(format!("Invalid model: {}", e)))?;

    info!(
        file = %upload.filename,
        model = %model,
        language = ?upload.language,
        "Transcription requested"
    );

    // Model load and transcription both block for a long time; keep them
    // off the async workers.
    let cache = Arc::clone(&app_state.model_cache);
    let reclaimer = Arc::clone(&app_state.reclaimer);
    let audio_path = upload.audio_path.clone();
    let language = upload.language.clone();
    let result = web::block(move || {
        let handle = cache
            .get(model, &reclaimer)
            .map_err(|e| AppError::ModelLoad(e.to_string()))?;
        handle
            .transcribe(&audio_path, language.as_deref())
            .map_err(|e| AppError::Transcription(e.to_string()))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Worker pool failure: {}", e)))?;

    remove_scratch(&upload.audio_path);

    // Scratch files left behind by crashed or abandoned requests age out
    // on the short temp window; sweep them on every completed request.
    let swept = app_state.reclaimer.sweep_temp_files(chrono::Utc::now());
    if swept.removed > 0 {
        info!(removed = swept.removed, "Swept stale scratch files");
    }

    let output = result?;

    let processing_secs = started.elapsed().as_secs_f64();
    let writer = ArtifactWriter::new(&config.storage.output_dir);
    let artifacts = writer.write_all(&upload.filename, model.id(), processing_secs, &output)?;

    app_state.record_transcription_completed();
    record_in_session(&app_state, &upload.filename, model, &output.language);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "file": upload.filename,
        "model": model.id(),
        "language": output.language,
        "text": output.text,
        "segment_count": output.segments.len(),
        "segments": output.segments,
        "artifacts": artifacts,
        "processing_time_seconds": processing_secs,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Pull the multipart fields apart, streaming the audio field to disk.
async fn read_upload(
    mut payload: Multipart,
    temp_dir: &Path,
    max_bytes: usize,
) -> Result<Upload, AppError> {
    let mut audio_path: Option<PathBuf> = None;
    let mut filename: Option<String> = None;
    let mut model: Option<String> = None;
    let mut language: Option<String> = None;

    fs::create_dir_all(temp_dir)
        .map_err(|e| AppError::Internal(format!("Failed to create temp directory: {}", e)))?;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .ok_or_else(|| AppError::ValidationError("Missing field name".to_string()))?
            .to_string();

        match field_name.as_str() {
            "audio" => {
                let original = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|s| s.to_string())
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::ValidationError("Audio upload has no filename".to_string())
                    })?;

                let extension = Path::new(&original)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                let scratch =
                    temp_dir.join(format!("{}{}{}", TEMP_PREFIX, Uuid::new_v4(), extension));

                let mut bytes: Vec<u8> = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| AppError::ValidationError(format!("Upload error: {}", e)))?;
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(AppError::ValidationError(format!(
                            "File too large (max {} MB)",
                            max_bytes / (1024 * 1024)
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                if bytes.is_empty() {
                    return Err(AppError::ValidationError("Audio upload is empty".to_string()));
                }

                fs::write(&scratch, &bytes)
                    .map_err(|e| AppError::Internal(format!("Failed to save upload: {}", e)))?;
                audio_path = Some(scratch);
                filename = Some(original);
            }
            "model" => model = Some(read_text_field(&mut field).await?),
            "language" => {
                let value = read_text_field(&mut field).await?;
                if !value.trim().is_empty() {
                    language = Some(value.trim().to_string());
                }
            }
            other => {
                warn!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    match (audio_path, filename) {
        (Some(audio_path), Some(filename)) => Ok(Upload {
            audio_path,
            filename,
            model,
            language,
        }),
        _ => Err(AppError::ValidationError(
            "No audio file provided".to_string(),
        )),
    }
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::ValidationError(format!("Upload error: {}", e)))?;
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| AppError::ValidationError("Text field is not valid UTF-8".to_string()))
}

fn remove_scratch(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove upload scratch file");
    }
}

/// Record the result in session state and trim when the interval says so.
fn record_in_session(app_state: &web::Data<AppState>, filename: &str, model: ModelSize, language: &str) {
    let config = app_state.get_config();
    let mut session = app_state.session.write().unwrap();

    session.insert("active_model", json!(model.id()));
    session.insert(
        format!("transcricao_{}", filename),
        json!({
            "model": model.id(),
            "language": language,
            "completed_at": chrono::Utc::now().to_rfc3339(),
        }),
    );

    if session.note_transcription(&config.session) {
        session.trim(&config.session);
    }
}
