//! # Inventory Scanning & Reporting
//!
//! Read-only enumeration of the persistent state the lifecycle manager
//! governs: generated artifacts in the output directory, model weight files
//! in the cache directory, and upload scratch files in the OS temp
//! directory. Scanning never mutates anything; unreadable entries are
//! skipped with a warning so one bad file can't hide the rest.
//!
//! The same scan backs both the retention policy (deletion candidates) and
//! the reporting surface consumed by `/api/v1/cache` and `/health`.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::StorageConfig;

/// Filename suffixes that mark a file as a generated transcription artifact.
pub const ARTIFACT_SUFFIXES: &[&str] = &["_transcricao.txt", "_legendas.srt", "_segmentos.txt"];

/// Extension of on-disk model weight files (`<model_id>.bin`).
pub const WEIGHTS_EXTENSION: &str = "bin";

/// Prefix of upload scratch files written to the OS temp directory.
/// Scanning keys off this prefix so the reclaimer never touches scratch
/// files owned by other programs.
pub const TEMP_PREFIX: &str = "scribe-";

/// A generated transcript/subtitle file eligible for retention decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// A persisted model weight file keyed by model id.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCacheEntry {
    pub model_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_accessed_at: DateTime<Utc>,
}

/// An upload scratch file in the OS temp directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TempFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of everything the retention policy may consider deleting.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub artifacts: Vec<ArtifactFile>,
    pub models: Vec<ModelCacheEntry>,
    pub temp_files: Vec<TempFile>,
}

/// The directories the lifecycle manager owns, bundled so handlers, the
/// reclaimer, and tests all resolve the same locations.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl StoragePaths {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&storage.output_dir),
            cache_dir: PathBuf::from(&storage.output_dir).join(&storage.cache_dir),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Enumerate current artifacts, model entries, and scratch files.
    ///
    /// A directory that does not exist yet (fresh install, cache never
    /// populated) simply contributes nothing.
    pub fn scan(&self) -> Inventory {
        Inventory {
            artifacts: self.scan_artifacts(),
            models: self.scan_models(),
            temp_files: self.scan_temp_files(),
        }
    }

    fn scan_artifacts(&self) -> Vec<ArtifactFile> {
        let mut artifacts = Vec::new();
        for (path, name) in list_files(&self.output_dir) {
            if !ARTIFACT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                continue;
            }
            match file_timestamp(&path) {
                Some(created_at) => artifacts.push(ArtifactFile { path, created_at }),
                None => warn!(path = %path.display(), "Skipping artifact with unreadable metadata"),
            }
        }
        artifacts
    }

    fn scan_models(&self) -> Vec<ModelCacheEntry> {
        let mut models = Vec::new();
        for (path, _name) in list_files(&self.cache_dir) {
            if path.extension().and_then(|e| e.to_str()) != Some(WEIGHTS_EXTENSION) {
                continue;
            }
            let Some(model_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let model_id = model_id.to_string();

            let (size_bytes, last_accessed_at) = match fs::metadata(&path) {
                Ok(meta) => match meta.modified() {
                    Ok(mtime) => (meta.len(), DateTime::<Utc>::from(mtime)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping model entry without mtime");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable model entry");
                    continue;
                }
            };

            models.push(ModelCacheEntry {
                model_id,
                path,
                size_bytes,
                last_accessed_at,
            });
        }
        models
    }

    fn scan_temp_files(&self) -> Vec<TempFile> {
        let mut temp_files = Vec::new();
        for (path, name) in list_files(&self.temp_dir) {
            if !name.starts_with(TEMP_PREFIX) {
                continue;
            }
            match file_timestamp(&path) {
                Some(created_at) => temp_files.push(TempFile { path, created_at }),
                None => warn!(path = %path.display(), "Skipping temp file with unreadable metadata"),
            }
        }
        temp_files
    }

    /// Cached models as `(model_id, size_bytes)` pairs, sorted by id.
    pub fn list_models(&self) -> Vec<(String, u64)> {
        let mut models: Vec<(String, u64)> = self
            .scan_models()
            .into_iter()
            .map(|entry| (entry.model_id, entry.size_bytes))
            .collect();
        models.sort();
        models
    }

    /// Total bytes held by the model weight cache.
    pub fn total_size(&self) -> u64 {
        self.scan_models().iter().map(|entry| entry.size_bytes).sum()
    }
}

/// Plain files in `dir` with their UTF-8 names; everything else is skipped.
fn list_files(dir: &Path) -> Vec<(PathBuf, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        files.push((path.clone(), name.to_string()));
    }
    files
}

fn file_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}
