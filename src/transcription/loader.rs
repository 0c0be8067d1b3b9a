//! # Model Loader
//!
//! Gets model weights onto disk and wraps them in an engine handle. The
//! download streams GGML files from the whisper.cpp Hugging Face mirror
//! into the managed cache directory, writing to a `.partial` sibling first
//! so the inventory scan never sees a half-downloaded weight file as a
//! cache entry.
//!
//! Reusing an already-downloaded file bumps its mtime; that timestamp is
//! what the retention policy reads as `last_accessed_at`, so a model in
//! active use never ranks behind one nobody has touched for days.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::transcription::engine::WhisperCliEngine;
use crate::transcription::model::{ModelSize, Transcriber};

const WEIGHTS_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";
const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_READ_TIMEOUT: Duration = Duration::from_secs(600);

/// Turns a model id into a live `Transcriber` handle, downloading weights
/// into `cache_dir` as needed. Injected into the cache accessor so tests
/// can substitute a stub that never touches the network.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: ModelSize, cache_dir: &Path) -> Result<Arc<dyn Transcriber>>;
}

/// Production loader: weight download plus a whisper.cpp CLI engine.
pub struct WhisperCliLoader {
    whisper_bin: String,
}

impl WhisperCliLoader {
    pub fn new(whisper_bin: impl Into<String>) -> Self {
        Self {
            whisper_bin: whisper_bin.into(),
        }
    }
}

impl ModelLoader for WhisperCliLoader {
    fn load(&self, model: ModelSize, cache_dir: &Path) -> Result<Arc<dyn Transcriber>> {
        let weights = ensure_weights(model, cache_dir)?;
        Ok(Arc::new(WhisperCliEngine::new(
            self.whisper_bin.clone(),
            weights,
            model,
        )))
    }
}

/// Make sure the weight file for `model` exists in `cache_dir`, creating
/// the directory and downloading on first use.
pub fn ensure_weights(model: ModelSize, cache_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;

    let dest = cache_dir.join(model.weights_file());
    if dest.exists() {
        touch(&dest);
        debug!(path = %dest.display(), "Reusing cached weights");
        return Ok(dest);
    }

    let url = format!("{}/{}", WEIGHTS_BASE_URL, model.remote_file());
    info!(model = %model, url = %url, "Downloading model weights (~{} MB)", model.size_mb());
    download_weights(&url, &dest)?;
    info!(model = %model, path = %dest.display(), "Model weights downloaded");
    Ok(dest)
}

/// Stream `url` to `dest` via a `.partial` temp file renamed on success.
fn download_weights(url: &str, dest: &Path) -> Result<()> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(DOWNLOAD_CONNECT_TIMEOUT)
        .timeout_read(DOWNLOAD_READ_TIMEOUT)
        .build();

    let response = agent
        .get(url)
        .call()
        .map_err(|e| anyhow!("Failed to download weights from {}: {}", url, e))?;

    let expected = response
        .header("Content-Length")
        .and_then(|s| s.parse::<u64>().ok());

    let partial = dest.with_extension("partial");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut reader = response.into_reader();
    let mut buffer = [0u8; 64 * 1024];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buffer).context("Failed reading download stream")?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])
            .with_context(|| format!("Failed writing {}", partial.display()))?;
        written += n as u64;
    }
    drop(file);

    if let Some(expected) = expected {
        if written != expected {
            // Leave nothing behind; the next attempt starts clean
            let _ = fs::remove_file(&partial);
            return Err(anyhow!(
                "Incomplete download: expected {} bytes, got {}",
                expected,
                written
            ));
        }
    }

    fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move weights into place at {}", dest.display()))?;
    Ok(())
}

/// Best-effort mtime bump; the file stays usable if this fails.
fn touch(path: &Path) {
    if let Ok(file) = fs::File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}
