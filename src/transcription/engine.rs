//! # Whisper CLI Engine
//!
//! Drives the whisper.cpp command-line binary as a subprocess and parses
//! its JSON output. The binary is treated as opaque: we hand it a weight
//! file and an audio path, ask for JSON, and read the result back. The
//! JSON scratch file lives in the OS temp directory under the managed
//! scratch prefix, so the stale-temp rule covers anything left behind by
//! a crashed run.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::maintenance::inventory::TEMP_PREFIX;
use crate::transcription::model::{ModelSize, Segment, Transcriber, TranscriptionOutput};

/// Transcriber backed by the whisper.cpp CLI.
pub struct WhisperCliEngine {
    whisper_bin: String,
    weights: PathBuf,
    model: ModelSize,
}

impl WhisperCliEngine {
    pub fn new(whisper_bin: String, weights: PathBuf, model: ModelSize) -> Self {
        Self {
            whisper_bin,
            weights,
            model,
        }
    }

    pub fn model(&self) -> ModelSize {
        self.model
    }
}

impl Transcriber for WhisperCliEngine {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<TranscriptionOutput> {
        let out_base = std::env::temp_dir().join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        let json_path = out_base.with_extension("json");

        let mut cmd = Command::new(&self.whisper_bin);
        cmd.arg("-m")
            .arg(&self.weights)
            .arg("-f")
            .arg(audio)
            .arg("-oj")
            .arg("-of")
            .arg(&out_base)
            .arg("-np");
        if let Some(lang) = language {
            cmd.arg("-l").arg(lang);
        }

        debug!(model = %self.model, audio = %audio.display(), "Invoking whisper.cpp");
        let output = cmd
            .output()
            .with_context(|| format!("Failed to launch whisper binary '{}'", self.whisper_bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = fs::remove_file(&json_path);
            return Err(anyhow!(
                "whisper.cpp exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let raw = fs::read_to_string(&json_path)
            .with_context(|| format!("whisper.cpp produced no output at {}", json_path.display()))?;
        if let Err(e) = fs::remove_file(&json_path) {
            warn!(path = %json_path.display(), error = %e, "Could not remove engine scratch file");
        }

        parse_whisper_json(&raw, language)
    }
}

/// Check that the configured whisper binary is on the PATH and runs.
pub fn probe_binary(whisper_bin: &str) -> bool {
    Command::new(whisper_bin)
        .arg("--help")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

// whisper.cpp -oj output shape: offsets are integer milliseconds.
#[derive(Deserialize)]
struct WhisperJson {
    result: Option<WhisperResult>,
    transcription: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

fn parse_whisper_json(raw: &str, requested_language: Option<&str>) -> Result<TranscriptionOutput> {
    let parsed: WhisperJson =
        serde_json::from_str(raw).context("Failed to parse whisper.cpp JSON output")?;

    let segments: Vec<Segment> = parsed
        .transcription
        .iter()
        .map(|s| Segment {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text.trim().to_string(),
        })
        .filter(|s| !s.text.is_empty())
        .collect();

    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let language = parsed
        .result
        .and_then(|r| r.language)
        .or_else(|| requested_language.map(String::from))
        .unwrap_or_else(|| "auto".to_string());

    Ok(TranscriptionOutput {
        text,
        segments,
        language,
    })
}
