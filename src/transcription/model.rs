//! # Model Catalog & Engine Seam
//!
//! The known Whisper model sizes with their on-disk and download naming,
//! and the `Transcriber` trait that hides the actual engine. Everything
//! above this module works in terms of `Arc<dyn Transcriber>`; whether the
//! text comes from whisper.cpp, a remote API, or a test stub is invisible.

use anyhow::{anyhow, Result};
use std::path::Path;

/// Available Whisper model sizes.
///
/// ## Trade-offs:
/// Larger models are more accurate but slower to download and heavier on
/// disk, which is why the lifecycle manager caps how many weight files
/// survive a maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// The model identifier used for weight filenames and API parameters.
    pub fn id(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// Weight file name inside the managed cache directory.
    pub fn weights_file(&self) -> String {
        format!("{}.bin", self.id())
    }

    /// GGML weight file name as published in the whisper.cpp repository.
    pub fn remote_file(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "ggml-tiny.bin",
            ModelSize::Base => "ggml-base.bin",
            ModelSize::Small => "ggml-small.bin",
            ModelSize::Medium => "ggml-medium.bin",
            ModelSize::Large => "ggml-large-v3.bin",
        }
    }

    /// Approximate weight file size in MB, for reporting.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 75,
            ModelSize::Base => 142,
            ModelSize::Small => 466,
            ModelSize::Medium => 1536,
            ModelSize::Large => 2965,
        }
    }

    /// Human-readable description for listings.
    pub fn description(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "Fastest, basic accuracy",
            ModelSize::Base => "Fast, good default",
            ModelSize::Small => "Balanced speed and accuracy",
            ModelSize::Medium => "Good accuracy, handles technical vocabulary",
            ModelSize::Large => "Best accuracy, slowest processing",
        }
    }

    pub fn all() -> &'static [ModelSize] {
        &[
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ]
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One timed span of transcribed speech. Segments arrive time-ordered and
/// non-overlapping from the engine, with `start <= end`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    /// Segment start in seconds from the beginning of the audio
    pub start: f64,

    /// Segment end in seconds
    pub end: f64,

    /// Transcribed text for this span
    pub text: String,
}

/// Complete result of transcribing one audio file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionOutput {
    /// Full transcribed text
    pub text: String,

    /// Time-ordered segments
    pub segments: Vec<Segment>,

    /// Language detected or requested
    pub language: String,
}

/// The engine seam. Implementations may block for minutes on large files;
/// callers dispatch through `web::block` on the request path.
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio`, optionally hinting the
    /// language as an ISO 639-1 code. Failures propagate untouched; this
    /// crate never retries or rewrites engine errors.
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<TranscriptionOutput>;
}
