//! # Output Artifacts
//!
//! Renders and writes the three per-transcription artifacts next to each
//! other in the output directory:
//!
//! - `<stem>_transcricao.txt`: full text with a metadata header
//! - `<stem>_legendas.srt`: SubRip subtitles
//! - `<stem>_segmentos.txt`: human-readable timed segment listing
//!
//! The suffixes double as the retention policy's artifact markers, so
//! anything written here is automatically covered by the 24h cleanup.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::transcription::model::{Segment, TranscriptionOutput};

/// Where each artifact of one transcription landed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactPaths {
    pub transcript: PathBuf,
    pub subtitles: PathBuf,
    pub segments: PathBuf,
}

/// Format seconds as an SRT timestamp, `HH:MM:SS,mmm`. Milliseconds are
/// truncated, not rounded.
pub fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0) as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Render segments as a SubRip document: 1-based indices, blank-line
/// separated blocks, trimmed text.
pub fn render_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(segment.start),
            srt_timestamp(segment.end),
            segment.text.trim()
        ));
    }
    out
}

/// Render segments as a numbered `MM:SS` listing for quick reading.
pub fn render_segment_listing(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{:02}. [{} - {}] {}\n",
            i + 1,
            short_timestamp(segment.start),
            short_timestamp(segment.end),
            segment.text.trim()
        ));
    }
    out
}

fn short_timestamp(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Writes the artifact trio for one transcription.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write all three artifacts for the audio file `source_name`,
    /// returning where they landed. `stem` comes from the uploaded
    /// filename with its extension stripped.
    pub fn write_all(
        &self,
        source_name: &str,
        model_id: &str,
        processing_secs: f64,
        output: &TranscriptionOutput,
    ) -> Result<ArtifactPaths> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        let stem = file_stem(source_name);
        let paths = ArtifactPaths {
            transcript: self.output_dir.join(format!("{}_transcricao.txt", stem)),
            subtitles: self.output_dir.join(format!("{}_legendas.srt", stem)),
            segments: self.output_dir.join(format!("{}_segmentos.txt", stem)),
        };

        let transcript = render_transcript(source_name, model_id, processing_secs, output);
        write_artifact(&paths.transcript, &transcript)?;
        write_artifact(&paths.subtitles, &render_srt(&output.segments))?;
        write_artifact(&paths.segments, &render_segment_listing(&output.segments))?;

        info!(
            stem = %stem,
            dir = %self.output_dir.display(),
            "Transcription artifacts written"
        );
        Ok(paths)
    }
}

fn write_artifact(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn render_transcript(
    source_name: &str,
    model_id: &str,
    processing_secs: f64,
    output: &TranscriptionOutput,
) -> String {
    format!(
        "TRANSCRIPTION\n\
         =============\n\
         Source: {}\n\
         Model: {}\n\
         Language: {}\n\
         Processing time: {:.1}s\n\
         Generated: {}\n\
         =============\n\n\
         {}\n",
        source_name,
        model_id,
        output.language,
        processing_secs,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        output.text.trim()
    )
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn segment(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_srt_timestamp_formatting() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(61.5), "00:01:01,500");
        assert_eq!(srt_timestamp(3661.5), "01:01:01,500");
    }

    #[test]
    fn test_srt_timestamp_truncates_milliseconds() {
        assert_eq!(srt_timestamp(3662.2504), "01:01:02,250");
        assert_eq!(srt_timestamp(0.9999), "00:00:00,999");
    }

    #[test]
    fn test_render_srt_blocks() {
        let segments = vec![
            segment(0.0, 4.5, " Bom dia a todos. "),
            segment(4.5, 9.25, "Vamos comecar."),
        ];
        let srt = render_srt(&segments);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:04,500\nBom dia a todos.\n\n\
             2\n00:00:04,500 --> 00:00:09,250\nVamos comecar.\n\n"
        );
    }

    #[test]
    fn test_render_segment_listing() {
        let segments = vec![segment(65.0, 130.0, "Pauta do dia.")];
        let listing = render_segment_listing(&segments);
        assert_eq!(listing, "01. [01:05 - 02:10] Pauta do dia.\n");
    }

    #[test]
    fn test_write_all_produces_the_trio() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let output = TranscriptionOutput {
            text: "Bom dia a todos.".to_string(),
            segments: vec![segment(0.0, 4.5, "Bom dia a todos.")],
            language: "pt".to_string(),
        };

        let paths = writer
            .write_all("reuniao semanal.mp3", "base", 12.3, &output)
            .unwrap();

        assert_eq!(
            paths.transcript.file_name().unwrap(),
            "reuniao semanal_transcricao.txt"
        );
        assert!(paths.transcript.exists());
        assert!(paths.subtitles.exists());
        assert!(paths.segments.exists());

        let transcript = fs::read_to_string(&paths.transcript).unwrap();
        assert!(transcript.contains("Source: reuniao semanal.mp3"));
        assert!(transcript.contains("Model: base"));
        assert!(transcript.contains("Bom dia a todos."));

        let srt = fs::read_to_string(&paths.subtitles).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:04,500\n"));
    }
}
