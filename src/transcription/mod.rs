//! # Transcription Module
//!
//! Speech-to-text support built around an external whisper.cpp CLI engine.
//! The engine is a black box behind the `Transcriber` trait: this module
//! owns getting weights onto disk, keeping live handles bounded, and
//! handing the audio to the binary, never the model internals.
//!
//! ## Key Components:
//! - **Model catalog** (`model`): known model sizes, weight filenames and
//!   download sources, plus the `Transcriber` seam
//! - **Loader** (`loader`): downloads GGML weights into the managed cache
//!   directory and wraps them in an engine handle
//! - **Engine** (`engine`): subprocess driver for the whisper.cpp CLI with
//!   JSON output parsing
//! - **Cache accessor** (`cache`): in-process handle cache, capacity 2 with
//!   a 1h TTL, consulting the reclaimer before any new load
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~75MB, fastest but least accurate
//! - **base**: ~142MB, good balance for everyday audio
//! - **small**: ~466MB, better accuracy
//! - **medium**: ~1.5GB, strong with technical vocabulary
//! - **large**: ~2.9GB, best accuracy but slowest

pub mod cache;
pub mod engine;
pub mod loader;
pub mod model;

pub use cache::{CachedModelInfo, ModelCache};
pub use loader::{ModelLoader, WhisperCliLoader};
pub use model::{ModelSize, Segment, Transcriber, TranscriptionOutput};
