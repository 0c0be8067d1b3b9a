//! # HTTP Request Handlers
//!
//! The REST surface, grouped by concern:
//! - `transcribe`: audio upload and artifact generation
//! - `maintenance`: cache report, manual cleanup trigger, full reset
//! - `config`: runtime configuration read/update

pub mod config;
pub mod maintenance;
pub mod transcribe;
