//! # Session State
//!
//! Insertion-ordered key/value state for the interactive session, with a
//! bounded-growth trimmer. Long-running sessions accumulate per-request
//! scratch entries; every sixth transcription (configurable) the trimmer
//! drops everything except a protected core and the most recently inserted
//! handful.
//!
//! ## Ordering:
//! Entries keep their first-insertion order. Updating an existing key
//! replaces its value in place and does not move it, so "most recent" for
//! trimming purposes means most recently *inserted*, matching positional
//! recency rather than update recency.

use serde_json::Value;
use tracing::{debug, info};

use crate::config::SessionConfig;

/// Keys that survive every trim regardless of age or position.
pub const PROTECTED_KEYS: &[&str] = &["active_model", "preferences"];

/// Bounded, insertion-ordered session store.
#[derive(Debug, Default)]
pub struct SessionState {
    entries: Vec<(String, Value)>,
    transcriptions: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a key. Updates keep the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Count a completed transcription and report whether a trim is due.
    /// Every `trim_interval`-th transcription returns true.
    pub fn note_transcription(&mut self, config: &SessionConfig) -> bool {
        self.transcriptions += 1;
        config.trim_interval > 0 && self.transcriptions % config.trim_interval as u64 == 0
    }

    pub fn transcription_count(&self) -> u64 {
        self.transcriptions
    }

    /// Trim unprotected entries down to the most recently inserted
    /// `keep_recent`, but only once the store has outgrown `max_entries`.
    /// Below the threshold the store is left untouched.
    pub fn trim(&mut self, config: &SessionConfig) {
        if self.entries.len() <= config.max_entries {
            debug!(entries = self.entries.len(), "Session under limit, no trim");
            return;
        }

        let unprotected: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, (k, _))| !PROTECTED_KEYS.contains(&k.as_str()))
            .map(|(i, _)| i)
            .collect();

        if unprotected.len() <= config.keep_recent {
            return;
        }

        let drop_count = unprotected.len() - config.keep_recent;
        let doomed: Vec<usize> = unprotected.into_iter().take(drop_count).collect();

        let before = self.entries.len();
        let mut index = 0;
        self.entries.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });

        info!(
            removed = before - self.entries.len(),
            remaining = self.entries.len(),
            "Trimmed session state"
        );
    }

    /// Drop every entry and the transcription counter.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.transcriptions = 0;
        info!("Session state reset");
    }
}
