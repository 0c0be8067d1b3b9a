//! # Application State Management
//!
//! Shared state handed to every HTTP request handler. Configuration,
//! metrics, and session data sit behind `Arc<RwLock<T>>` so concurrent
//! requests can read without blocking each other; the reclaimer and model
//! cache are internally synchronized and shared as plain `Arc`s.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::AppConfig;
use crate::maintenance::Reclaimer;
use crate::session::SessionState;
use crate::transcription::ModelCache;

/// The application state shared across all HTTP request handlers.
///
/// ## Fields:
/// - `config`: runtime-updatable configuration
/// - `metrics`: request counters, updated by the telemetry middleware
/// - `session`: bounded key/value session store
/// - `reclaimer`: maintenance cycle owner (clock gate + retention + apply)
/// - `model_cache`: bounded cache of live transcriber handles
/// - `start_time`: for uptime reporting; never changes after startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub session: Arc<RwLock<SessionState>>,
    pub reclaimer: Arc<Reclaimer>,
    pub model_cache: Arc<ModelCache>,
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Transcriptions completed successfully since server start
    pub transcriptions_completed: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a single API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, reclaimer: Arc<Reclaimer>, model_cache: Arc<ModelCache>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            session: Arc::new(RwLock::new(SessionState::new())),
            reclaimer,
            model_cache,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the read
    /// lock immediately so other threads are never blocked on it.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it. Invalid configs are
    /// rejected and the running config stays untouched.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_transcription_completed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.transcriptions_completed += 1;
    }

    /// Record detailed metrics for one request to one endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Consistent copy of the metrics; cloned so no lock is held while the
    /// response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            transcriptions_completed: metrics.transcriptions_completed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::maintenance::clock::MaintenanceStore;
    use crate::maintenance::inventory::StoragePaths;
    use crate::transcription::loader::ModelLoader;
    use crate::transcription::model::{ModelSize, Transcriber};
    use anyhow::Result;
    use std::path::Path;
    use tempfile::TempDir;

    struct NoopLoader;

    impl ModelLoader for NoopLoader {
        fn load(&self, _model: ModelSize, _cache_dir: &Path) -> Result<Arc<dyn Transcriber>> {
            Err(anyhow::anyhow!("not used in these tests"))
        }
    }

    fn state_in(dir: &TempDir) -> AppState {
        let config = AppConfig::default();
        let paths = StoragePaths {
            output_dir: dir.path().to_path_buf(),
            cache_dir: dir.path().join("whisper_cache"),
            temp_dir: dir.path().join("tmp"),
        };
        let reclaimer = Arc::new(Reclaimer::new(
            MaintenanceStore::new(dir.path().join(".last_cleanup")),
            paths,
            RetentionConfig {
                cycle_interval_hours: 24,
                artifact_max_age_hours: 24,
                temp_max_age_minutes: 60,
                max_retained_models: 2,
            },
        ));
        let cache = Arc::new(ModelCache::new(
            &config.cache,
            Arc::new(NoopLoader),
            dir.path().join("whisper_cache"),
        ));
        AppState::new(config, reclaimer, cache)
    }

    #[test]
    fn test_metrics_counters() {
        let dir = TempDir::new().unwrap();
        let state = state_in(&dir);

        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();
        state.record_transcription_completed();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.transcriptions_completed, 1);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let dir = TempDir::new().unwrap();
        let state = state_in(&dir);

        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let state = state_in(&dir);

        let mut bad = AppConfig::default();
        bad.cache.capacity = 0;
        assert!(state.update_config(bad).is_err());

        // Running config is untouched
        assert_eq!(state.get_config().cache.capacity, 2);
    }
}
