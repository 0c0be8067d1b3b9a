//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! The retention, cache, and session sections drive the lifecycle manager;
//! every threshold the maintenance code uses lives here so tests can build
//! a config by hand instead of mocking the wall clock.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (`APP_SERVER__HOST`, `APP_RETENTION__ARTIFACT_MAX_AGE_HOURS`, ...);
//!    sections and field names are separated by a double underscore so that
//!    multi-word field names survive the split
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// Broken into logical groups so the maintenance code can borrow just the
/// sections it needs (`RetentionConfig`, `StorageConfig`) without dragging
/// server settings along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub retention: RetentionConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

/// Server-specific configuration settings.
///
/// - `host = "127.0.0.1"`: only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: accept connections from any address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Transcription model settings.
///
/// ## Fields:
/// - `default_model`: model used when the upload does not name one
///   ("tiny", "base", "small", "medium", "large")
/// - `whisper_bin`: name or path of the external whisper.cpp CLI binary
/// - `max_upload_mb`: upload size cap enforced before any processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub default_model: String,
    pub whisper_bin: String,
    pub max_upload_mb: u64,
}

/// Retention thresholds for the maintenance cycle.
///
/// Time-based gating (the cycle interval) and capacity-based gating
/// (`max_retained_models`) are orthogonal policies; they are grouped here
/// but consumed by separate pure functions.
///
/// ## Fields:
/// - `cycle_interval_hours`: minimum spacing between maintenance cycles
/// - `artifact_max_age_hours`: retention window for generated artifacts
/// - `temp_max_age_minutes`: staleness window for upload scratch files
///   (deliberately much shorter than the artifact window, and not gated
///   by the cycle interval when invoked directly)
/// - `max_retained_models`: on-disk weight files kept per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub cycle_interval_hours: i64,
    pub artifact_max_age_hours: i64,
    pub temp_max_age_minutes: i64,
    pub max_retained_models: usize,
}

/// In-process model handle cache bounds.
///
/// ## Fields:
/// - `capacity`: live model handles kept in memory (LRU beyond this)
/// - `ttl_secs`: seconds after load before a handle is treated as absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

/// Session state trimming bounds.
///
/// ## Fields:
/// - `max_entries`: size cap that triggers a trim
/// - `keep_recent`: unprotected entries surviving a trim
/// - `trim_interval`: trim check runs every N completed transcriptions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_entries: usize,
    pub keep_recent: usize,
    pub trim_interval: u32,
}

/// Filesystem layout for persistent state.
///
/// ## Fields:
/// - `output_dir`: where transcript/subtitle artifacts are written
/// - `cache_dir`: model weight cache directory (created on first use)
/// - `record_file`: maintenance timestamp record, relative to `output_dir`
///   unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: String,
    pub cache_dir: String,
    pub record_file: String,
}

impl StorageConfig {
    /// Resolved path of the maintenance record file.
    pub fn record_path(&self) -> PathBuf {
        let record = PathBuf::from(&self.record_file);
        if record.is_absolute() {
            record
        } else {
            PathBuf::from(&self.output_dir).join(record)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                default_model: "base".to_string(),
                whisper_bin: "whisper-cli".to_string(),
                max_upload_mb: 200,
            },
            retention: RetentionConfig {
                cycle_interval_hours: 24,
                artifact_max_age_hours: 24,
                temp_max_age_minutes: 60,
                max_retained_models: 2,
            },
            cache: CacheConfig {
                capacity: 2,
                ttl_secs: 3600,
            },
            session: SessionConfig {
                max_entries: 10,
                keep_recent: 5,
                trim_interval: 6,
            },
            storage: StorageConfig {
                output_dir: ".".to_string(),
                cache_dir: "whisper_cache".to_string(),
                record_file: ".last_cleanup".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST` and `PORT` are honored without the APP_ prefix because
    /// deployment platforms commonly inject them that way.
    pub fn load() -> Result<Self> {
        // Double-underscore separates section from field so multi-word
        // field names like artifact_max_age_hours stay intact.
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching bad thresholds here keeps the maintenance code free of
    /// defensive checks: a zero retention window or a zero-capacity cache
    /// would otherwise silently delete everything on every request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.retention.cycle_interval_hours <= 0 {
            return Err(anyhow::anyhow!("Cycle interval must be at least 1 hour"));
        }

        if self.retention.artifact_max_age_hours <= 0 {
            return Err(anyhow::anyhow!("Artifact retention window must be positive"));
        }

        if self.retention.temp_max_age_minutes <= 0 {
            return Err(anyhow::anyhow!("Temp staleness window must be positive"));
        }

        if self.retention.max_retained_models == 0 {
            return Err(anyhow::anyhow!("At least one cached model must be retained"));
        }

        if self.cache.capacity == 0 {
            return Err(anyhow::anyhow!("Model cache capacity must be greater than 0"));
        }

        if self.cache.ttl_secs == 0 {
            return Err(anyhow::anyhow!("Model cache TTL must be greater than 0"));
        }

        if self.session.max_entries == 0 || self.session.keep_recent == 0 {
            return Err(anyhow::anyhow!("Session bounds must be greater than 0"));
        }

        if self.session.trim_interval == 0 {
            return Err(anyhow::anyhow!("Session trim interval must be greater than 0"));
        }

        if self.models.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Upload size limit must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Only the fields present in the JSON are touched, so a client can send
    /// `{"retention": {"artifact_max_age_hours": 48}}` without restating the
    /// rest. The updated configuration is re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(models) = partial.get("models") {
            if let Some(model) = models.get("default_model").and_then(|v| v.as_str()) {
                self.models.default_model = model.to_string();
            }
            if let Some(bin) = models.get("whisper_bin").and_then(|v| v.as_str()) {
                self.models.whisper_bin = bin.to_string();
            }
            if let Some(mb) = models.get("max_upload_mb").and_then(|v| v.as_u64()) {
                self.models.max_upload_mb = mb;
            }
        }

        if let Some(retention) = partial.get("retention") {
            if let Some(hours) = retention.get("cycle_interval_hours").and_then(|v| v.as_i64()) {
                self.retention.cycle_interval_hours = hours;
            }
            if let Some(hours) = retention
                .get("artifact_max_age_hours")
                .and_then(|v| v.as_i64())
            {
                self.retention.artifact_max_age_hours = hours;
            }
            if let Some(minutes) = retention
                .get("temp_max_age_minutes")
                .and_then(|v| v.as_i64())
            {
                self.retention.temp_max_age_minutes = minutes;
            }
            if let Some(count) = retention
                .get("max_retained_models")
                .and_then(|v| v.as_u64())
            {
                self.retention.max_retained_models = count as usize;
            }
        }

        if let Some(cache) = partial.get("cache") {
            if let Some(capacity) = cache.get("capacity").and_then(|v| v.as_u64()) {
                self.cache.capacity = capacity as usize;
            }
            if let Some(ttl) = cache.get("ttl_secs").and_then(|v| v.as_u64()) {
                self.cache.ttl_secs = ttl;
            }
        }

        if let Some(session) = partial.get("session") {
            if let Some(max) = session.get("max_entries").and_then(|v| v.as_u64()) {
                self.session.max_entries = max as usize;
            }
            if let Some(keep) = session.get("keep_recent").and_then(|v| v.as_u64()) {
                self.session.keep_recent = keep as usize;
            }
            if let Some(every) = session.get("trim_interval").and_then(|v| v.as_u64()) {
                self.session.trim_interval = every as u32;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.retention.max_retained_models, 2);
        assert_eq!(config.retention.cycle_interval_hours, 24);
        assert_eq!(config.cache.capacity, 2);
        assert_eq!(config.session.max_entries, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retention.max_retained_models = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_reaches_nested_fields() {
        env::set_var("APP_RETENTION__ARTIFACT_MAX_AGE_HOURS", "48");
        env::set_var("APP_SERVER__HOST", "0.0.0.0");

        let result = AppConfig::load();

        env::remove_var("APP_RETENTION__ARTIFACT_MAX_AGE_HOURS");
        env::remove_var("APP_SERVER__HOST");

        let config = result.unwrap();
        assert_eq!(config.retention.artifact_max_age_hours, 48);
        assert_eq!(config.server.host, "0.0.0.0");
        // Untouched fields keep their defaults
        assert_eq!(config.retention.cycle_interval_hours, 24);
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"retention": {"artifact_max_age_hours": 48}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.retention.artifact_max_age_hours, 48);
        // Untouched sections keep their values
        assert_eq!(config.retention.max_retained_models, 2);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"cache": {"capacity": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_record_path_resolution() {
        let storage = StorageConfig {
            output_dir: "/var/scribe".to_string(),
            cache_dir: "whisper_cache".to_string(),
            record_file: ".last_cleanup".to_string(),
        };
        assert_eq!(
            storage.record_path(),
            PathBuf::from("/var/scribe/.last_cleanup")
        );

        let absolute = StorageConfig {
            record_file: "/tmp/.last_cleanup".to_string(),
            ..storage
        };
        assert_eq!(absolute.record_path(), PathBuf::from("/tmp/.last_cleanup"));
    }
}
