//! # Model Cache Accessor
//!
//! In-process cache of live `Transcriber` handles, bounded two ways:
//! at most `capacity` handles at once (least-recently-used falls out) and
//! a TTL after which a cached handle is treated as absent. A miss runs
//! the clock-gated maintenance cycle before loading, so a long-idle
//! process cleans up the moment it comes back to life instead of waiting
//! for the next scheduled trigger.
//!
//! ## Locking:
//! A single mutex guards the entry map. It is released while a load runs,
//! so hits keep being served during a slow weight download; two requests
//! racing to load the same model both load, and the insert re-checks the
//! map so only one handle is kept.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::maintenance::Reclaimer;
use crate::transcription::loader::ModelLoader;
use crate::transcription::model::{ModelSize, Transcriber};

struct CachedHandle {
    handle: Arc<dyn Transcriber>,
    loaded_at: Instant,
    last_used: Instant,
}

/// Summary of one cached handle, for the cache report endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CachedModelInfo {
    pub model: ModelSize,
    pub age_secs: u64,
    pub idle_secs: u64,
}

/// Bounded cache of loaded model handles.
pub struct ModelCache {
    entries: Mutex<HashMap<ModelSize, CachedHandle>>,
    capacity: usize,
    ttl: Duration,
    loader: Arc<dyn ModelLoader>,
    cache_dir: PathBuf,
}

impl ModelCache {
    pub fn new(config: &CacheConfig, loader: Arc<dyn ModelLoader>, cache_dir: PathBuf) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: config.capacity.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
            loader,
            cache_dir,
        }
    }

    /// Get a handle for `model`, loading it on a miss. A cache hit
    /// refreshes the handle's recency; a miss consults the reclaimer
    /// before loading.
    pub fn get(&self, model: ModelSize, reclaimer: &Reclaimer) -> Result<Arc<dyn Transcriber>> {
        self.get_at(model, reclaimer, Instant::now(), Utc::now())
    }

    /// Clock-injected variant of [`get`](Self::get).
    pub fn get_at(
        &self,
        model: ModelSize,
        reclaimer: &Reclaimer,
        instant_now: Instant,
        now: DateTime<Utc>,
    ) -> Result<Arc<dyn Transcriber>> {
        {
            let mut entries = self.entries.lock().unwrap();

            if let Some(entry) = entries.get_mut(&model) {
                if instant_now.duration_since(entry.loaded_at) < self.ttl {
                    entry.last_used = instant_now;
                    debug!(model = %model, "Model cache hit");
                    return Ok(Arc::clone(&entry.handle));
                }
                debug!(model = %model, "Cached handle expired");
                entries.remove(&model);
            }
        }

        // Miss path: give storage maintenance a chance before pulling
        // more weight data onto disk. The map is unlocked from here until
        // the insert, so hits on other models are served while the load
        // is in flight.
        if let Some(maintenance) = reclaimer.run_if_due(now) {
            if maintenance.removed > 0 {
                info!(removed = maintenance.removed, "Maintenance ran before model load");
            }
        }

        info!(model = %model, "Loading model");
        let handle = self.loader.load(model, &self.cache_dir)?;

        let mut entries = self.entries.lock().unwrap();

        // A concurrent request may have loaded the same model while the
        // map was unlocked; keep the handle that got there first.
        if let Some(existing) = entries.get_mut(&model) {
            if instant_now.duration_since(existing.loaded_at) < self.ttl {
                existing.last_used = instant_now;
                debug!(model = %model, "Lost load race, reusing cached handle");
                return Ok(Arc::clone(&existing.handle));
            }
            entries.remove(&model);
        }

        if entries.len() >= self.capacity {
            evict_least_recent(&mut entries);
        }
        entries.insert(
            model,
            CachedHandle {
                handle: Arc::clone(&handle),
                loaded_at: instant_now,
                last_used: instant_now,
            },
        );

        Ok(handle)
    }

    /// Drop every cached handle. Weight files on disk are unaffected.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            info!(dropped, "Model cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Snapshot of cached handles for reporting.
    pub fn loaded_models(&self) -> Vec<CachedModelInfo> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        let mut infos: Vec<CachedModelInfo> = entries
            .iter()
            .map(|(model, entry)| CachedModelInfo {
                model: *model,
                age_secs: now.duration_since(entry.loaded_at).as_secs(),
                idle_secs: now.duration_since(entry.last_used).as_secs(),
            })
            .collect();
        infos.sort_by_key(|info| info.idle_secs);
        infos
    }
}

fn evict_least_recent(entries: &mut HashMap<ModelSize, CachedHandle>) {
    if let Some(victim) = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(model, _)| *model)
    {
        info!(model = %victim, "Evicting least recently used model handle");
        entries.remove(&victim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::maintenance::clock::MaintenanceStore;
    use crate::maintenance::inventory::StoragePaths;
    use crate::transcription::model::TranscriptionOutput;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubEngine;

    impl Transcriber for StubEngine {
        fn transcribe(
            &self,
            _audio: &Path,
            _language: Option<&str>,
        ) -> Result<TranscriptionOutput> {
            Ok(TranscriptionOutput {
                text: String::new(),
                segments: Vec::new(),
                language: "en".to_string(),
            })
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
            }
        }

        fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, _model: ModelSize, _cache_dir: &Path) -> Result<Arc<dyn Transcriber>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubEngine))
        }
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self, _model: ModelSize, _cache_dir: &Path) -> Result<Arc<dyn Transcriber>> {
            Err(anyhow::anyhow!("download failed"))
        }
    }

    fn reclaimer_in(dir: &TempDir) -> Reclaimer {
        let paths = StoragePaths {
            output_dir: dir.path().to_path_buf(),
            cache_dir: dir.path().join("whisper_cache"),
            temp_dir: dir.path().join("tmp"),
        };
        let store = MaintenanceStore::new(dir.path().join(".last_cleanup"));
        Reclaimer::new(
            store,
            paths,
            RetentionConfig {
                cycle_interval_hours: 24,
                artifact_max_age_hours: 24,
                temp_max_age_minutes: 60,
                max_retained_models: 2,
            },
        )
    }

    fn cache_with(loader: Arc<dyn ModelLoader>, dir: &TempDir) -> ModelCache {
        ModelCache::new(
            &CacheConfig {
                capacity: 2,
                ttl_secs: 3600,
            },
            loader,
            dir.path().join("whisper_cache"),
        )
    }

    #[test]
    fn test_hit_does_not_reload() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let cache = cache_with(loader.clone(), &dir);
        let reclaimer = reclaimer_in(&dir);

        cache.get(ModelSize::Base, &reclaimer).unwrap();
        cache.get(ModelSize::Base, &reclaimer).unwrap();
        assert_eq!(loader.load_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_handle_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let cache = cache_with(loader.clone(), &dir);
        let reclaimer = reclaimer_in(&dir);

        let t0 = Instant::now();
        cache
            .get_at(ModelSize::Base, &reclaimer, t0, Utc::now())
            .unwrap();

        // Just inside the TTL: still a hit
        let almost = t0 + Duration::from_secs(3599);
        cache
            .get_at(ModelSize::Base, &reclaimer, almost, Utc::now())
            .unwrap();
        assert_eq!(loader.load_count(), 1);

        // At the TTL boundary: treated as absent, reloaded
        let expired = t0 + Duration::from_secs(3600);
        cache
            .get_at(ModelSize::Base, &reclaimer, expired, Utc::now())
            .unwrap();
        assert_eq!(loader.load_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let cache = cache_with(loader.clone(), &dir);
        let reclaimer = reclaimer_in(&dir);
        let t0 = Instant::now();

        cache
            .get_at(ModelSize::Tiny, &reclaimer, t0, Utc::now())
            .unwrap();
        cache
            .get_at(ModelSize::Base, &reclaimer, t0 + Duration::from_secs(1), Utc::now())
            .unwrap();

        // Touch tiny so base becomes the LRU entry
        cache
            .get_at(ModelSize::Tiny, &reclaimer, t0 + Duration::from_secs(2), Utc::now())
            .unwrap();

        cache
            .get_at(ModelSize::Small, &reclaimer, t0 + Duration::from_secs(3), Utc::now())
            .unwrap();
        assert_eq!(cache.len(), 2);

        // tiny survived; base must reload
        cache
            .get_at(ModelSize::Tiny, &reclaimer, t0 + Duration::from_secs(4), Utc::now())
            .unwrap();
        assert_eq!(loader.load_count(), 3);
        cache
            .get_at(ModelSize::Base, &reclaimer, t0 + Duration::from_secs(5), Utc::now())
            .unwrap();
        assert_eq!(loader.load_count(), 4);
    }

    #[test]
    fn test_failed_load_leaves_no_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(Arc::new(FailingLoader), &dir);
        let reclaimer = reclaimer_in(&dir);

        assert!(cache.get(ModelSize::Base, &reclaimer).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_triggers_due_maintenance() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let cache = cache_with(loader, &dir);
        let reclaimer = reclaimer_in(&dir);

        std::fs::write(dir.path().join("old_transcricao.txt"), "stale").unwrap();

        // No record on disk yet, so the first miss runs a cycle; evaluated
        // 25h in the future the artifact has aged out.
        let later = Utc::now() + chrono::Duration::hours(25);
        cache
            .get_at(ModelSize::Base, &reclaimer, Instant::now(), later)
            .unwrap();

        assert!(!dir.path().join("old_transcricao.txt").exists());
    }

    #[test]
    fn test_hit_served_while_load_in_flight() {
        use std::sync::mpsc;
        use std::thread;

        // Blocks loads of Small until released; other models load instantly.
        struct GatedLoader {
            started: Mutex<mpsc::Sender<()>>,
            gate: Mutex<mpsc::Receiver<()>>,
        }

        impl ModelLoader for GatedLoader {
            fn load(&self, model: ModelSize, _cache_dir: &Path) -> Result<Arc<dyn Transcriber>> {
                if model == ModelSize::Small {
                    self.started.lock().unwrap().send(()).unwrap();
                    self.gate.lock().unwrap().recv().unwrap();
                }
                Ok(Arc::new(StubEngine))
            }
        }

        let dir = TempDir::new().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let loader = Arc::new(GatedLoader {
            started: Mutex::new(started_tx),
            gate: Mutex::new(release_rx),
        });
        let cache = Arc::new(cache_with(loader, &dir));
        let reclaimer = reclaimer_in(&dir);
        reclaimer.store().record_run(Utc::now()).unwrap();

        cache.get(ModelSize::Base, &reclaimer).unwrap();

        let slow_cache = Arc::clone(&cache);
        let slow_reclaimer = reclaimer.clone();
        let slow = thread::spawn(move || {
            slow_cache.get(ModelSize::Small, &slow_reclaimer).unwrap();
        });
        started_rx.recv().unwrap();

        // The already-cached model must answer while the download is stuck
        let hit_cache = Arc::clone(&cache);
        let hit_reclaimer = reclaimer.clone();
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            hit_cache.get(ModelSize::Base, &hit_reclaimer).unwrap();
            done_tx.send(()).unwrap();
        });
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("cache hit waited on an in-flight load");

        release_tx.send(()).unwrap();
        slow.join().unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_drops_handles() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let cache = cache_with(loader.clone(), &dir);
        let reclaimer = reclaimer_in(&dir);

        cache.get(ModelSize::Base, &reclaimer).unwrap();
        cache.clear();
        assert!(cache.is_empty());

        cache.get(ModelSize::Base, &reclaimer).unwrap();
        assert_eq!(loader.load_count(), 2);
    }
}
