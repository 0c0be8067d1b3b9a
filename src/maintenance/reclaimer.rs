//! # Reclaimer
//!
//! Executes deletion plans and owns the maintenance cycle composition:
//! clock gate → inventory scan → retention policy → apply → timestamp.
//!
//! ## Failure Posture:
//! Every deletion is attempted independently. A path that disappeared since
//! the scan counts as success (another trigger may have raced us); any
//! other per-item error lands in the failure ledger and the loop keeps
//! going. A single locked file must never block the rest of the cycle or
//! re-arm the next 24h wait, so the timestamp is written even when some
//! items could not be removed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::maintenance::clock::MaintenanceStore;
use crate::maintenance::inventory::StoragePaths;
use crate::maintenance::policy::{self, DeletionPlan};

/// One deletion that could not be carried out.
#[derive(Debug, Clone, Serialize)]
pub struct ReclaimFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of applying one plan: how many items were actually removed and
/// which ones failed. `removed` may be less than the plan length.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclaimSummary {
    pub removed: usize,
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimSummary {
    fn merge(&mut self, other: ReclaimSummary) {
        self.removed += other.removed;
        self.failures.extend(other.failures);
    }
}

/// Composes the clock gate, inventory scan, retention policy, and plan
/// execution. One instance is shared across all request handlers; the
/// record path and directories are injected at construction so tests run
/// against isolated temp trees.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    store: MaintenanceStore,
    paths: StoragePaths,
    retention: RetentionConfig,
}

impl Reclaimer {
    pub fn new(store: MaintenanceStore, paths: StoragePaths, retention: RetentionConfig) -> Self {
        Self {
            store,
            paths,
            retention,
        }
    }

    pub fn store(&self) -> &MaintenanceStore {
        &self.store
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::hours(self.retention.cycle_interval_hours)
    }

    /// Execute every deletion in the plan, best-effort.
    pub fn apply(&self, plan: &DeletionPlan) -> ReclaimSummary {
        let mut summary = ReclaimSummary::default();

        for item in &plan.items {
            // Re-check existence right before deleting: a concurrent cycle
            // may already have removed this path, and that is success.
            if !item.path.exists() {
                debug!(path = %item.path.display(), "Planned item already gone");
                continue;
            }

            match fs::remove_file(&item.path) {
                Ok(()) => {
                    debug!(path = %item.path.display(), kind = ?item.kind, "Removed");
                    summary.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %item.path.display(), "Lost deletion race, treating as removed elsewhere");
                }
                Err(e) => {
                    warn!(path = %item.path.display(), error = %e, "Failed to remove planned item");
                    summary.failures.push(ReclaimFailure {
                        path: item.path.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary
    }

    /// Run one full maintenance cycle if the clock gate says one is due.
    ///
    /// Infallible by design: scan problems shrink the inventory, deletion
    /// problems land in the failure ledger, and a record-write problem is
    /// logged without undoing the cycle. Returns `None` when the gate
    /// holds, so callers can tell a skipped cycle from one that ran and
    /// removed nothing.
    pub fn run_if_due(&self, now: DateTime<Utc>) -> Option<ReclaimSummary> {
        if !self.store.is_cycle_due(now, self.cycle_interval()) {
            debug!("Maintenance cycle not due yet");
            return None;
        }

        let inventory = self.paths.scan();
        let plan = policy::compute_deletions(&inventory, now, &self.retention);
        info!(
            planned = plan.len(),
            artifacts = inventory.artifacts.len(),
            models = inventory.models.len(),
            temp_files = inventory.temp_files.len(),
            "Running maintenance cycle"
        );

        Some(self.execute_cycle(now, &plan))
    }

    /// Apply a cycle's plan and re-arm the gate. The timestamp is written
    /// even when some items could not be removed.
    fn execute_cycle(&self, now: DateTime<Utc>, plan: &DeletionPlan) -> ReclaimSummary {
        let summary = self.apply(plan);

        if let Err(e) = self.store.record_run(now) {
            warn!(error = %e, "Cycle completed but the maintenance record could not be written");
        }

        info!(
            removed = summary.removed,
            failed = summary.failures.len(),
            "Maintenance cycle complete"
        );
        summary
    }

    /// Remove stale scratch files only. The temp rule is intentionally not
    /// gated by the 24h clock, so callers may invoke this between cycles.
    pub fn sweep_temp_files(&self, now: DateTime<Utc>) -> ReclaimSummary {
        let inventory = self.paths.scan();
        let full = policy::compute_deletions(&inventory, now, &self.retention);
        let plan = DeletionPlan {
            items: full
                .items
                .into_iter()
                .filter(|item| item.kind == policy::ItemKind::TempFile)
                .collect(),
        };
        self.apply(&plan)
    }

    /// "Reset everything": delete every artifact, weight file, and scratch
    /// file regardless of age, then run the clock-gated cycle bookkeeping
    /// so the next scheduled pass starts from a clean slate.
    pub fn wipe_all(&self, now: DateTime<Utc>) -> ReclaimSummary {
        let mut summary = self.run_if_due(now).unwrap_or_default();

        let inventory = self.paths.scan();
        let plan = policy::full_wipe(&inventory);
        info!(planned = plan.len(), "Applying full wipe");
        summary.merge(self.apply(&plan));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::policy::{DeletionReason, ItemKind, PlannedDeletion};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn retention() -> RetentionConfig {
        RetentionConfig {
            cycle_interval_hours: 24,
            artifact_max_age_hours: 24,
            temp_max_age_minutes: 60,
            max_retained_models: 2,
        }
    }

    fn reclaimer_in(dir: &TempDir) -> Reclaimer {
        let paths = StoragePaths {
            output_dir: dir.path().to_path_buf(),
            cache_dir: dir.path().join("whisper_cache"),
            temp_dir: dir.path().join("tmp"),
        };
        let store = MaintenanceStore::new(dir.path().join(".last_cleanup"));
        Reclaimer::new(store, paths, retention())
    }

    fn plan_for(paths: &[PathBuf]) -> DeletionPlan {
        DeletionPlan {
            items: paths
                .iter()
                .map(|path| PlannedDeletion {
                    kind: ItemKind::Artifact,
                    path: path.clone(),
                    reason: DeletionReason::ArtifactExpired { age_hours: 25 },
                })
                .collect(),
        }
    }

    #[test]
    fn test_apply_removes_and_counts() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);

        let a = dir.path().join("a_transcricao.txt");
        let b = dir.path().join("b_legendas.srt");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "y").unwrap();

        let summary = reclaimer.apply(&plan_for(&[a.clone(), b.clone()]));
        assert_eq!(summary.removed, 2);
        assert!(summary.failures.is_empty());
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);

        let a = dir.path().join("a_transcricao.txt");
        fs::write(&a, "x").unwrap();
        let plan = plan_for(&[a]);

        let first = reclaimer.apply(&plan);
        assert_eq!(first.removed, 1);

        // Same plan again: nothing removed, nothing failed
        let second = reclaimer.apply(&plan);
        assert_eq!(second.removed, 0);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn test_apply_tolerates_missing_paths() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);

        let ghost = dir.path().join("never_existed_transcricao.txt");
        let summary = reclaimer.apply(&plan_for(&[ghost]));
        assert_eq!(summary.removed, 0);
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_run_if_due_holds_when_gate_closed() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);
        let now = Utc::now();

        reclaimer.store().record_run(now).unwrap();
        let artifact = dir.path().join("talk_transcricao.txt");
        fs::write(&artifact, "keep").unwrap();

        assert!(reclaimer.run_if_due(now + Duration::hours(1)).is_none());
        assert!(artifact.exists());
    }

    #[test]
    fn test_run_if_due_full_cycle() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);

        // Files written now, cycle evaluated 25h in the future: both the
        // artifact and the scratch file have aged past their windows, and
        // the third model falls out of the retained set.
        fs::create_dir_all(reclaimer.paths().cache_dir.clone()).unwrap();
        fs::create_dir_all(reclaimer.paths().temp_dir.clone()).unwrap();
        fs::write(dir.path().join("talk_transcricao.txt"), "old").unwrap();
        fs::write(reclaimer.paths().temp_dir.join("scribe-x.wav"), "pcm").unwrap();
        fs::write(reclaimer.paths().cache_dir.join("base.bin"), "w").unwrap();
        fs::write(reclaimer.paths().cache_dir.join("medium.bin"), "w").unwrap();
        fs::write(reclaimer.paths().cache_dir.join("tiny.bin"), "w").unwrap();

        let later = Utc::now() + Duration::hours(25);
        let summary = reclaimer.run_if_due(later).unwrap();

        // artifact + temp + one model beyond capacity
        assert_eq!(summary.removed, 3);
        assert!(summary.failures.is_empty());
        assert!(!dir.path().join("talk_transcricao.txt").exists());
        assert!(!reclaimer.paths().temp_dir.join("scribe-x.wav").exists());

        let surviving: Vec<_> = reclaimer.paths().list_models();
        assert_eq!(surviving.len(), 2);

        // The cycle re-armed the gate
        assert!(!reclaimer
            .store()
            .is_cycle_due(later, reclaimer.cycle_interval()));
        assert!(reclaimer
            .store()
            .is_cycle_due(later + Duration::hours(24), reclaimer.cycle_interval()));
    }

    #[test]
    fn test_cycle_rearms_despite_failed_deletions() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);
        let now = Utc::now();

        // remove_file cannot delete a directory, so this item fails while
        // the other two succeed.
        let blocked = dir.path().join("blocked_transcricao.txt");
        fs::create_dir(&blocked).unwrap();
        let a = dir.path().join("a_transcricao.txt");
        let b = dir.path().join("b_legendas.srt");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "y").unwrap();

        let summary = reclaimer.execute_cycle(now, &plan_for(&[blocked.clone(), a.clone(), b.clone()]));

        assert_eq!(summary.removed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.contains("blocked_transcricao.txt"));
        assert!(!summary.failures[0].error.is_empty());
        assert!(blocked.exists());
        assert!(!a.exists());

        // The failed item does not hold the gate open: the timestamp was
        // recorded and the next cycle waits the full interval.
        assert!(!reclaimer
            .store()
            .is_cycle_due(now, reclaimer.cycle_interval()));
        assert!(reclaimer
            .store()
            .is_cycle_due(now + Duration::hours(24), reclaimer.cycle_interval()));
    }

    #[test]
    fn test_sweep_temp_files_ignores_gate() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);
        let now = Utc::now();

        // Gate just re-armed; a direct temp sweep must still work
        reclaimer.store().record_run(now).unwrap();

        fs::create_dir_all(reclaimer.paths().temp_dir.clone()).unwrap();
        fs::write(reclaimer.paths().temp_dir.join("scribe-x.wav"), "pcm").unwrap();
        fs::write(dir.path().join("talk_transcricao.txt"), "artifact").unwrap();

        let summary = reclaimer.sweep_temp_files(now + Duration::hours(2));
        assert_eq!(summary.removed, 1);
        // Artifacts are untouched by the temp sweep
        assert!(dir.path().join("talk_transcricao.txt").exists());
    }

    #[test]
    fn test_wipe_all_removes_everything() {
        let dir = TempDir::new().unwrap();
        let reclaimer = reclaimer_in(&dir);

        fs::create_dir_all(reclaimer.paths().cache_dir.clone()).unwrap();
        fs::create_dir_all(reclaimer.paths().temp_dir.clone()).unwrap();
        fs::write(dir.path().join("new_transcricao.txt"), "fresh").unwrap();
        fs::write(reclaimer.paths().cache_dir.join("base.bin"), "w").unwrap();
        fs::write(reclaimer.paths().temp_dir.join("scribe-x.wav"), "pcm").unwrap();

        // Everything is brand new, yet the wipe removes it all
        let summary = reclaimer.wipe_all(Utc::now());
        assert_eq!(summary.removed, 3);
        assert!(reclaimer.paths().list_models().is_empty());
        assert!(!dir.path().join("new_transcricao.txt").exists());
    }
}
