//! # Retention Policy
//!
//! Pure decision logic: given an inventory snapshot and a clock reading,
//! compute the set of items to delete. No I/O happens here; the output is
//! a `DeletionPlan` the reclaimer executes later.
//!
//! ## Rules (applied independently; the plan is their union):
//! - **Artifact rule**: any artifact at least `artifact_max_age_hours` old
//! - **Model rule**: every weight file beyond the `max_retained_models`
//!   most recently accessed, ties broken deterministically by model id
//! - **Temp rule**: any scratch file at least `temp_max_age_minutes` old
//!   (a much shorter window than the artifact rule, and independent of the
//!   24h clock gate when invoked directly)

use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use crate::config::RetentionConfig;
use crate::maintenance::inventory::Inventory;

/// What kind of item a planned deletion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Artifact,
    ModelWeights,
    TempFile,
}

/// Why an item was selected, carried through for diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum DeletionReason {
    /// Artifact older than the retention window
    ArtifactExpired { age_hours: i64 },

    /// Model weight file ranked beyond the retained set
    /// (rank 0 is the most recently accessed entry)
    ModelOverCapacity { rank: usize },

    /// Scratch file older than the staleness window
    TempStale { age_minutes: i64 },
}

/// A single item selected for removal.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlannedDeletion {
    pub kind: ItemKind,
    pub path: PathBuf,
    pub reason: DeletionReason,
}

/// The full set of items selected in one cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DeletionPlan {
    pub items: Vec<PlannedDeletion>,
}

impl DeletionPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Compute the deletion plan for one maintenance cycle.
///
/// Deterministic: the same inventory and `now` always produce the same
/// plan, regardless of inventory ordering, because each rule sorts its
/// candidates before selecting.
pub fn compute_deletions(
    inventory: &Inventory,
    now: DateTime<Utc>,
    retention: &RetentionConfig,
) -> DeletionPlan {
    let mut items = Vec::new();
    items.extend(expired_artifacts(inventory, now, retention));
    items.extend(models_over_capacity(inventory, retention));
    items.extend(stale_temp_files(inventory, now, retention));
    DeletionPlan { items }
}

/// The artifact rule in isolation.
fn expired_artifacts(
    inventory: &Inventory,
    now: DateTime<Utc>,
    retention: &RetentionConfig,
) -> Vec<PlannedDeletion> {
    let window = Duration::hours(retention.artifact_max_age_hours);
    let mut expired: Vec<PlannedDeletion> = inventory
        .artifacts
        .iter()
        .filter_map(|artifact| {
            let age = now.signed_duration_since(artifact.created_at);
            if age >= window {
                Some(PlannedDeletion {
                    kind: ItemKind::Artifact,
                    path: artifact.path.clone(),
                    reason: DeletionReason::ArtifactExpired {
                        age_hours: age.num_hours(),
                    },
                })
            } else {
                None
            }
        })
        .collect();
    expired.sort_by(|a, b| a.path.cmp(&b.path));
    expired
}

/// The model rule in isolation: keep the `max_retained_models` most
/// recently accessed entries, drop the rest.
fn models_over_capacity(
    inventory: &Inventory,
    retention: &RetentionConfig,
) -> Vec<PlannedDeletion> {
    let mut ranked = inventory.models.clone();
    // Most recent first; ties fall back to the id so the plan is stable
    ranked.sort_by(|a, b| {
        b.last_accessed_at
            .cmp(&a.last_accessed_at)
            .then_with(|| a.model_id.cmp(&b.model_id))
    });

    ranked
        .into_iter()
        .enumerate()
        .skip(retention.max_retained_models)
        .map(|(rank, entry)| PlannedDeletion {
            kind: ItemKind::ModelWeights,
            path: entry.path,
            reason: DeletionReason::ModelOverCapacity { rank },
        })
        .collect()
}

/// The temp rule in isolation.
fn stale_temp_files(
    inventory: &Inventory,
    now: DateTime<Utc>,
    retention: &RetentionConfig,
) -> Vec<PlannedDeletion> {
    let window = Duration::minutes(retention.temp_max_age_minutes);
    let mut stale: Vec<PlannedDeletion> = inventory
        .temp_files
        .iter()
        .filter_map(|temp| {
            let age = now.signed_duration_since(temp.created_at);
            if age >= window {
                Some(PlannedDeletion {
                    kind: ItemKind::TempFile,
                    path: temp.path.clone(),
                    reason: DeletionReason::TempStale {
                        age_minutes: age.num_minutes(),
                    },
                })
            } else {
                None
            }
        })
        .collect();
    stale.sort_by(|a, b| a.path.cmp(&b.path));
    stale
}

/// A plan covering every item in the inventory regardless of age or rank.
/// Used by the "reset everything" action; the kind/reason annotations are
/// reused so the reclaimer and its diagnostics work unchanged.
pub fn full_wipe(inventory: &Inventory) -> DeletionPlan {
    let mut items = Vec::new();

    for artifact in &inventory.artifacts {
        items.push(PlannedDeletion {
            kind: ItemKind::Artifact,
            path: artifact.path.clone(),
            reason: DeletionReason::ArtifactExpired { age_hours: 0 },
        });
    }
    for (rank, model) in inventory.models.iter().enumerate() {
        items.push(PlannedDeletion {
            kind: ItemKind::ModelWeights,
            path: model.path.clone(),
            reason: DeletionReason::ModelOverCapacity { rank },
        });
    }
    for temp in &inventory.temp_files {
        items.push(PlannedDeletion {
            kind: ItemKind::TempFile,
            path: temp.path.clone(),
            reason: DeletionReason::TempStale { age_minutes: 0 },
        });
    }

    DeletionPlan { items }
}
