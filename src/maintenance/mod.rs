//! # Maintenance Module
//!
//! The artifact & model-cache lifecycle manager. Decides what persistent
//! state (downloaded model weights, generated transcripts/subtitles, upload
//! scratch files) is allowed to exist at any time and reclaims the rest on
//! a 24h cadence plus on explicit user action.
//!
//! ## Key Components:
//! - **Clock Gate** (`clock`): persisted-timestamp gate deciding whether a
//!   cycle is due; a missing or corrupt record fails open toward cleaning
//! - **Inventory** (`inventory`): read-only enumeration of artifacts, model
//!   weight files, and scratch files, plus the reporting surface
//! - **Retention Policy** (`policy`): pure decision logic turning an
//!   inventory snapshot and a clock reading into a `DeletionPlan`
//! - **Reclaimer** (`reclaimer`): best-effort execution of a plan, with a
//!   per-item failure ledger and the timestamp re-arm
//!
//! ## Design Invariants:
//! - The on-disk model set after any cycle has at most
//!   `max_retained_models` entries, chosen by most recent access
//! - Deleting an already-deleted path is success, never an error, so
//!   concurrent manual and scheduled triggers can race safely
//! - No operation here returns a fatal error; every internal failure
//!   degrades to "skip this item, continue" so the cycle always completes
//!   and always re-arms the timer

pub mod clock;
pub mod inventory;
pub mod policy;
pub mod reclaimer;

pub use clock::MaintenanceStore;
pub use inventory::{Inventory, StoragePaths};
pub use policy::{compute_deletions, DeletionPlan};
pub use reclaimer::{Reclaimer, ReclaimSummary};
