//! # Reconciler
//!
//! Core reconciliation logic for `GitOpsSet` resources.
//!
//! The reconciler:
//! - Runs every generator of the set
//! - Combines their outputs into parameter elements
//! - Renders every template once per element
//! - Creates, updates and prunes the resulting resources
//! - Records the inventory and Ready condition in the status
//!
//! ## Module Structure
//!
//! - `types.rs` - Shared context, errors and backoff state
//! - `inventory.rs` - Apply and prune against the previous inventory
//! - `status.rs` - Ready condition and status writes
//! - `reconcile.rs` - The reconcile entry point

pub mod inventory;
pub mod reconcile;
pub mod status;
pub mod types;

// Re-export public API
pub use inventory::{is_subset, sync_inventory, SyncOutcome};
pub use reconcile::{reconcile, render_gitopsset, run_pass};
pub use types::{resource_key, BackoffState, Reconciler, ReconcilerError};
