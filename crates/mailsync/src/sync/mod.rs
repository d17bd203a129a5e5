//! Sync engine for fetching and storing mail
//!
//! A run has two phases. The orchestrator fetches everything new from the
//! provider, then the reconciler merges it into storage. The coordinator
//! wraps both in a per-account lease. Every step is an upsert, so a failed
//! run can simply be retried.

mod coordinator;
mod orchestrator;
mod reconcile;
mod retry;

pub use coordinator::{SyncCoordinator, SyncOptions, SyncReport, SyncRequest};
pub use orchestrator::{FetchStats, SyncBatch, SyncOrchestrator};
pub use reconcile::{MessageOutcome, ReconcileStats, Reconciler};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
