//! Per-account sync entry point

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::orchestrator::SyncOrchestrator;
use super::reconcile::Reconciler;
use super::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::error::SyncError;
use crate::remote::SyncProvider;
use crate::storage::MailStore;

/// Knobs for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Polling policy for the remote indexing job
    pub retry: RetryPolicy,
    /// Messages reconciled in parallel; 1 is strictly sequential
    pub reconcile_concurrency: usize,
    /// Age after which a held lease is treated as abandoned
    pub lease_ttl: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            reconcile_concurrency: 1,
            lease_ttl: Duration::from_secs(3600),
        }
    }
}

/// Inbound sync trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub account_id: String,
    pub user_id: String,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub account_id: String,
    /// Cursor persisted on the account
    pub delta_token: String,
    /// Started from a stored cursor rather than a full index
    pub resumed: bool,
    /// The stored cursor was rejected and a full index ran instead
    pub cursor_reset: bool,
    pub fetched: usize,
    pub rejected: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub attachments_stored: usize,
    pub attachments_failed: usize,
    pub duration_ms: u64,
}

/// Runs syncs for linked accounts, at most one at a time per account
pub struct SyncCoordinator {
    store: Arc<dyn MailStore>,
    provider: Arc<dyn SyncProvider>,
    sleeper: Arc<dyn Sleeper>,
    options: SyncOptions,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn MailStore>,
        provider: Arc<dyn SyncProvider>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            provider,
            sleeper: Arc::new(ThreadSleeper),
            options,
        }
    }

    /// Replace the sleeper used between indexing polls
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn store(&self) -> &dyn MailStore {
        self.store.as_ref()
    }

    /// Sync one account on behalf of its owner
    ///
    /// Fails fast with [`SyncError::SyncInProgress`] when another run holds
    /// the account's lease. The delta cursor is persisted as soon as the
    /// fetch phase completes; per-message failures during reconciliation are
    /// reported in the counts, not as an error.
    pub fn sync_account(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let account = self
            .store
            .find_account_for_user(&request.account_id, &request.user_id)?
            .ok_or_else(|| SyncError::Authorization {
                account_id: request.account_id.clone(),
            })?;

        let ttl = chrono::Duration::from_std(self.options.lease_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        if !self.store.try_acquire_sync_lease(&account.id, Utc::now(), ttl)? {
            return Err(SyncError::SyncInProgress {
                account_id: account.id,
            });
        }
        let _lease = LeaseGuard {
            store: self.store.as_ref(),
            account_id: &account.id,
        };

        info!(
            "Starting sync for account {} ({})",
            account.id,
            if account.next_delta_token.is_some() {
                "incremental"
            } else {
                "full"
            }
        );

        let orchestrator = SyncOrchestrator::new(
            self.provider.as_ref(),
            self.sleeper.as_ref(),
            self.options.retry.clone(),
        );
        let batch = orchestrator.run(&account.access_token, account.next_delta_token.as_deref())?;

        self.store.save_delta_token(&account.id, &batch.delta_token)?;
        info!("Persisted delta cursor for account {}", account.id);

        let reconciler = Reconciler::new(self.store.as_ref(), self.options.reconcile_concurrency);
        let stats = reconciler.reconcile(&account.id, &batch.emails);

        let report = SyncReport {
            account_id: account.id.clone(),
            delta_token: batch.delta_token,
            resumed: batch.stats.resumed,
            cursor_reset: batch.stats.cursor_reset,
            fetched: batch.emails.len(),
            rejected: batch.stats.rejected,
            ingested: stats.ingested,
            skipped: stats.skipped,
            attachments_stored: stats.attachments_stored,
            attachments_failed: stats.attachments_failed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Sync finished for account {}: {} fetched, {} ingested, {} skipped in {}ms",
            report.account_id, report.fetched, report.ingested, report.skipped, report.duration_ms
        );
        Ok(report)
    }
}

/// Releases the account lease when the run ends, whatever the outcome
struct LeaseGuard<'a> {
    store: &'a dyn MailStore,
    account_id: &'a str,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_sync_lease(self.account_id) {
            warn!(
                "Failed to release sync lease for account {}: {:#}",
                self.account_id, e
            );
        }
    }
}
