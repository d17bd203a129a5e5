//! Fetch phase of a sync run
//!
//! Drives the provider through `INDEXING -> DELTA_FETCH -> PAGING -> DONE`
//! and returns every record seen together with the delta cursor to persist.
//! Nothing is written to storage here.

use std::time::Instant;

use log::{debug, info, warn};

use super::retry::{RetryPolicy, Sleeper};
use crate::error::{SyncError, TransportError};
use crate::models::RemoteMessage;
use crate::remote::{FetchCursor, SyncProvider, UpdatesPage};

/// Statistics from the fetch phase
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStats {
    /// `start_indexing` calls made (0 for a resumed run)
    pub indexing_attempts: u32,
    /// `fetch_updates` calls made, confirmation included
    pub fetch_calls: usize,
    /// Records dropped by validation
    pub rejected: usize,
    /// Whether the run started from a stored delta cursor
    pub resumed: bool,
    /// Whether a stored cursor was rejected and a full index was run instead
    pub cursor_reset: bool,
}

/// Everything a completed fetch phase hands to the coordinator
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub emails: Vec<RemoteMessage>,
    /// Delta cursor to persist; never a page token
    pub delta_token: String,
    pub stats: FetchStats,
}

enum Phase {
    Indexing,
    DeltaFetch,
    Paging(String),
    Done,
}

/// Runs the fetch state machine against a [`SyncProvider`]
pub struct SyncOrchestrator<'a> {
    provider: &'a dyn SyncProvider,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(provider: &'a dyn SyncProvider, sleeper: &'a dyn Sleeper, retry: RetryPolicy) -> Self {
        Self {
            provider,
            sleeper,
            retry,
        }
    }

    /// Fetch everything new since `resume`, or the full history when `None`
    ///
    /// A stored cursor that the provider rejects as expired triggers one full
    /// indexing pass. Any other transport error aborts the run and the
    /// records gathered so far are dropped.
    pub fn run(&self, credential: &str, resume: Option<&str>) -> Result<SyncBatch, SyncError> {
        let mut stats = FetchStats {
            resumed: resume.is_some(),
            ..FetchStats::default()
        };
        let mut emails: Vec<RemoteMessage> = Vec::new();
        let mut delta_token = resume.map(str::to_string);

        let mut phase = match resume {
            Some(_) => Phase::DeltaFetch,
            None => Phase::Indexing,
        };

        loop {
            phase = match phase {
                Phase::Indexing => {
                    delta_token = Some(self.wait_for_index(credential, &mut stats)?);
                    Phase::DeltaFetch
                }

                Phase::DeltaFetch => {
                    let token = delta_token.clone().ok_or(SyncError::MissingDeltaToken)?;
                    stats.fetch_calls += 1;
                    match self
                        .provider
                        .fetch_updates(credential, &FetchCursor::Delta(token))
                    {
                        Err(TransportError::CursorExpired { status })
                            if stats.resumed && !stats.cursor_reset =>
                        {
                            warn!(
                                "Stored delta cursor rejected (HTTP {}), running full index",
                                status
                            );
                            stats.cursor_reset = true;
                            emails.clear();
                            Phase::Indexing
                        }
                        Err(e) => return Err(e.into()),
                        Ok(page) => {
                            let next = absorb(page, &mut emails, &mut delta_token, &mut stats);
                            next.map_or(Phase::Done, Phase::Paging)
                        }
                    }
                }

                Phase::Paging(page_token) => {
                    stats.fetch_calls += 1;
                    let page = self
                        .provider
                        .fetch_updates(credential, &FetchCursor::Page(page_token))?;
                    let next = absorb(page, &mut emails, &mut delta_token, &mut stats);
                    next.map_or(Phase::Done, Phase::Paging)
                }

                Phase::Done => {
                    let token = delta_token.ok_or(SyncError::MissingDeltaToken)?;
                    let delta_token = self.confirm(credential, token, &mut stats)?;
                    info!(
                        "Fetch complete: {} records over {} calls ({} rejected)",
                        emails.len(),
                        stats.fetch_calls,
                        stats.rejected
                    );
                    return Ok(SyncBatch {
                        emails,
                        delta_token,
                        stats,
                    });
                }
            };
        }
    }

    /// Poll `start_indexing` until ready, sleeping `interval` between polls
    fn wait_for_index(&self, credential: &str, stats: &mut FetchStats) -> Result<String, SyncError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            stats.indexing_attempts += 1;
            let status = self.provider.start_indexing(credential)?;

            if status.ready {
                info!("Remote index ready after {} attempt(s)", attempts);
                return status.delta_token.ok_or(SyncError::MissingDeltaToken);
            }

            if !self.retry.allows_retry(attempts, started.elapsed()) {
                return Err(SyncError::IndexingTimedOut { attempts });
            }
            debug!("Remote index not ready, retrying in {:?}", self.retry.interval);
            self.sleeper.sleep(self.retry.interval);
        }
    }

    /// Read the adopted cursor once more so the provider commits it
    ///
    /// A token handed back here wins only when the read came back empty,
    /// with nothing to ingest and no page token. Otherwise the run keeps
    /// the cursor it already adopted. Those records are not part of this
    /// batch, and taking the newer token would step past them for good; the
    /// next run reads them again from the kept cursor.
    fn confirm(
        &self,
        credential: &str,
        token: String,
        stats: &mut FetchStats,
    ) -> Result<String, SyncError> {
        stats.fetch_calls += 1;
        let page = self
            .provider
            .fetch_updates(credential, &FetchCursor::Delta(token.clone()))?;

        let quiet = page.records.is_empty() && page.rejected == 0 && page.next_page_token.is_none();
        match page.next_delta_token {
            Some(next) if quiet => Ok(next),
            _ => {
                if !quiet {
                    debug!(
                        "Confirmation read returned {} new records; keeping cursor",
                        page.records.len() + page.rejected
                    );
                }
                Ok(token)
            }
        }
    }
}

/// Append a page's records and adopt its delta token; returns the next page token
fn absorb(
    page: UpdatesPage,
    emails: &mut Vec<RemoteMessage>,
    delta_token: &mut Option<String>,
    stats: &mut FetchStats,
) -> Option<String> {
    debug!(
        "Page: {} records, next page {}, next delta {}",
        page.records.len(),
        page.next_page_token.is_some(),
        page.next_delta_token.is_some()
    );
    stats.rejected += page.rejected;
    emails.extend(page.records);
    if let Some(next) = page.next_delta_token {
        *delta_token = Some(next);
    }
    page.next_page_token
}
