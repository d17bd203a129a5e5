//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    Account, AddressEntry, AddressId, Attachment, Email, EmailAddress, EmailId, Folder,
    FolderFlags, Thread, ThreadId, ThreadUpsert,
};

/// Filter for thread listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    /// Only threads whose folder flag for this folder is set
    pub folder: Option<Folder>,
    /// Only threads with this `done` value
    pub done: Option<bool>,
}

/// Trait for mailbox storage operations
///
/// Every method is atomic with respect to the others: the address
/// find-or-create, thread upsert, and folder recomputation each run under a
/// single lock or transaction. Reconciliation relies on that when it runs
/// with more than one message in flight.
pub trait MailStore: Send + Sync {
    // === Accounts ===

    /// Insert or replace an account row
    ///
    /// The sync lease is left as stored; only the lease methods change it.
    fn upsert_account(&self, account: Account) -> Result<()>;

    fn get_account(&self, account_id: &str) -> Result<Option<Account>>;

    /// Get an account only if it belongs to `user_id`
    fn find_account_for_user(&self, account_id: &str, user_id: &str) -> Result<Option<Account>>;

    /// Persist a confirmed delta cursor and stamp `last_sync_at`
    fn save_delta_token(&self, account_id: &str, delta_token: &str) -> Result<()>;

    /// Take the account's sync lease
    ///
    /// Succeeds when no lease is held or the held one is older than `ttl`.
    /// Returns false when another run holds a live lease.
    fn try_acquire_sync_lease(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<bool>;

    fn release_sync_lease(&self, account_id: &str) -> Result<()>;

    // === Addresses ===

    /// Return the (account, address) row, creating it if absent
    ///
    /// An existing row is returned unchanged.
    fn find_or_create_address(&self, account_id: &str, entry: &AddressEntry)
    -> Result<EmailAddress>;

    fn get_address(&self, id: AddressId) -> Result<Option<EmailAddress>>;

    fn count_addresses(&self, account_id: &str) -> Result<usize>;

    // === Threads ===

    /// Create or merge a thread via [`ThreadUpsert::apply`]; returns the stored row
    fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread>;

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>>;

    /// Re-derive a thread's folder flags from all of its stored emails
    fn recompute_thread_folders(&self, id: &ThreadId) -> Result<FolderFlags>;

    /// Set the user-controlled `done` flag; returns false if the thread is unknown
    fn set_thread_done(&self, id: &ThreadId, done: bool) -> Result<bool>;

    /// List an account's threads, newest `last_message_date` first
    fn list_threads(
        &self,
        account_id: &str,
        filter: &ThreadFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>>;

    fn count_threads(&self, account_id: &str, filter: &ThreadFilter) -> Result<usize>;

    // === Emails ===

    /// Insert or update an email; recipient sets are replaced, not merged
    fn upsert_email(&self, email: Email) -> Result<()>;

    fn get_email(&self, id: &EmailId) -> Result<Option<Email>>;

    /// Emails of a thread, ordered by `received_at` ascending
    fn list_emails_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Email>>;

    fn count_emails(&self, account_id: &str) -> Result<usize>;

    // === Attachments ===

    /// Insert or update an attachment by its provider id
    fn upsert_attachment(&self, attachment: Attachment) -> Result<()>;

    fn list_attachments_for_email(&self, email_id: &EmailId) -> Result<Vec<Attachment>>;

    fn count_attachments(&self, account_id: &str) -> Result<usize>;
}
