//! Mailsync crate - mailbox delta sync engine
//!
//! This crate provides:
//! - Domain models (Account, Thread, Email, EmailAddress, Attachment)
//! - A client for the provider's token-based delta sync API
//! - The fetch state machine and the reconciliation engine
//! - A per-account sync coordinator with a mutual-exclusion lease
//! - Storage trait abstractions with in-memory and SQLite backends
//! - Query API for mailbox views
//!
//! All I/O is blocking; callers choose their own threading.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod remote;
pub mod storage;
pub mod sync;

pub use api::{ApiResponse, handle_sync_request};
pub use crate::config::{IndexingSettings, SyncSettings};
pub use error::{AttachmentIngestError, RecordIngestError, SyncError, TransportError};
pub use models::{
    Account, AddressEntry, AddressId, Attachment, Email, EmailAddress, EmailId, Folder,
    FolderFlags, Recipients, RemoteAttachment, RemoteMessage, Thread, ThreadId,
};
pub use query::{ThreadDetail, ThreadSummary, get_thread_detail, list_threads, set_thread_done};
pub use remote::{AurinkoClient, ClientOptions, FetchCursor, IndexingStatus, SyncProvider, UpdatesPage};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore, ThreadFilter};
pub use sync::{
    ReconcileStats, Reconciler, RetryPolicy, Sleeper, SyncBatch, SyncCoordinator, SyncOptions,
    SyncOrchestrator, SyncReport, SyncRequest, ThreadSleeper,
};
