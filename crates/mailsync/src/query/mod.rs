//! Query API for mailbox views
//!
//! Read-side functions over a [`MailStore`](crate::storage::MailStore),
//! plus the one user-driven write: toggling a thread's `done` flag.

mod threads;

pub use threads::{
    EmailDetail, EmailSummary, TabCounts, ThreadDetail, ThreadSummary, count_threads,
    get_thread_detail, list_threads, set_thread_done, tab_counts,
};
