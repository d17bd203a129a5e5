//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for synced mailbox rows.
//! The in-memory store backs tests; the SQLite store is used by the daemon.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::{MailStore, ThreadFilter};
