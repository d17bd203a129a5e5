//! Remote sync provider integration
//!
//! This module provides:
//! - The [`SyncProvider`] seam the orchestrator drives
//! - An HTTP client for the provider's sync endpoints
//! - Validation of raw records into [`RemoteMessage`]s

mod client;
mod normalize;

pub use client::{AurinkoClient, ClientOptions};
pub use normalize::{decode_records, normalize_message};

use crate::error::TransportError;
use crate::models::RemoteMessage;

/// Result of starting (or polling) the provider's indexing job
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingStatus {
    /// false means the job is still running and the caller should retry
    pub ready: bool,
    /// Initial delta cursor, present once ready
    pub delta_token: Option<String>,
}

/// Cursor for one `fetch_updates` call; delta and page tokens never mix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCursor {
    Delta(String),
    Page(String),
}

impl FetchCursor {
    pub fn token(&self) -> &str {
        match self {
            FetchCursor::Delta(token) | FetchCursor::Page(token) => token,
        }
    }
}

/// One page of updated records
#[derive(Debug, Clone, Default)]
pub struct UpdatesPage {
    pub records: Vec<RemoteMessage>,
    pub next_page_token: Option<String>,
    pub next_delta_token: Option<String>,
    /// Records dropped because they failed validation
    pub rejected: usize,
}

/// The remote operations a sync run needs
///
/// Implementations make exactly one network call per method and never retry;
/// errors are returned as-is.
pub trait SyncProvider: Send + Sync {
    /// Start the full-history indexing job, or poll one already running
    fn start_indexing(&self, credential: &str) -> Result<IndexingStatus, TransportError>;

    /// Fetch one page of updated records
    fn fetch_updates(
        &self,
        credential: &str,
        cursor: &FetchCursor,
    ) -> Result<UpdatesPage, TransportError>;
}

/// Provider response types
pub mod api {
    use serde::Deserialize;

    /// Response from the sync-start endpoint
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StartSyncResponse {
        pub ready: bool,
        pub sync_updated_token: Option<String>,
        pub sync_deleted_token: Option<String>,
    }

    /// Response from the updated-records endpoint
    ///
    /// Records stay untyped here so one malformed record does not fail the
    /// whole page.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SyncUpdatedResponse {
        pub next_page_token: Option<String>,
        pub next_delta_token: Option<String>,
        pub length: Option<u32>,
        #[serde(default)]
        pub records: Vec<serde_json::Value>,
    }

    /// A message record as the provider sends it
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawMessage {
        pub id: Option<String>,
        pub thread_id: Option<String>,
        pub created_time: Option<String>,
        pub last_modified_time: Option<String>,
        pub sent_at: Option<String>,
        pub received_at: Option<String>,
        pub internet_message_id: Option<String>,
        pub subject: Option<String>,
        #[serde(default)]
        pub sys_labels: Vec<String>,
        #[serde(default)]
        pub keywords: Vec<String>,
        #[serde(default)]
        pub sys_classifications: Vec<String>,
        pub sensitivity: Option<String>,
        pub meeting_message_method: Option<String>,
        pub from: Option<RawAddress>,
        #[serde(default)]
        pub to: Vec<RawAddress>,
        #[serde(default)]
        pub cc: Vec<RawAddress>,
        #[serde(default)]
        pub bcc: Vec<RawAddress>,
        #[serde(default)]
        pub reply_to: Vec<RawAddress>,
        #[serde(default)]
        pub has_attachments: bool,
        pub body: Option<String>,
        pub body_snippet: Option<String>,
        #[serde(default)]
        pub attachments: Vec<RawAttachment>,
        pub in_reply_to: Option<String>,
        pub references: Option<String>,
        pub thread_index: Option<String>,
        #[serde(default)]
        pub internet_headers: serde_json::Value,
        #[serde(default)]
        pub native_properties: serde_json::Value,
        pub folder_id: Option<String>,
        #[serde(default)]
        pub omitted: Vec<String>,
    }

    /// Address entry on a raw record
    #[derive(Debug, Deserialize)]
    pub struct RawAddress {
        pub name: Option<String>,
        pub address: Option<String>,
        pub raw: Option<String>,
    }

    /// Attachment on a raw record
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawAttachment {
        pub id: Option<String>,
        pub name: Option<String>,
        pub mime_type: Option<String>,
        pub size: Option<i64>,
        #[serde(default)]
        pub inline: bool,
        pub content_id: Option<String>,
        pub content: Option<String>,
        pub content_location: Option<String>,
    }
}
