//! Error types for sync runs
//!
//! Run-level failures ([`SyncError`]) abort a sync and surface to the caller.
//! Per-record failures ([`RecordIngestError`], [`AttachmentIngestError`]) are
//! logged and counted by the reconciliation engine and never abort a run.

use crate::models::EmailId;

/// Failure talking to the remote provider
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The provider rejected the access credential
    #[error("remote rejected the access credential (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The provider no longer accepts the supplied delta cursor
    #[error("remote rejected the delta cursor as expired (HTTP {status})")]
    CursorExpired { status: u16 },

    /// Any other non-success status
    #[error("{operation} failed with HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    /// Connection, TLS, or timeout failure
    #[error("{operation} request failed: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    /// The response body did not match the expected envelope
    #[error("malformed {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// Failure of a whole sync run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The account does not exist or is not owned by the requesting user
    #[error("Account {account_id} not found")]
    Authorization { account_id: String },

    /// Another run holds the account's sync lease
    #[error("A sync is already in progress for account {account_id}")]
    SyncInProgress { account_id: String },

    /// The indexing retry policy ran out of attempts or time
    #[error("Remote indexing not ready after {attempts} attempts")]
    IndexingTimedOut { attempts: u32 },

    /// The provider reported ready without handing out a delta cursor
    #[error("Remote indexing finished without a delta cursor")]
    MissingDeltaToken,

    #[error("Storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Failure ingesting a single message
#[derive(Debug, thiserror::Error)]
pub enum RecordIngestError {
    #[error("message {message_id} has no resolvable sender address")]
    MissingSender { message_id: EmailId },

    #[error("failed to store message {message_id}: {source:#}")]
    Storage {
        message_id: EmailId,
        #[source]
        source: anyhow::Error,
    },
}

impl RecordIngestError {
    pub(crate) fn storage(message_id: &EmailId) -> impl FnOnce(anyhow::Error) -> Self + '_ {
        move |source| Self::Storage {
            message_id: message_id.clone(),
            source,
        }
    }
}

/// Failure storing one attachment of a message
#[derive(Debug, thiserror::Error)]
#[error("failed to store attachment {attachment_id} of message {message_id}: {source:#}")]
pub struct AttachmentIngestError {
    pub message_id: EmailId,
    pub attachment_id: String,
    #[source]
    pub source: anyhow::Error,
}
