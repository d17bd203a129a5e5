//! Thread model representing a remote conversation

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AddressId, Folder, FolderFlags};

/// Unique identifier for a thread (assigned by the provider)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation grouping emails that share a provider thread id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub account_id: String,
    pub subject: String,
    /// Sent time of the latest email seen for this thread
    pub last_message_date: DateTime<Utc>,
    /// Every address that has taken part, deduplicated, in first-seen order
    pub participant_ids: Vec<AddressId>,
    pub inbox_status: bool,
    pub draft_status: bool,
    pub sent_status: bool,
    /// User-controlled; sync only sets it when creating the thread
    pub done: bool,
}

impl Thread {
    pub fn folder_flags(&self) -> FolderFlags {
        FolderFlags {
            inbox: self.inbox_status,
            draft: self.draft_status,
            sent: self.sent_status,
        }
    }

    pub fn set_folder_flags(&mut self, flags: FolderFlags) {
        self.inbox_status = flags.inbox;
        self.draft_status = flags.draft;
        self.sent_status = flags.sent;
    }
}

/// The thread-level facts one message contributes
///
/// Stores apply this atomically against whatever row they already hold, so
/// the merge rule lives here and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadUpsert {
    pub id: ThreadId,
    pub account_id: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub participant_ids: Vec<AddressId>,
    pub folder: Folder,
}

impl ThreadUpsert {
    /// Produce the row to store given the existing one, if any
    ///
    /// On create the folder flags and participants come from this message
    /// alone and `done` starts false. On update participants become the union
    /// of old and new, subject and last message date follow the newest email,
    /// and `done` and the folder flags are left alone.
    ///
    /// A thread stays with the account that created it; an upsert from any
    /// other account is an error and the stored row is untouched.
    pub fn apply(self, existing: Option<Thread>) -> Result<Thread> {
        let thread = match existing {
            None => Thread {
                id: self.id,
                account_id: self.account_id,
                subject: self.subject,
                last_message_date: self.sent_at,
                participant_ids: dedup_ids(self.participant_ids),
                inbox_status: self.folder == Folder::Inbox,
                draft_status: self.folder == Folder::Draft,
                sent_status: self.folder == Folder::Sent,
                done: false,
            },
            Some(mut thread) => {
                if thread.account_id != self.account_id {
                    bail!(
                        "Thread {} belongs to account {}, not {}",
                        thread.id,
                        thread.account_id,
                        self.account_id
                    );
                }
                if self.sent_at >= thread.last_message_date {
                    thread.last_message_date = self.sent_at;
                    thread.subject = self.subject;
                }
                let mut participants = thread.participant_ids;
                participants.extend(self.participant_ids);
                thread.participant_ids = dedup_ids(participants);
                thread
            }
        };
        Ok(thread)
    }
}

fn dedup_ids(ids: Vec<AddressId>) -> Vec<AddressId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
