//! Thread query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AddressId, Attachment, Email, EmailAddress, EmailId, Folder, Thread, ThreadId,
};
use crate::storage::{MailStore, ThreadFilter};

/// One email as shown in a thread list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: EmailId,
    /// Sender identity; None only if the address row has gone missing
    pub from: Option<EmailAddress>,
    pub subject: String,
    pub body_snippet: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub email_label: Folder,
    pub sys_labels: Vec<String>,
}

/// Summary information for displaying a thread in a list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub subject: String,
    pub last_message_date: DateTime<Utc>,
    /// The tab this thread is filed under
    pub folder: Folder,
    pub done: bool,
    pub participant_ids: Vec<AddressId>,
    /// Emails ordered by `received_at` ascending
    pub emails: Vec<EmailSummary>,
}

/// An email with its resolved sender and attachments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetail {
    pub email: Email,
    pub from: Option<EmailAddress>,
    pub attachments: Vec<Attachment>,
}

/// Detailed thread information including all emails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDetail {
    pub thread: Thread,
    /// Participant identities in first-seen order
    pub participants: Vec<EmailAddress>,
    /// All emails in the thread, ordered chronologically
    pub emails: Vec<EmailDetail>,
}

/// Open thread counts per tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabCounts {
    pub inbox: usize,
    pub draft: usize,
    pub sent: usize,
}

/// List an account's threads in one tab, newest first
///
/// # Arguments
/// * `store` - The storage backend
/// * `account_id` - The account whose threads to list
/// * `tab` - Folder tab to show
/// * `done` - Whether to show threads marked done or still open
/// * `limit` - Maximum number of threads to return
/// * `offset` - Number of threads to skip
pub fn list_threads(
    store: &dyn MailStore,
    account_id: &str,
    tab: Folder,
    done: bool,
    limit: usize,
    offset: usize,
) -> Result<Vec<ThreadSummary>> {
    let filter = ThreadFilter {
        folder: Some(tab),
        done: Some(done),
    };
    let threads = store.list_threads(account_id, &filter, limit, offset)?;

    threads
        .into_iter()
        .map(|thread| {
            let emails = store
                .list_emails_for_thread(&thread.id)?
                .into_iter()
                .map(|email| summarize(store, email))
                .collect::<Result<Vec<_>>>()?;
            Ok(ThreadSummary {
                folder: tab,
                id: thread.id,
                subject: thread.subject,
                last_message_date: thread.last_message_date,
                done: thread.done,
                participant_ids: thread.participant_ids,
                emails,
            })
        })
        .collect()
}

/// Count an account's threads in one tab
pub fn count_threads(
    store: &dyn MailStore,
    account_id: &str,
    tab: Folder,
    done: bool,
) -> Result<usize> {
    store.count_threads(
        account_id,
        &ThreadFilter {
            folder: Some(tab),
            done: Some(done),
        },
    )
}

/// Count open (not done) threads in every tab
pub fn tab_counts(store: &dyn MailStore, account_id: &str) -> Result<TabCounts> {
    Ok(TabCounts {
        inbox: count_threads(store, account_id, Folder::Inbox, false)?,
        draft: count_threads(store, account_id, Folder::Draft, false)?,
        sent: count_threads(store, account_id, Folder::Sent, false)?,
    })
}

/// Get a thread with its participants, emails and attachments
pub fn get_thread_detail(
    store: &dyn MailStore,
    thread_id: &ThreadId,
) -> Result<Option<ThreadDetail>> {
    let thread = match store.get_thread(thread_id)? {
        Some(t) => t,
        None => return Ok(None),
    };

    let mut participants = Vec::with_capacity(thread.participant_ids.len());
    for id in &thread.participant_ids {
        if let Some(address) = store.get_address(*id)? {
            participants.push(address);
        }
    }

    let emails = store
        .list_emails_for_thread(thread_id)?
        .into_iter()
        .map(|email| {
            let from = store.get_address(email.from_id)?;
            let attachments = store.list_attachments_for_email(&email.id)?;
            Ok(EmailDetail {
                email,
                from,
                attachments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(ThreadDetail {
        thread,
        participants,
        emails,
    }))
}

/// Mark a thread done or not done
///
/// Sync never touches this flag after the thread is created. Returns false
/// if the thread does not exist.
pub fn set_thread_done(store: &dyn MailStore, thread_id: &ThreadId, done: bool) -> Result<bool> {
    store.set_thread_done(thread_id, done)
}

fn summarize(store: &dyn MailStore, email: Email) -> Result<EmailSummary> {
    Ok(EmailSummary {
        from: store.get_address(email.from_id)?,
        id: email.id,
        subject: email.subject,
        body_snippet: email.body_snippet,
        sent_at: email.sent_at,
        email_label: email.email_label,
        sys_labels: email.sys_labels,
    })
}
