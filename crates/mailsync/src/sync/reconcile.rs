//! Reconciliation of fetched messages into storage
//!
//! Each message becomes address, thread, email and attachment rows. Every
//! step is an upsert, so feeding the same batch twice leaves storage as it
//! was after the first pass.

use std::collections::HashMap;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{AttachmentIngestError, RecordIngestError};
use crate::models::{
    AddressEntry, AddressId, Attachment, Email, Recipients, RemoteMessage, ThreadUpsert,
};
use crate::storage::MailStore;

/// Statistics from reconciling one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Messages handed to the engine
    pub received: usize,
    /// Messages fully stored
    pub ingested: usize,
    /// Messages skipped after a per-message failure
    pub skipped: usize,
    pub attachments_stored: usize,
    pub attachments_failed: usize,
}

/// Outcome of one successfully ingested message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageOutcome {
    pub attachments_stored: usize,
    pub attachments_failed: usize,
}

/// Merges remote messages into a [`MailStore`]
///
/// `concurrency` caps how many messages are in flight. One gives a plain
/// sequential loop. Higher values are only safe because every store method
/// used here is atomic on its own.
pub struct Reconciler<'a> {
    store: &'a dyn MailStore,
    concurrency: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn MailStore, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Ingest every message; per-message failures are logged and counted
    pub fn reconcile(&self, account_id: &str, messages: &[RemoteMessage]) -> ReconcileStats {
        let outcomes = if self.concurrency == 1 {
            messages
                .iter()
                .map(|m| self.ingest_message(account_id, m))
                .collect::<Vec<_>>()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .thread_name(|i| format!("reconcile-{}", i))
                .build()
            {
                Ok(pool) => pool.install(|| {
                    messages
                        .par_iter()
                        .map(|m| self.ingest_message(account_id, m))
                        .collect::<Vec<_>>()
                }),
                Err(e) => {
                    warn!("Failed to start reconcile pool, running sequentially: {}", e);
                    messages
                        .iter()
                        .map(|m| self.ingest_message(account_id, m))
                        .collect::<Vec<_>>()
                }
            }
        };

        let mut stats = ReconcileStats {
            received: messages.len(),
            ..ReconcileStats::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    stats.ingested += 1;
                    stats.attachments_stored += outcome.attachments_stored;
                    stats.attachments_failed += outcome.attachments_failed;
                }
                Err(e) => {
                    warn!("Skipping message: {}", e);
                    stats.skipped += 1;
                }
            }
        }

        info!(
            "Reconciled {} messages for account {}: {} ingested, {} skipped, {} attachments ({} failed)",
            stats.received,
            account_id,
            stats.ingested,
            stats.skipped,
            stats.attachments_stored,
            stats.attachments_failed
        );
        stats
    }

    /// Store one message and everything it references
    pub fn ingest_message(
        &self,
        account_id: &str,
        message: &RemoteMessage,
    ) -> Result<MessageOutcome, RecordIngestError> {
        let folder = message.folder();
        let lookup = self.upsert_addresses(account_id, message);

        // Without a sender nothing is written for this message
        let from_id = *lookup
            .get(message.from.address.as_str())
            .ok_or_else(|| RecordIngestError::MissingSender {
                message_id: message.id.clone(),
            })?;

        let resolve = |entries: &[AddressEntry]| -> Vec<AddressId> {
            entries
                .iter()
                .filter_map(|e| lookup.get(e.address.as_str()).copied())
                .collect()
        };

        let mut participant_ids = vec![from_id];
        participant_ids.extend(resolve(&message.to));
        participant_ids.extend(resolve(&message.cc));
        participant_ids.extend(resolve(&message.bcc));

        self.store
            .upsert_thread(ThreadUpsert {
                id: message.thread_id.clone(),
                account_id: account_id.to_string(),
                subject: message.subject.clone(),
                sent_at: message.sent_at,
                participant_ids,
                folder,
            })
            .map_err(RecordIngestError::storage(&message.id))?;

        // A message can move between threads; the old one is recomputed too
        let previous_thread = self
            .store
            .get_email(&message.id)
            .map_err(RecordIngestError::storage(&message.id))?
            .map(|stored| stored.thread_id)
            .filter(|thread_id| *thread_id != message.thread_id);

        let recipients = Recipients {
            to: resolve(&message.to),
            cc: resolve(&message.cc),
            bcc: resolve(&message.bcc),
            reply_to: resolve(&message.reply_to),
        };
        self.store
            .upsert_email(Email::from_remote(message, from_id, recipients))
            .map_err(RecordIngestError::storage(&message.id))?;

        let flags = self
            .store
            .recompute_thread_folders(&message.thread_id)
            .map_err(RecordIngestError::storage(&message.id))?;
        debug!(
            "Stored {} in thread {} (thread folder {:?})",
            message.id,
            message.thread_id,
            flags.folder()
        );

        if let Some(old_thread) = previous_thread {
            let flags = self
                .store
                .recompute_thread_folders(&old_thread)
                .map_err(RecordIngestError::storage(&message.id))?;
            debug!(
                "Moved {} out of thread {} (thread folder now {:?})",
                message.id, old_thread, flags.folder()
            );
        }

        let mut outcome = MessageOutcome::default();
        for remote in &message.attachments {
            let attachment = Attachment::from_remote(&message.id, remote);
            match self.store.upsert_attachment(attachment) {
                Ok(()) => outcome.attachments_stored += 1,
                Err(source) => {
                    let err = AttachmentIngestError {
                        message_id: message.id.clone(),
                        attachment_id: remote.id.clone(),
                        source,
                    };
                    warn!("{}", err);
                    outcome.attachments_failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Find or create every address the message references
    ///
    /// Addresses that fail to store are logged and left out of the lookup.
    fn upsert_addresses<'m>(
        &self,
        account_id: &str,
        message: &'m RemoteMessage,
    ) -> HashMap<&'m str, AddressId> {
        let mut lookup = HashMap::new();
        for entry in message.distinct_addresses() {
            match self.store.find_or_create_address(account_id, entry) {
                Ok(stored) => {
                    lookup.insert(entry.address.as_str(), stored.id);
                }
                Err(e) => warn!(
                    "Failed to store address {} for message {}: {:#}",
                    entry.address, message.id, e
                ),
            }
        }
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, EmailId, Folder, RemoteAttachment, ThreadId};
    use crate::storage::{InMemoryMailStore, ThreadFilter};
    use chrono::{TimeZone, Utc};

    fn setup() -> InMemoryMailStore {
        let store = InMemoryMailStore::new();
        store
            .upsert_account(Account::new("acc-1", "user-1", "token"))
            .unwrap();
        store
    }

    fn message(id: &str, thread: &str, hour: u32, labels: &[&str]) -> RemoteMessage {
        RemoteMessage::builder(EmailId::new(id), ThreadId::new(thread))
            .from(AddressEntry::with_name("Alice", "alice@example.com"))
            .to(vec![AddressEntry::new("bob@example.com")])
            .subject(format!("Subject {}", id))
            .dated(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap())
            .sys_labels(labels.iter().copied())
            .build()
    }

    #[test]
    fn test_ingest_creates_rows() {
        let store = setup();
        let reconciler = Reconciler::new(&store, 1);
        let msg = message("m1", "t1", 9, &["inbox"]);

        let stats = reconciler.reconcile("acc-1", &[msg]);

        assert_eq!(stats.ingested, 1);
        assert_eq!(store.count_addresses("acc-1").unwrap(), 2);
        let thread = store.get_thread(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(thread.subject, "Subject m1");
        assert_eq!(thread.participant_ids.len(), 2);
        assert!(thread.inbox_status);
        assert!(!thread.done);

        let email = store.get_email(&EmailId::new("m1")).unwrap().unwrap();
        assert_eq!(email.email_label, Folder::Inbox);
        assert_eq!(email.recipients.to.len(), 1);
    }

    #[test]
    fn test_reply_to_is_stored_but_not_a_participant() {
        let store = setup();
        let reconciler = Reconciler::new(&store, 1);
        let msg = RemoteMessage::builder(EmailId::new("m1"), ThreadId::new("t1"))
            .from(AddressEntry::new("alice@example.com"))
            .reply_to(vec![AddressEntry::new("list@example.com")])
            .dated(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
            .build();

        reconciler.ingest_message("acc-1", &msg).unwrap();

        let thread = store.get_thread(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(thread.participant_ids.len(), 1);
        let email = store.get_email(&EmailId::new("m1")).unwrap().unwrap();
        assert_eq!(email.recipients.reply_to.len(), 1);
    }

    #[test]
    fn test_draft_then_inbox_thread_becomes_inbox() {
        let store = setup();
        let reconciler = Reconciler::new(&store, 1);
        reconciler.reconcile(
            "acc-1",
            &[
                message("m1", "T1", 9, &["draft"]),
                message("m2", "T1", 10, &["inbox"]),
            ],
        );

        let thread = store.get_thread(&ThreadId::new("T1")).unwrap().unwrap();
        assert!(thread.inbox_status);
        assert!(!thread.draft_status);
        assert!(!thread.sent_status);
    }

    #[test]
    fn test_older_message_does_not_rewind_thread() {
        let store = setup();
        let reconciler = Reconciler::new(&store, 1);
        reconciler.reconcile(
            "acc-1",
            &[message("m2", "t1", 11, &["inbox"]), message("m1", "t1", 9, &["inbox"])],
        );

        let thread = store.get_thread(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(thread.subject, "Subject m2");
        assert_eq!(
            thread.last_message_date,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_attachments_upserted_in_place() {
        let store = setup();
        let reconciler = Reconciler::new(&store, 1);
        let v1 = RemoteAttachment::new("a1", "notes.txt").with_content("text/plain", "one");
        let v2 = RemoteAttachment::new("a1", "notes.txt").with_content("text/plain", "two!");

        let mut msg = message("m1", "t1", 9, &["inbox"]);
        msg.attachments = vec![v1];
        let stats = reconciler.reconcile("acc-1", &[msg.clone()]);
        assert_eq!(stats.attachments_stored, 1);

        msg.attachments = vec![v2];
        reconciler.reconcile("acc-1", &[msg]);

        let stored = store
            .list_attachments_for_email(&EmailId::new("m1"))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.as_deref(), Some("two!"));
        assert_eq!(store.count_attachments("acc-1").unwrap(), 1);
    }

    #[test]
    fn test_bounded_concurrency_matches_sequential() {
        let batch: Vec<RemoteMessage> = (0..40)
            .map(|i| {
                let labels: &[&str] = if i % 3 == 0 { &["draft"] } else { &["sent"] };
                message(&format!("m{}", i), &format!("t{}", i % 5), i % 24, labels)
            })
            .collect();

        let sequential = setup();
        Reconciler::new(&sequential, 1).reconcile("acc-1", &batch);

        let parallel = setup();
        let stats = Reconciler::new(&parallel, 4).reconcile("acc-1", &batch);
        assert_eq!(stats.ingested, 40);

        let all = ThreadFilter::default();
        let expected = sequential.list_threads("acc-1", &all, 100, 0).unwrap();
        let actual = parallel.list_threads("acc-1", &all, 100, 0).unwrap();
        assert_eq!(expected.len(), 5);
        for (e, a) in expected.iter().zip(&actual) {
            assert_eq!(e.id, a.id);
            assert_eq!(e.subject, a.subject);
            assert_eq!(e.last_message_date, a.last_message_date);
            assert_eq!(e.folder_flags(), a.folder_flags());
            assert_eq!(e.participant_ids.len(), a.participant_ids.len());
        }
        assert_eq!(parallel.count_emails("acc-1").unwrap(), 40);
        assert_eq!(parallel.count_addresses("acc-1").unwrap(), 2);
    }
}
