//! In-memory storage implementation
//!
//! Used in tests and for dry runs. All maps sit behind one `RwLock`, which
//! makes every trait method atomic.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{MailStore, ThreadFilter};
use crate::models::{
    Account, AddressEntry, AddressId, Attachment, Email, EmailAddress, EmailId, FolderFlags,
    Thread, ThreadId, ThreadUpsert,
};

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    addresses: HashMap<AddressId, EmailAddress>,
    /// (account_id, address) -> id
    address_index: HashMap<(String, String), AddressId>,
    next_address_id: i64,
    threads: HashMap<ThreadId, Thread>,
    emails: HashMap<EmailId, Email>,
    attachments: HashMap<String, Attachment>,
}

impl State {
    fn thread_ids_for_account<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a ThreadId> {
        self.threads
            .values()
            .filter(move |t| t.account_id == account_id)
            .map(|t| &t.id)
    }

    fn emails_for_thread(&self, thread_id: &ThreadId) -> Vec<Email> {
        let mut emails: Vec<Email> = self
            .emails
            .values()
            .filter(|e| &e.thread_id == thread_id)
            .cloned()
            .collect();
        emails.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        emails
    }
}

/// In-memory implementation of [`MailStore`]
pub struct InMemoryMailStore {
    state: RwLock<State>,
}

impl InMemoryMailStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_address_id: 1,
                ..State::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("In-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("In-memory store lock poisoned"))
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(thread: &Thread, filter: &ThreadFilter) -> bool {
    let folder_ok = filter
        .folder
        .is_none_or(|f| FolderFlags::for_folder(f) == thread.folder_flags());
    let done_ok = filter.done.is_none_or(|d| thread.done == d);
    folder_ok && done_ok
}

impl MailStore for InMemoryMailStore {
    fn upsert_account(&self, mut account: Account) -> Result<()> {
        let mut state = self.write()?;
        // Only the lease methods move the lease
        account.sync_lease_at = state
            .accounts
            .get(&account.id)
            .and_then(|existing| existing.sync_lease_at);
        state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    fn find_account_for_user(&self, account_id: &str, user_id: &str) -> Result<Option<Account>> {
        Ok(self
            .read()?
            .accounts
            .get(account_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    fn save_delta_token(&self, account_id: &str, delta_token: &str) -> Result<()> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| anyhow!("Account {} not found", account_id))?;
        account.next_delta_token = Some(delta_token.to_string());
        account.last_sync_at = Some(Utc::now());
        Ok(())
    }

    fn try_acquire_sync_lease(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| anyhow!("Account {} not found", account_id))?;
        if account.lease_active(now, ttl) {
            return Ok(false);
        }
        account.sync_lease_at = Some(now);
        Ok(true)
    }

    fn release_sync_lease(&self, account_id: &str) -> Result<()> {
        let mut state = self.write()?;
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.sync_lease_at = None;
        }
        Ok(())
    }

    fn find_or_create_address(
        &self,
        account_id: &str,
        entry: &AddressEntry,
    ) -> Result<EmailAddress> {
        let mut state = self.write()?;
        let key = (account_id.to_string(), entry.address.clone());

        if let Some(id) = state.address_index.get(&key)
            && let Some(existing) = state.addresses.get(id)
        {
            return Ok(existing.clone());
        }

        let id = AddressId(state.next_address_id);
        state.next_address_id += 1;

        let address = EmailAddress {
            id,
            account_id: account_id.to_string(),
            address: entry.address.clone(),
            name: entry.name.clone(),
            raw: entry.raw.clone(),
        };
        state.addresses.insert(id, address.clone());
        state.address_index.insert(key, id);
        Ok(address)
    }

    fn get_address(&self, id: AddressId) -> Result<Option<EmailAddress>> {
        Ok(self.read()?.addresses.get(&id).cloned())
    }

    fn count_addresses(&self, account_id: &str) -> Result<usize> {
        Ok(self
            .read()?
            .addresses
            .values()
            .filter(|a| a.account_id == account_id)
            .count())
    }

    fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread> {
        let mut state = self.write()?;
        let existing = state.threads.get(&upsert.id).cloned();
        let thread = upsert.apply(existing)?;
        state.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        Ok(self.read()?.threads.get(id).cloned())
    }

    fn recompute_thread_folders(&self, id: &ThreadId) -> Result<FolderFlags> {
        let mut state = self.write()?;
        let flags = FolderFlags::from_folders(
            state.emails_for_thread(id).iter().map(|e| e.email_label),
        );
        let thread = state
            .threads
            .get_mut(id)
            .ok_or_else(|| anyhow!("Thread {} not found", id))?;
        thread.set_folder_flags(flags);
        Ok(flags)
    }

    fn set_thread_done(&self, id: &ThreadId, done: bool) -> Result<bool> {
        let mut state = self.write()?;
        match state.threads.get_mut(id) {
            Some(thread) => {
                thread.done = done;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_threads(
        &self,
        account_id: &str,
        filter: &ThreadFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>> {
        let state = self.read()?;
        let mut threads: Vec<Thread> = state
            .threads
            .values()
            .filter(|t| t.account_id == account_id && matches_filter(t, filter))
            .cloned()
            .collect();

        threads.sort_by(|a, b| {
            b.last_message_date
                .cmp(&a.last_message_date)
                .then(a.id.cmp(&b.id))
        });

        Ok(threads.into_iter().skip(offset).take(limit).collect())
    }

    fn count_threads(&self, account_id: &str, filter: &ThreadFilter) -> Result<usize> {
        Ok(self
            .read()?
            .threads
            .values()
            .filter(|t| t.account_id == account_id && matches_filter(t, filter))
            .count())
    }

    fn upsert_email(&self, email: Email) -> Result<()> {
        let mut state = self.write()?;
        if !state.threads.contains_key(&email.thread_id) {
            return Err(anyhow!(
                "Email {} references unknown thread {}",
                email.id,
                email.thread_id
            ));
        }
        state.emails.insert(email.id.clone(), email);
        Ok(())
    }

    fn get_email(&self, id: &EmailId) -> Result<Option<Email>> {
        Ok(self.read()?.emails.get(id).cloned())
    }

    fn list_emails_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Email>> {
        Ok(self.read()?.emails_for_thread(thread_id))
    }

    fn count_emails(&self, account_id: &str) -> Result<usize> {
        let state = self.read()?;
        let thread_ids: Vec<&ThreadId> = state.thread_ids_for_account(account_id).collect();
        Ok(state
            .emails
            .values()
            .filter(|e| thread_ids.contains(&&e.thread_id))
            .count())
    }

    fn upsert_attachment(&self, attachment: Attachment) -> Result<()> {
        let mut state = self.write()?;
        if !state.emails.contains_key(&attachment.email_id) {
            return Err(anyhow!(
                "Attachment {} references unknown email {}",
                attachment.id,
                attachment.email_id
            ));
        }
        state.attachments.insert(attachment.id.clone(), attachment);
        Ok(())
    }

    fn list_attachments_for_email(&self, email_id: &EmailId) -> Result<Vec<Attachment>> {
        let state = self.read()?;
        let mut attachments: Vec<Attachment> = state
            .attachments
            .values()
            .filter(|a| &a.email_id == email_id)
            .cloned()
            .collect();
        attachments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(attachments)
    }

    fn count_attachments(&self, account_id: &str) -> Result<usize> {
        let state = self.read()?;
        let thread_ids: Vec<&ThreadId> = state.thread_ids_for_account(account_id).collect();
        Ok(state
            .attachments
            .values()
            .filter(|a| {
                state
                    .emails
                    .get(&a.email_id)
                    .is_some_and(|e| thread_ids.contains(&&e.thread_id))
            })
            .count())
    }
}
