//! Account model representing a linked remote mailbox

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mailbox linked to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier (assigned by the provider when the mailbox is linked)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Mailbox address
    pub email_address: String,
    /// Display name
    pub name: Option<String>,
    /// Opaque access credential for the provider API
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Resume point for incremental sync; None until the first run completes
    pub next_delta_token: Option<String>,
    /// When the current sync lease was taken (None = no run in progress)
    pub sync_lease_at: Option<DateTime<Utc>>,
    /// When a delta cursor was last persisted
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a linked account that has never been synced
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            email_address: String::new(),
            name: None,
            access_token: access_token.into(),
            next_delta_token: None,
            sync_lease_at: None,
            last_sync_at: None,
        }
    }

    pub fn with_email_address(mut self, email_address: impl Into<String>) -> Self {
        self.email_address = email_address.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_delta_token(mut self, token: impl Into<String>) -> Self {
        self.next_delta_token = Some(token.into());
        self
    }

    /// Whether a sync lease is held and younger than `ttl`
    pub fn lease_active(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.sync_lease_at.is_some_and(|at| now - at < ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = Account::new("acc-1", "user-1", "token");
        assert_eq!(account.id, "acc-1");
        assert_eq!(account.user_id, "user-1");
        assert!(account.next_delta_token.is_none());
        assert!(account.sync_lease_at.is_none());
    }

    #[test]
    fn test_access_token_not_serialized() {
        let account = Account::new("acc-1", "user-1", "secret-token");
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-token"));
    }

    #[test]
    fn test_lease_active() {
        let now = Utc::now();
        let mut account = Account::new("acc-1", "user-1", "token");
        assert!(!account.lease_active(now, chrono::Duration::minutes(5)));

        account.sync_lease_at = Some(now - chrono::Duration::minutes(1));
        assert!(account.lease_active(now, chrono::Duration::minutes(5)));

        account.sync_lease_at = Some(now - chrono::Duration::minutes(10));
        assert!(!account.lease_active(now, chrono::Duration::minutes(5)));
    }
}
