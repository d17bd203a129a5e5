//! Email address identities, scoped per account

use serde::{Deserialize, Serialize};

/// Storage identifier of an address row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressId(pub i64);

/// A stored address identity; unique per (account, address)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub id: AddressId,
    pub account_id: String,
    pub address: String,
    pub name: Option<String>,
    pub raw: Option<String>,
}

/// An address as observed on a message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    /// Display name (e.g., "Jane Doe")
    pub name: Option<String>,
    /// Address (e.g., "jane@example.com")
    pub address: String,
    /// Header text as the provider returned it
    pub raw: Option<String>,
}

impl AddressEntry {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
            raw: None,
        }
    }

    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
            raw: None,
        }
    }

    /// Parse a header value like `Jane Doe <jane@example.com>`
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let address = s[angle_start + 1..angle_end].trim();
            return Self {
                name: (!name.is_empty()).then(|| name.to_string()),
                address: address.to_string(),
                raw: Some(s.to_string()),
            };
        }

        Self {
            name: None,
            address: s.to_string(),
            raw: Some(s.to_string()),
        }
    }
}
