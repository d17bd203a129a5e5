//! Validated message records as fetched from the provider
//!
//! A [`RemoteMessage`] has passed boundary validation: it has an id, a
//! thread id, a sender address, and parsed timestamps. Reconciliation only
//! ever sees this type, never raw provider JSON.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AddressEntry, EmailId, Folder, ThreadId};

/// An attachment carried on a fetched message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub inline: bool,
    pub content_id: Option<String>,
    /// Opaque payload as delivered by the provider
    pub content: Option<String>,
    pub content_location: Option<String>,
}

impl RemoteAttachment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: "application/octet-stream".to_string(),
            size: 0,
            inline: false,
            content_id: None,
            content: None,
            content_location: None,
        }
    }

    pub fn with_content(mut self, mime_type: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        self.mime_type = mime_type.into();
        self.size = content.len() as i64;
        self.content = Some(content);
        self
    }
}

/// A message fetched from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: EmailId,
    pub thread_id: ThreadId,
    pub from: AddressEntry,
    pub to: Vec<AddressEntry>,
    pub cc: Vec<AddressEntry>,
    pub bcc: Vec<AddressEntry>,
    pub reply_to: Vec<AddressEntry>,
    pub subject: String,
    pub created_time: DateTime<Utc>,
    pub last_modified_time: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub internet_message_id: String,
    pub sys_labels: Vec<String>,
    pub keywords: Vec<String>,
    pub sys_classifications: Vec<String>,
    pub sensitivity: String,
    pub meeting_message_method: Option<String>,
    pub has_attachments: bool,
    pub body: Option<String>,
    pub body_snippet: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_index: Option<String>,
    pub internet_headers: serde_json::Value,
    pub native_properties: serde_json::Value,
    pub folder_id: Option<String>,
    pub omitted: Vec<String>,
    pub attachments: Vec<RemoteAttachment>,
}

impl RemoteMessage {
    pub fn builder(id: EmailId, thread_id: ThreadId) -> RemoteMessageBuilder {
        RemoteMessageBuilder::new(id, thread_id)
    }

    /// Folder classification from the system labels
    pub fn folder(&self) -> Folder {
        Folder::classify(&self.sys_labels)
    }

    /// Every address referenced by this message, one entry per address string
    ///
    /// Covers the sender and all recipient kinds. When an address appears more
    /// than once the last occurrence supplies the entry, first-seen order is
    /// kept.
    pub fn distinct_addresses(&self) -> Vec<&AddressEntry> {
        let mut order: Vec<&str> = Vec::new();
        let mut by_address: HashMap<&str, &AddressEntry> = HashMap::new();

        let all = std::iter::once(&self.from)
            .chain(&self.to)
            .chain(&self.cc)
            .chain(&self.bcc)
            .chain(&self.reply_to);

        for entry in all {
            if by_address.insert(entry.address.as_str(), entry).is_none() {
                order.push(entry.address.as_str());
            }
        }

        order.into_iter().filter_map(|a| by_address.get(a).copied()).collect()
    }
}

/// Builder for [`RemoteMessage`]; used by the normalizer and in tests
pub struct RemoteMessageBuilder {
    message: RemoteMessage,
}

impl RemoteMessageBuilder {
    fn new(id: EmailId, thread_id: ThreadId) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            message: RemoteMessage {
                id,
                thread_id,
                from: AddressEntry::new(""),
                to: Vec::new(),
                cc: Vec::new(),
                bcc: Vec::new(),
                reply_to: Vec::new(),
                subject: String::new(),
                created_time: epoch,
                last_modified_time: epoch,
                sent_at: epoch,
                received_at: epoch,
                internet_message_id: String::new(),
                sys_labels: Vec::new(),
                keywords: Vec::new(),
                sys_classifications: Vec::new(),
                sensitivity: "normal".to_string(),
                meeting_message_method: None,
                has_attachments: false,
                body: None,
                body_snippet: None,
                in_reply_to: None,
                references: None,
                thread_index: None,
                internet_headers: serde_json::Value::Null,
                native_properties: serde_json::Value::Null,
                folder_id: None,
                omitted: Vec::new(),
                attachments: Vec::new(),
            },
        }
    }

    pub fn from(mut self, from: AddressEntry) -> Self {
        self.message.from = from;
        self
    }

    pub fn to(mut self, to: Vec<AddressEntry>) -> Self {
        self.message.to = to;
        self
    }

    pub fn cc(mut self, cc: Vec<AddressEntry>) -> Self {
        self.message.cc = cc;
        self
    }

    pub fn bcc(mut self, bcc: Vec<AddressEntry>) -> Self {
        self.message.bcc = bcc;
        self
    }

    pub fn reply_to(mut self, reply_to: Vec<AddressEntry>) -> Self {
        self.message.reply_to = reply_to;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.message.subject = subject.into();
        self
    }

    pub fn sent_at(mut self, at: DateTime<Utc>) -> Self {
        self.message.sent_at = at;
        self
    }

    /// Set sent, received, created and modified times to one instant
    pub fn dated(mut self, at: DateTime<Utc>) -> Self {
        self.message.sent_at = at;
        self.message.received_at = at;
        self.message.created_time = at;
        self.message.last_modified_time = at;
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.message.received_at = at;
        self
    }

    pub fn created_time(mut self, at: DateTime<Utc>) -> Self {
        self.message.created_time = at;
        self
    }

    pub fn last_modified_time(mut self, at: DateTime<Utc>) -> Self {
        self.message.last_modified_time = at;
        self
    }

    pub fn internet_message_id(mut self, id: impl Into<String>) -> Self {
        self.message.internet_message_id = id.into();
        self
    }

    pub fn sys_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.message.sys_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.message.keywords = keywords;
        self
    }

    pub fn sys_classifications(mut self, classifications: Vec<String>) -> Self {
        self.message.sys_classifications = classifications;
        self
    }

    pub fn sensitivity(mut self, sensitivity: impl Into<String>) -> Self {
        self.message.sensitivity = sensitivity.into();
        self
    }

    pub fn meeting_message_method(mut self, method: Option<String>) -> Self {
        self.message.meeting_message_method = method;
        self
    }

    pub fn body(mut self, body: Option<String>) -> Self {
        self.message.body = body;
        self
    }

    pub fn body_snippet(mut self, snippet: Option<String>) -> Self {
        self.message.body_snippet = snippet;
        self
    }

    pub fn in_reply_to(mut self, in_reply_to: Option<String>) -> Self {
        self.message.in_reply_to = in_reply_to;
        self
    }

    pub fn references(mut self, references: Option<String>) -> Self {
        self.message.references = references;
        self
    }

    pub fn thread_index(mut self, thread_index: Option<String>) -> Self {
        self.message.thread_index = thread_index;
        self
    }

    pub fn internet_headers(mut self, headers: serde_json::Value) -> Self {
        self.message.internet_headers = headers;
        self
    }

    pub fn native_properties(mut self, properties: serde_json::Value) -> Self {
        self.message.native_properties = properties;
        self
    }

    pub fn folder_id(mut self, folder_id: Option<String>) -> Self {
        self.message.folder_id = folder_id;
        self
    }

    pub fn omitted(mut self, omitted: Vec<String>) -> Self {
        self.message.omitted = omitted;
        self
    }

    pub fn has_attachments(mut self, has_attachments: bool) -> Self {
        self.message.has_attachments = has_attachments;
        self
    }

    pub fn attachment(mut self, attachment: RemoteAttachment) -> Self {
        self.message.attachments.push(attachment);
        self.message.has_attachments = true;
        self
    }

    pub fn attachments(mut self, attachments: Vec<RemoteAttachment>) -> Self {
        self.message.attachments = attachments;
        self
    }

    pub fn build(self) -> RemoteMessage {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_addresses_dedupes_across_kinds() {
        let message = RemoteMessage::builder(EmailId::new("m1"), ThreadId::new("t1"))
            .from(AddressEntry::new("alice@example.com"))
            .to(vec![
                AddressEntry::new("bob@example.com"),
                AddressEntry::new("alice@example.com"),
            ])
            .cc(vec![AddressEntry::new("carol@example.com")])
            .reply_to(vec![AddressEntry::with_name("Bob", "bob@example.com")])
            .build();

        let addresses: Vec<&str> = message
            .distinct_addresses()
            .iter()
            .map(|a| a.address.as_str())
            .collect();
        assert_eq!(
            addresses,
            vec!["alice@example.com", "bob@example.com", "carol@example.com"]
        );

        // Last occurrence wins for the entry itself
        let bob = message
            .distinct_addresses()
            .into_iter()
            .find(|a| a.address == "bob@example.com")
            .unwrap();
        assert_eq!(bob.name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_folder_from_labels() {
        let message = RemoteMessage::builder(EmailId::new("m1"), ThreadId::new("t1"))
            .sys_labels(["draft"])
            .build();
        assert_eq!(message.folder(), Folder::Draft);
    }

    #[test]
    fn test_attachment_marks_message() {
        let message = RemoteMessage::builder(EmailId::new("m1"), ThreadId::new("t1"))
            .attachment(RemoteAttachment::new("a1", "notes.txt").with_content("text/plain", "hi"))
            .build();
        assert!(message.has_attachments);
        assert_eq!(message.attachments[0].size, 2);
    }
}
