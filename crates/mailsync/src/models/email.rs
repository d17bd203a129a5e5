//! Email rows: a message normalized against stored address identities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AddressId, Folder, RemoteMessage, ThreadId};

/// Unique identifier for an email (assigned by the provider)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EmailId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmailId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recipient relations of an email; each kind is a set of address ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    pub to: Vec<AddressId>,
    pub cc: Vec<AddressId>,
    pub bcc: Vec<AddressId>,
    pub reply_to: Vec<AddressId>,
}

impl Recipients {
    /// Sort and dedupe every kind so equal sets compare equal
    pub fn normalized(mut self) -> Self {
        for ids in [&mut self.to, &mut self.cc, &mut self.bcc, &mut self.reply_to] {
            ids.sort();
            ids.dedup();
        }
        self
    }

    /// Every (kind, address) pair, kind as stored
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, AddressId)> + '_ {
        let kind = |name: &'static str, ids: &[AddressId]| {
            ids.iter().map(move |id| (name, *id)).collect::<Vec<_>>()
        };
        kind("to", &self.to)
            .into_iter()
            .chain(kind("cc", &self.cc))
            .chain(kind("bcc", &self.bcc))
            .chain(kind("reply_to", &self.reply_to))
    }
}

/// A stored email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub thread_id: ThreadId,
    pub from_id: AddressId,
    pub recipients: Recipients,
    /// Folder derived from `sys_labels` when the email was ingested
    pub email_label: Folder,
    pub created_time: DateTime<Utc>,
    pub last_modified_time: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub internet_message_id: String,
    pub subject: String,
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
}

impl Email {
    /// Build the row for `message` given its resolved sender and recipients
    pub fn from_remote(message: &RemoteMessage, from_id: AddressId, recipients: Recipients) -> Self {
        Self {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            from_id,
            recipients: recipients.normalized(),
            email_label: message.folder(),
            created_time: message.created_time,
            last_modified_time: message.last_modified_time,
            sent_at: message.sent_at,
            received_at: message.received_at,
            internet_message_id: message.internet_message_id.clone(),
            subject: message.subject.clone(),
            sys_labels: message.sys_labels.clone(),
            keywords: message.keywords.clone(),
            sys_classifications: message.sys_classifications.clone(),
            sensitivity: message.sensitivity.clone(),
            meeting_message_method: message.meeting_message_method.clone(),
            has_attachments: message.has_attachments,
            body: message.body.clone(),
            body_snippet: message.body_snippet.clone(),
            in_reply_to: message.in_reply_to.clone(),
            references: message.references.clone(),
            thread_index: message.thread_index.clone(),
            internet_headers: message.internet_headers.clone(),
            native_properties: message.native_properties.clone(),
            folder_id: message.folder_id.clone(),
            omitted: message.omitted.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressEntry;

    #[test]
    fn test_recipients_normalized() {
        let recipients = Recipients {
            to: vec![AddressId(3), AddressId(1), AddressId(3)],
            cc: vec![],
            bcc: vec![AddressId(2)],
            reply_to: vec![],
        }
        .normalized();
        assert_eq!(recipients.to, vec![AddressId(1), AddressId(3)]);

        let pairs: Vec<_> = recipients.pairs().collect();
        assert_eq!(
            pairs,
            vec![("to", AddressId(1)), ("to", AddressId(3)), ("bcc", AddressId(2))]
        );
    }

    #[test]
    fn test_from_remote_takes_label_and_fields() {
        let message = RemoteMessage::builder(EmailId::new("m1"), ThreadId::new("t1"))
            .from(AddressEntry::new("alice@example.com"))
            .subject("Quarterly report")
            .sys_labels(["sent"])
            .body(Some("<p>hi</p>".to_string()))
            .build();

        let email = Email::from_remote(&message, AddressId(7), Recipients::default());
        assert_eq!(email.email_label, Folder::Sent);
        assert_eq!(email.from_id, AddressId(7));
        assert_eq!(email.subject, "Quarterly report");
        assert_eq!(email.body.as_deref(), Some("<p>hi</p>"));
    }
}
