//! Attachment rows

use serde::{Deserialize, Serialize};

use super::{EmailId, RemoteAttachment};

/// A stored attachment, keyed by the provider's attachment id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub email_id: EmailId,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub inline: bool,
    pub content_id: Option<String>,
    pub content: Option<String>,
    pub content_location: Option<String>,
}

impl Attachment {
    pub fn from_remote(email_id: &EmailId, remote: &RemoteAttachment) -> Self {
        Self {
            id: remote.id.clone(),
            email_id: email_id.clone(),
            name: remote.name.clone(),
            mime_type: remote.mime_type.clone(),
            size: remote.size,
            inline: remote.inline,
            content_id: remote.content_id.clone(),
            content: remote.content.clone(),
            content_location: remote.content_location.clone(),
        }
    }
}
