//! Provider record validation
//!
//! Converts raw provider JSON into [`RemoteMessage`]s. Records missing an id,
//! thread id, sender, or sent time are rejected here so nothing downstream
//! has to guess.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::api::{RawAddress, RawAttachment, RawMessage};
use crate::models::{AddressEntry, EmailId, RemoteAttachment, RemoteMessage, ThreadId};

/// Validate every record of a page
///
/// Returns the valid messages and the number of rejected records.
pub fn decode_records(records: Vec<serde_json::Value>) -> (Vec<RemoteMessage>, usize) {
    let mut messages = Vec::with_capacity(records.len());
    let mut rejected = 0;

    for value in records {
        let id_hint = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("<no id>")
            .to_string();

        let parsed = serde_json::from_value::<RawMessage>(value)
            .context("Record does not match the message schema")
            .and_then(normalize_message);

        match parsed {
            Ok(message) => messages.push(message),
            Err(e) => {
                warn!("Rejecting record {}: {:#}", id_hint, e);
                rejected += 1;
            }
        }
    }

    (messages, rejected)
}

/// Validate one raw record
pub fn normalize_message(raw: RawMessage) -> Result<RemoteMessage> {
    let id = non_empty(raw.id).context("Record has no id")?;
    let thread_id = non_empty(raw.thread_id)
        .with_context(|| format!("Record {} has no threadId", id))?;

    let from = raw
        .from
        .and_then(to_entry)
        .with_context(|| format!("Record {} has no sender address", id))?;

    let sent_at = parse_time(raw.sent_at.as_deref(), "sentAt")?
        .with_context(|| format!("Record {} has no sentAt", id))?;
    let received_at = parse_time(raw.received_at.as_deref(), "receivedAt")?.unwrap_or(sent_at);
    let created_time = parse_time(raw.created_time.as_deref(), "createdTime")?.unwrap_or(sent_at);
    let last_modified_time =
        parse_time(raw.last_modified_time.as_deref(), "lastModifiedTime")?.unwrap_or(created_time);

    let attachments = raw
        .attachments
        .into_iter()
        .filter_map(|a| to_attachment(&id, a))
        .collect::<Vec<_>>();

    Ok(RemoteMessage::builder(EmailId::new(&id), ThreadId::new(thread_id))
        .from(from)
        .to(to_entries(raw.to))
        .cc(to_entries(raw.cc))
        .bcc(to_entries(raw.bcc))
        .reply_to(to_entries(raw.reply_to))
        .subject(raw.subject.unwrap_or_default())
        .created_time(created_time)
        .last_modified_time(last_modified_time)
        .received_at(received_at)
        .sent_at(sent_at)
        .internet_message_id(raw.internet_message_id.unwrap_or_default())
        .sys_labels(raw.sys_labels)
        .keywords(raw.keywords)
        .sys_classifications(raw.sys_classifications)
        .sensitivity(raw.sensitivity.unwrap_or_else(|| "normal".to_string()))
        .meeting_message_method(raw.meeting_message_method)
        .body(raw.body)
        .body_snippet(raw.body_snippet)
        .in_reply_to(raw.in_reply_to)
        .references(raw.references)
        .thread_index(raw.thread_index)
        .internet_headers(raw.internet_headers)
        .native_properties(raw.native_properties)
        .folder_id(raw.folder_id)
        .omitted(raw.omitted)
        .attachments(attachments)
        .has_attachments(raw.has_attachments)
        .build())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_time(value: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
        Err(e) => bail!("Invalid {} timestamp {:?}: {}", field, value, e),
    }
}

/// Prefer the structured address; fall back to parsing the raw header
fn to_entry(raw: RawAddress) -> Option<AddressEntry> {
    let entry = match non_empty(raw.address) {
        Some(address) => AddressEntry {
            name: non_empty(raw.name),
            address: address.trim().to_string(),
            raw: raw.raw,
        },
        None => {
            let parsed = AddressEntry::parse(raw.raw.as_deref()?);
            AddressEntry {
                name: non_empty(raw.name).or(parsed.name),
                ..parsed
            }
        }
    };
    (!entry.address.is_empty()).then_some(entry)
}

fn to_entries(raw: Vec<RawAddress>) -> Vec<AddressEntry> {
    let total = raw.len();
    let entries: Vec<_> = raw.into_iter().filter_map(to_entry).collect();
    if entries.len() < total {
        debug!("Dropped {} recipient entries without an address", total - entries.len());
    }
    entries
}

fn to_attachment(message_id: &str, raw: RawAttachment) -> Option<RemoteAttachment> {
    let Some(id) = non_empty(raw.id) else {
        warn!("Dropping attachment without id on record {}", message_id);
        return None;
    };
    let size = raw
        .size
        .or_else(|| raw.content.as_ref().map(|c| c.len() as i64))
        .unwrap_or(0);

    Some(RemoteAttachment {
        id,
        name: raw.name.unwrap_or_default(),
        mime_type: raw
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size,
        inline: raw.inline,
        content_id: raw.content_id,
        content: raw.content,
        content_location: raw.content_location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Folder;
    use serde_json::json;

    fn record() -> serde_json::Value {
        json!({
            "id": "m1",
            "threadId": "t1",
            "createdTime": "2024-05-01T09:00:00Z",
            "lastModifiedTime": "2024-05-01T09:05:00Z",
            "sentAt": "2024-05-01T09:00:00Z",
            "receivedAt": "2024-05-01T09:00:02Z",
            "internetMessageId": "<abc@example.com>",
            "subject": "Lunch?",
            "sysLabels": ["inbox", "unread"],
            "keywords": [],
            "sysClassifications": ["personal"],
            "sensitivity": "normal",
            "from": { "name": "Alice", "address": "alice@example.com", "raw": "Alice <alice@example.com>" },
            "to": [ { "address": "bob@example.com" }, { "raw": "Carol <carol@example.com>" }, { "name": "nobody" } ],
            "cc": [],
            "bcc": [],
            "replyTo": [],
            "hasAttachments": true,
            "body": "<p>Noon?</p>",
            "bodySnippet": "Noon?",
            "attachments": [
                { "id": "a1", "name": "menu.pdf", "mimeType": "application/pdf", "size": 1024, "inline": false, "content": "JVBERi0=" },
                { "name": "orphan.txt" }
            ],
            "internetHeaders": [ { "name": "X-Mailer", "value": "test" } ],
            "nativeProperties": {},
            "omitted": ["threadId"]
        })
    }

    #[test]
    fn test_normalize_full_record() {
        let (messages, rejected) = decode_records(vec![record()]);
        assert_eq!(rejected, 0);
        let message = &messages[0];

        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.thread_id.as_str(), "t1");
        assert_eq!(message.from.address, "alice@example.com");
        assert_eq!(message.from.name.as_deref(), Some("Alice"));
        assert_eq!(message.folder(), Folder::Inbox);
        assert_eq!(message.subject, "Lunch?");
        assert_eq!(message.received_at.to_rfc3339(), "2024-05-01T09:00:02+00:00");
        assert_eq!(message.last_modified_time.to_rfc3339(), "2024-05-01T09:05:00+00:00");
    }

    #[test]
    fn test_recipients_fall_back_to_raw_and_drop_empty() {
        let (messages, _) = decode_records(vec![record()]);
        let to: Vec<&str> = messages[0].to.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(to, vec!["bob@example.com", "carol@example.com"]);
        assert_eq!(messages[0].to[1].name.as_deref(), Some("Carol"));
    }

    #[test]
    fn test_attachment_without_id_dropped() {
        let (messages, _) = decode_records(vec![record()]);
        assert_eq!(messages[0].attachments.len(), 1);
        assert_eq!(messages[0].attachments[0].id, "a1");
        assert_eq!(messages[0].attachments[0].size, 1024);
        assert!(messages[0].has_attachments);
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let mut no_thread = record();
        no_thread["threadId"] = json!(null);

        let mut no_sender = record();
        no_sender["from"] = json!({ "name": "Ghost" });

        let mut bad_date = record();
        bad_date["sentAt"] = json!("yesterday");

        let (messages, rejected) =
            decode_records(vec![no_thread, no_sender, bad_date, json!("not an object"), record()]);
        assert_eq!(rejected, 4);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_optional_times_default_to_sent_at() {
        let mut minimal = record();
        minimal["receivedAt"] = json!(null);
        minimal["createdTime"] = json!(null);
        minimal["lastModifiedTime"] = json!(null);

        let (messages, _) = decode_records(vec![minimal]);
        let message = &messages[0];
        assert_eq!(message.received_at, message.sent_at);
        assert_eq!(message.created_time, message.sent_at);
        assert_eq!(message.last_modified_time, message.sent_at);
    }
}
