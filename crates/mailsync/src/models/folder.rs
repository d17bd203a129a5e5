//! Folder classification derived from provider system labels

use serde::{Deserialize, Serialize};

/// The folder an email is filed under
///
/// Derived once at ingestion time from the provider's system labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    Inbox,
    Sent,
    Draft,
}

impl Folder {
    // Provider system labels that drive classification
    pub const INBOX_LABEL: &'static str = "inbox";
    pub const IMPORTANT_LABEL: &'static str = "important";
    pub const SENT_LABEL: &'static str = "sent";
    pub const DRAFT_LABEL: &'static str = "draft";

    /// Classify a message by its system labels
    ///
    /// Priority is inbox/important, then sent, then draft. Messages with none
    /// of these labels land in the inbox.
    pub fn classify<S: AsRef<str>>(sys_labels: &[S]) -> Self {
        let has = |wanted: &str| sys_labels.iter().any(|l| l.as_ref() == wanted);

        if has(Self::INBOX_LABEL) || has(Self::IMPORTANT_LABEL) {
            Folder::Inbox
        } else if has(Self::SENT_LABEL) {
            Folder::Sent
        } else if has(Self::DRAFT_LABEL) {
            Folder::Draft
        } else {
            Folder::Inbox
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Inbox => "inbox",
            Folder::Sent => "sent",
            Folder::Draft => "draft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(Folder::Inbox),
            "sent" => Some(Folder::Sent),
            "draft" => Some(Folder::Draft),
            _ => None,
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folder status flags of a thread
///
/// Exactly one is set while the thread holds emails; none once every email
/// has moved to another thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderFlags {
    pub inbox: bool,
    pub draft: bool,
    pub sent: bool,
}

impl FolderFlags {
    /// Flags for a thread filed under a single folder
    pub fn for_folder(folder: Folder) -> Self {
        Self {
            inbox: folder == Folder::Inbox,
            draft: folder == Folder::Draft,
            sent: folder == Folder::Sent,
        }
    }

    /// Derive a thread's flags from the folders of all its emails
    ///
    /// Any inbox email makes the whole thread inbox. Otherwise any draft makes
    /// it a draft. Otherwise it is sent. No emails means no flag at all.
    pub fn from_folders<I>(folders: I) -> Self
    where
        I: IntoIterator<Item = Folder>,
    {
        let mut folder = None;
        for f in folders {
            match f {
                Folder::Inbox => {
                    folder = Some(Folder::Inbox);
                    break;
                }
                Folder::Draft => folder = Some(Folder::Draft),
                Folder::Sent => {
                    folder.get_or_insert(Folder::Sent);
                }
            }
        }
        folder.map(Self::for_folder).unwrap_or_default()
    }

    /// The single folder these flags select, if any
    pub fn folder(&self) -> Option<Folder> {
        if self.inbox {
            Some(Folder::Inbox)
        } else if self.draft {
            Some(Folder::Draft)
        } else if self.sent {
            Some(Folder::Sent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        assert_eq!(Folder::classify(&["sent", "inbox"]), Folder::Inbox);
        assert_eq!(Folder::classify(&["important", "draft"]), Folder::Inbox);
        assert_eq!(Folder::classify(&["draft", "sent"]), Folder::Sent);
        assert_eq!(Folder::classify(&["draft"]), Folder::Draft);
    }

    #[test]
    fn test_classify_defaults_to_inbox() {
        let none: [&str; 0] = [];
        assert_eq!(Folder::classify(&none), Folder::Inbox);
        assert_eq!(Folder::classify(&["flagged", "junk"]), Folder::Inbox);
    }

    #[test]
    fn test_flags_inbox_wins() {
        let flags = FolderFlags::from_folders([Folder::Draft, Folder::Sent, Folder::Inbox]);
        assert_eq!(flags, FolderFlags::for_folder(Folder::Inbox));
    }

    #[test]
    fn test_flags_draft_beats_sent() {
        let flags = FolderFlags::from_folders([Folder::Sent, Folder::Draft, Folder::Sent]);
        assert!(flags.draft);
        assert!(!flags.inbox);
        assert!(!flags.sent);
    }

    #[test]
    fn test_flags_empty_selects_nothing() {
        let flags = FolderFlags::from_folders(std::iter::empty());
        assert_eq!(flags, FolderFlags::default());
        assert_eq!(flags.folder(), None);
    }

    #[test]
    fn test_flags_sent_only() {
        let flags = FolderFlags::from_folders([Folder::Sent, Folder::Sent]);
        assert_eq!(flags.folder(), Some(Folder::Sent));
    }

    #[test]
    fn test_parse_round_trips_names() {
        for folder in [Folder::Inbox, Folder::Sent, Folder::Draft] {
            assert_eq!(Folder::parse(folder.as_str()), Some(folder));
        }
        assert_eq!(Folder::parse("trash"), None);
    }
}
