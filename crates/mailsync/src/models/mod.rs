//! Domain models for synced mailbox data

mod account;
mod address;
mod attachment;
mod email;
mod folder;
mod message;
mod thread;

pub use account::Account;
pub use address::{AddressEntry, AddressId, EmailAddress};
pub use attachment::Attachment;
pub use email::{Email, EmailId, Recipients};
pub use folder::{Folder, FolderFlags};
pub use message::{RemoteAttachment, RemoteMessage, RemoteMessageBuilder};
pub use thread::{Thread, ThreadId, ThreadUpsert};
