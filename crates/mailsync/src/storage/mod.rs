//! Storage layer for mirrored mail
//!
//! Two stores with distinct roles:
//! - [`MailboxStore`]: structured metadata (emails, attachments, the
//!   interaction graph, sync checkpoints)
//! - [`BlobStore`]: large content (HTML bodies, attachment bytes),
//!   addressed by key and referenced from metadata via [`BlobRef`]

mod blob;
mod blob_file;
mod memory;
mod sqlite;
mod traits;

pub use blob::{BlobRef, BlobStore, attachment_key, email_html_key};
pub use blob_file::FileBlobStore;
pub use memory::InMemoryMailboxStore;
pub use sqlite::SqliteMailboxStore;
pub use traits::MailboxStore;
