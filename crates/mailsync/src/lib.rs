//! Mailsync - resumable mailbox mirroring
//!
//! This crate mirrors a remote mailbox into local storage and maintains a
//! contact graph derived from message traffic:
//! - Domain models (Email, Attachment, Person, Company, Checkpoint)
//! - Remote mailbox trait with a Gmail-backed implementation
//! - MIME parsing of raw messages
//! - Blob offload for HTML bodies and attachments
//! - Storage trait abstractions (in-memory and SQLite)
//! - Idempotent, checkpoint-resumable sync engine
//!
//! All I/O is synchronous; the crate is executor-agnostic and has no UI
//! dependencies.

pub mod config;
pub mod graph;
pub mod mime;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use graph::{extract_domain, record_interactions};
pub use mime::{ParsedAttachment, ParsedMessage, parse_message};
pub use models::{
    Attachment, Checkpoint, Company, Email, EmailAddress, EmailBuilder, MessageId, Person,
    ThreadId,
};
pub use remote::{
    CursorExpiredError, GmailRemote, HistoryDelta, MessagePage, MessageRef, RawRemoteMessage,
    RemoteMailbox, TokenSource,
};
pub use storage::{
    BlobRef, BlobStore, FileBlobStore, InMemoryMailboxStore, MailboxStore, SqliteMailboxStore,
    attachment_key, email_html_key,
};
pub use sync::{ProcessOutcome, SyncStats, process_message, sync_mailbox};
