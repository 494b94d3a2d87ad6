//! Remote mailbox abstraction
//!
//! The sync engine talks to the remote provider through the
//! [`RemoteMailbox`] trait; [`GmailRemote`] is the Gmail-backed
//! implementation. Tests substitute a fake.

mod gmail;

pub use gmail::{GmailRemote, TokenSource};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{MessageId, ThreadId};

/// Error indicating the incremental sync cursor has expired
///
/// The provider only retains change history for a bounded window. When a
/// stored cursor falls outside it, incremental sync is impossible and the
/// engine must fall back to a full listing.
#[derive(Debug, thiserror::Error)]
#[error("Sync cursor expired or invalid")]
pub struct CursorExpiredError;

/// Lightweight reference to a remote message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: MessageId,
    pub thread_id: Option<ThreadId>,
}

/// One page of a label listing
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

/// A full message as fetched from the provider: remote metadata plus the
/// raw RFC 2822 bytes.
#[derive(Debug, Clone)]
pub struct RawRemoteMessage {
    pub id: MessageId,
    pub thread_id: Option<ThreadId>,
    pub label_ids: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
    pub snippet: Option<String>,
    pub raw: Vec<u8>,
}

/// Changes since a cursor
///
/// `new_cursor` is the cursor to store after all of `added` has been
/// processed; replaying from it yields no already-seen additions.
#[derive(Debug, Clone)]
pub struct HistoryDelta {
    pub added: Vec<MessageRef>,
    pub new_cursor: String,
}

/// Trait over the remote mail provider
///
/// All methods are synchronous; the engine drives them from its own loop.
pub trait RemoteMailbox: Send + Sync {
    /// List one page of message references for a label
    fn list_messages(
        &self,
        label: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetch a message's metadata and raw bytes
    fn get_raw_message(&self, id: &MessageId) -> Result<RawRemoteMessage>;

    /// List the message references belonging to a thread
    fn get_thread(&self, thread_id: &ThreadId) -> Result<Vec<MessageRef>>;

    /// List additions since the given cursor
    ///
    /// # Errors
    /// Fails with [`CursorExpiredError`] when the cursor is no longer
    /// within the provider's retained history window.
    fn list_history_since(&self, cursor: &str) -> Result<HistoryDelta>;

    /// Get the provider's current cursor, valid as a future starting point
    fn current_cursor(&self) -> Result<String>;
}
