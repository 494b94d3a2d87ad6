//! Per-mailbox sync progress, persisted between runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resume state for one mailbox.
///
/// Created on first run and upserted after each successful step; the engine
/// never deletes it. `last_history_id` drives the incremental path, while
/// `(current_label, next_page_token)` makes an interrupted full sync
/// resumable at page granularity. The orchestrator threads this value
/// through explicitly rather than keeping any ambient sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub mailbox_id: String,
    /// Opaque provider cursor for incremental sync
    pub last_history_id: Option<String>,
    /// Used only by date-windowed full sync
    pub last_internal_date: Option<DateTime<Utc>>,
    /// Full-sync resume position: next page within `current_label`
    pub next_page_token: Option<String>,
    /// Full-sync resume position: label currently being paged
    pub current_label: Option<String>,
}

impl Checkpoint {
    /// Create an empty checkpoint for a mailbox that has never synced
    pub fn new(mailbox_id: impl Into<String>) -> Self {
        Self {
            mailbox_id: mailbox_id.into(),
            last_history_id: None,
            last_internal_date: None,
            next_page_token: None,
            current_label: None,
        }
    }

    /// Advance the incremental cursor after a successful history call.
    ///
    /// Called whether or not the delta contained messages, so the history
    /// window never goes stale from inactivity.
    pub fn advanced_incremental(mut self, history_id: impl Into<String>) -> Self {
        self.last_history_id = Some(history_id.into());
        self
    }

    /// Record the full-sync resume position: the next page to fetch
    /// within `label`. A `None` token means the label's first page, used
    /// when the walk moves on to a fresh label.
    pub fn advanced_page(mut self, label: impl Into<String>, next_page_token: Option<String>) -> Self {
        self.current_label = Some(label.into());
        self.next_page_token = next_page_token;
        self
    }

    /// Install a fresh incremental baseline after full sync completes,
    /// clearing the paging state so future runs take the cheap path.
    pub fn completed_full_sync(mut self, history_id: impl Into<String>) -> Self {
        self.last_history_id = Some(history_id.into());
        self.next_page_token = None;
        self.current_label = None;
        self
    }

    /// Whether the next run can attempt incremental sync
    pub fn supports_incremental(&self) -> bool {
        self.last_history_id.is_some()
    }
}
