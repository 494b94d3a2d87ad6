//! Sync engine
//!
//! [`sync_mailbox`] orchestrates a run; [`process_message`] handles one
//! message end to end.

mod engine;
mod processor;

pub use engine::{SyncStats, sync_mailbox};
pub use processor::{ProcessOutcome, process_message};
