//! Mailbox sync orchestration
//!
//! One [`sync_mailbox`] run moves a mailbox forward by exactly one of two
//! paths, chosen from its checkpoint:
//! - incremental: replay provider history since the stored cursor
//! - full: page through every tracked label, checkpointing per page
//!
//! An expired cursor demotes the run from incremental to full; completing
//! a full sync installs a fresh cursor so the next run is incremental
//! again. All progress is threaded through the [`Checkpoint`] value and
//! persisted via the store, never held in globals.

use std::collections::HashSet;

use anyhow::Result;
use log::{error, info, warn};

use super::processor::{ProcessOutcome, process_message};
use crate::config::SyncConfig;
use crate::models::{Checkpoint, MessageId};
use crate::remote::{CursorExpiredError, MessageRef, RemoteMailbox};
use crate::storage::{BlobStore, MailboxStore};

/// Statistics from a sync operation
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Number of message references seen from the remote
    pub messages_fetched: usize,
    /// Number of new messages stored
    pub messages_stored: usize,
    /// Number of messages skipped (already mirrored)
    pub messages_skipped: usize,
    /// Number of full-sync pages processed
    pub pages: usize,
    /// Number of per-message errors encountered
    pub errors: usize,
    /// Whether this run took the full-sync path
    pub full_sync: bool,
    /// Whether an expired cursor forced the full-sync path
    pub cursor_expired: bool,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Sync one mailbox from the remote into local storage
///
/// Idempotent: re-running after any interruption resumes from the stored
/// checkpoint without duplicating messages or graph counts.
pub fn sync_mailbox(
    remote: &dyn RemoteMailbox,
    store: &dyn MailboxStore,
    blobs: &dyn BlobStore,
    config: &SyncConfig,
    mailbox_id: &str,
) -> Result<SyncStats> {
    let start = std::time::Instant::now();
    let mut stats = SyncStats::default();

    let checkpoint = store
        .get_checkpoint(mailbox_id)?
        .unwrap_or_else(|| Checkpoint::new(mailbox_id));

    // A full sync in progress takes priority over the cursor; mixing the
    // two paths in one run would leave gaps.
    let resuming_full_sync = checkpoint.current_label.is_some();

    if checkpoint.supports_incremental() && !resuming_full_sync {
        match incremental_sync(remote, store, blobs, mailbox_id, &checkpoint, &mut stats) {
            Ok(()) => {
                stats.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(stats);
            }
            Err(e) if e.downcast_ref::<CursorExpiredError>().is_some() => {
                warn!(
                    "[SYNC] Cursor expired for {}, falling back to full sync",
                    mailbox_id
                );
                stats.cursor_expired = true;
            }
            Err(e) => return Err(e),
        }
    }

    full_sync(remote, store, blobs, config, mailbox_id, checkpoint, &mut stats)?;

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Replay provider history since the checkpoint's cursor
///
/// The cursor only advances once every addition in the delta has been
/// handled, so a crash mid-delta replays it (idempotently) next run.
fn incremental_sync(
    remote: &dyn RemoteMailbox,
    store: &dyn MailboxStore,
    blobs: &dyn BlobStore,
    mailbox_id: &str,
    checkpoint: &Checkpoint,
    stats: &mut SyncStats,
) -> Result<()> {
    let cursor = checkpoint
        .last_history_id
        .as_deref()
        .unwrap_or_default();

    let delta = remote.list_history_since(cursor)?;

    info!(
        "[SYNC] Incremental sync for {}: {} additions since cursor {}",
        mailbox_id,
        delta.added.len(),
        cursor
    );

    let ids = resolve_threads(remote, &delta.added);
    stats.messages_fetched += ids.len();

    for id in &ids {
        process_and_count(remote, store, blobs, mailbox_id, id, stats);
    }

    if stats.errors > 0 {
        // Leave the cursor in place; the failed messages are retried on
        // the next run and the stored ones skip via the existence gate.
        warn!(
            "[SYNC] {} errors during incremental sync for {}, cursor not advanced",
            stats.errors, mailbox_id
        );
        return Ok(());
    }

    store.save_checkpoint(checkpoint.clone().advanced_incremental(delta.new_cursor))?;
    Ok(())
}

/// Page through every tracked label, checkpointing after each page
///
/// Resumes from `(current_label, next_page_token)` when the previous run
/// was interrupted; labels before `current_label` were already exhausted
/// and are not revisited.
fn full_sync(
    remote: &dyn RemoteMailbox,
    store: &dyn MailboxStore,
    blobs: &dyn BlobStore,
    config: &SyncConfig,
    mailbox_id: &str,
    mut checkpoint: Checkpoint,
    stats: &mut SyncStats,
) -> Result<()> {
    stats.full_sync = true;

    let labels: Vec<&str> = match checkpoint.current_label.as_deref() {
        Some(current) => {
            let position = config
                .tracked_labels
                .iter()
                .position(|l| l == current)
                .unwrap_or(0);
            config.tracked_labels[position..].iter().map(String::as_str).collect()
        }
        None => config.tracked_labels.iter().map(String::as_str).collect(),
    };

    info!(
        "[SYNC] Full sync for {} over labels {:?}",
        mailbox_id, labels
    );

    let mut page_token = checkpoint.next_page_token.clone();

    for (label_index, &label) in labels.iter().enumerate() {
        loop {
            let page = remote.list_messages(label, config.page_size, page_token.as_deref())?;
            stats.pages += 1;

            let ids = resolve_threads(remote, &page.messages);
            stats.messages_fetched += ids.len();

            let errors_before = stats.errors;
            let mut latest_date = checkpoint.last_internal_date;

            for id in &ids {
                if process_and_count(remote, store, blobs, mailbox_id, id, stats)
                    && let Ok(Some(email)) = store.get_email(id)
                    && email.internal_date > latest_date
                {
                    latest_date = email.internal_date;
                }
            }

            if stats.errors > errors_before {
                // Stop without advancing past this page so the next run
                // retries it.
                warn!(
                    "[SYNC] Errors on page {} of label {} for {}, stopping",
                    stats.pages, label, mailbox_id
                );
                return Ok(());
            }

            checkpoint.last_internal_date = latest_date;

            match page.next_page_token {
                Some(token) => {
                    checkpoint = checkpoint.advanced_page(label, Some(token.clone()));
                    store.save_checkpoint(checkpoint.clone())?;
                    page_token = Some(token);
                }
                None => {
                    // Label exhausted; park the checkpoint at the start of
                    // the next one so a crash here never re-lists this label.
                    if let Some(&next_label) = labels.get(label_index + 1) {
                        checkpoint = checkpoint.advanced_page(next_label, None);
                        store.save_checkpoint(checkpoint.clone())?;
                    }
                    page_token = None;
                    break;
                }
            }
        }
    }

    // Baseline the cursor at the provider's current position; additions
    // that raced the listing surface in the first incremental run.
    let current = remote.current_cursor()?;
    store.save_checkpoint(checkpoint.completed_full_sync(current))?;

    info!(
        "[SYNC] Full sync complete for {}: {} stored, {} skipped",
        mailbox_id, stats.messages_stored, stats.messages_skipped
    );

    Ok(())
}

/// Expand message references to the full membership of their threads
///
/// A reply that arrives via history pulls its whole thread in, so earlier
/// thread members missed for any reason get mirrored too. Each thread is
/// resolved once and IDs are deduplicated across the batch. Resolution
/// failures degrade to processing just the referenced message.
fn resolve_threads(remote: &dyn RemoteMailbox, refs: &[MessageRef]) -> Vec<MessageId> {
    fn push(ids: &mut Vec<MessageId>, seen: &mut HashSet<String>, id: &MessageId) {
        if seen.insert(id.as_str().to_string()) {
            ids.push(id.clone());
        }
    }

    let mut seen_ids = HashSet::new();
    let mut resolved_threads = HashSet::new();
    let mut ids = Vec::new();

    for msg_ref in refs {
        let Some(thread_id) = &msg_ref.thread_id else {
            push(&mut ids, &mut seen_ids, &msg_ref.id);
            continue;
        };

        if !resolved_threads.insert(thread_id.as_str().to_string()) {
            continue;
        }

        match remote.get_thread(thread_id) {
            Ok(members) if !members.is_empty() => {
                for member in &members {
                    push(&mut ids, &mut seen_ids, &member.id);
                }
            }
            Ok(_) => push(&mut ids, &mut seen_ids, &msg_ref.id),
            Err(e) => {
                warn!(
                    "[SYNC] Failed to resolve thread {}: {}",
                    thread_id.as_str(),
                    e
                );
                push(&mut ids, &mut seen_ids, &msg_ref.id);
            }
        }
    }

    ids
}

/// Process one message, folding the outcome into the stats
///
/// Returns true when the message was newly stored.
fn process_and_count(
    remote: &dyn RemoteMailbox,
    store: &dyn MailboxStore,
    blobs: &dyn BlobStore,
    mailbox_id: &str,
    id: &MessageId,
    stats: &mut SyncStats,
) -> bool {
    match process_message(remote, store, blobs, mailbox_id, id) {
        Ok(ProcessOutcome::Stored) => {
            stats.messages_stored += 1;
            true
        }
        Ok(ProcessOutcome::Skipped) => {
            stats.messages_skipped += 1;
            false
        }
        Err(e) => {
            error!("[SYNC] Failed to process message {}: {}", id.as_str(), e);
            stats.errors += 1;
            false
        }
    }
}
