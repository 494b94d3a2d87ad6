//! Per-message processing pipeline
//!
//! Fetches, parses, offloads and stores one remote message. The pipeline
//! is idempotent: the existence check up front is the sole gate, and a
//! message that exists locally is never touched again.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, warn};

use crate::graph::record_interactions;
use crate::mime::{ParsedMessage, parse_message};
use crate::models::{Attachment, Email, MessageId};
use crate::remote::RemoteMailbox;
use crate::storage::{BlobStore, MailboxStore, attachment_key, email_html_key};

/// Outcome of processing a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Fetched, stored and counted into the graph
    Stored,
    /// Already mirrored locally; nothing was done
    Skipped,
}

/// Process one remote message into local storage
///
/// Fetch and parse failures propagate to the caller; blob offload failures
/// degrade instead (the email row is still written, minus the blob).
pub fn process_message(
    remote: &dyn RemoteMailbox,
    store: &dyn MailboxStore,
    blobs: &dyn BlobStore,
    mailbox_id: &str,
    id: &MessageId,
) -> Result<ProcessOutcome> {
    if store.has_email(id)? {
        debug!("[SYNC] Message {} already mirrored, skipping", id.as_str());
        return Ok(ProcessOutcome::Skipped);
    }

    let raw = remote
        .get_raw_message(id)
        .with_context(|| format!("Failed to fetch message {}", id.as_str()))?;

    let parsed = parse_message(&raw.raw)
        .with_context(|| format!("Failed to parse message {}", id.as_str()))?;

    let attachments = offload_attachments(blobs, id, &parsed);

    let html = parsed
        .html
        .as_deref()
        .map(|html| rewrite_cid_references(html, &attachments));

    let html_ref = match html {
        Some(html) => {
            match blobs.put(&email_html_key(id.as_str()), html.as_bytes(), "text/html") {
                Ok(blob_ref) => Some(blob_ref),
                Err(e) => {
                    warn!("[SYNC] HTML offload failed for {}: {}", id.as_str(), e);
                    None
                }
            }
        }
        None => None,
    };

    let snippet = parsed.text.as_deref().map(derive_snippet);

    let interacted_at = raw
        .internal_date
        .or(parsed.date)
        .unwrap_or_else(Utc::now);

    let is_read = !raw.label_ids.iter().any(|l| l == "UNREAD");

    let email = Email::builder(id.clone(), mailbox_id)
        .subject(parsed.subject.clone())
        .from(parsed.from.first().cloned())
        .snippet(snippet)
        .internal_date(raw.internal_date.or(parsed.date))
        .is_read(is_read)
        .label_ids(raw.label_ids.clone())
        .thread_id(raw.thread_id.clone())
        .message_id_header(parsed.message_id.clone())
        .in_reply_to(parsed.in_reply_to.clone())
        .references(parsed.references.clone())
        .html_ref(html_ref)
        .text(parsed.text.clone())
        .build();

    store.insert_email(email, attachments)?;

    record_interactions(store, mailbox_id, &parsed, interacted_at)?;

    Ok(ProcessOutcome::Stored)
}

/// Offload attachment bytes to blob storage
///
/// Only parts with both a filename and content are offloaded; nameless
/// parts are dropped. An attachment whose offload fails is dropped with a
/// warning; the message itself still gets stored.
fn offload_attachments(
    blobs: &dyn BlobStore,
    id: &MessageId,
    parsed: &ParsedMessage,
) -> Vec<Attachment> {
    let mut attachments = Vec::new();

    for part in &parsed.attachments {
        let Some(filename) = part.filename.clone() else {
            debug!("[SYNC] Dropping nameless attachment part on {}", id.as_str());
            continue;
        };
        if part.data.is_empty() {
            continue;
        }

        let key = attachment_key(id.as_str(), &filename);
        match blobs.put(&key, &part.data, &part.content_type) {
            Ok(content_ref) => attachments.push(Attachment {
                id: Attachment::derive_id(id, &filename),
                email_id: id.clone(),
                filename,
                content_type: part.content_type.clone(),
                size: part.data.len() as u64,
                content_ref,
                content_id: part.content_id.clone(),
            }),
            Err(e) => {
                warn!(
                    "[SYNC] Attachment offload failed for {} ({}): {}",
                    id.as_str(),
                    filename,
                    e
                );
            }
        }
    }

    attachments
}

/// Rewrite `cid:` references in an HTML body to offloaded attachment refs
///
/// Only attachments that both carry a Content-ID and were successfully
/// offloaded are rewritten; unresolved references are left as-is.
fn rewrite_cid_references(html: &str, attachments: &[Attachment]) -> String {
    let mut rewritten = html.to_string();

    for attachment in attachments {
        if let Some(content_id) = &attachment.content_id {
            let needle = format!("cid:{}", content_id);
            rewritten = rewritten.replace(&needle, attachment.content_ref.as_str());
        }
    }

    rewritten
}

/// First 200 characters of the text body, on char boundaries
fn derive_snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadId;
    use crate::remote::{HistoryDelta, MessagePage, RawRemoteMessage};
    use crate::storage::{BlobRef, InMemoryMailboxStore};
    use anyhow::bail;

    const MAILBOX: &str = "user@example.com";

    struct FixedRemote {
        raw: Vec<u8>,
        label_ids: Vec<String>,
        snippet: Option<String>,
    }

    impl RemoteMailbox for FixedRemote {
        fn list_messages(
            &self,
            _label: &str,
            _page_size: usize,
            _page_token: Option<&str>,
        ) -> Result<MessagePage> {
            unimplemented!()
        }

        fn get_raw_message(&self, id: &MessageId) -> Result<RawRemoteMessage> {
            Ok(RawRemoteMessage {
                id: id.clone(),
                thread_id: Some(ThreadId::new("t1")),
                label_ids: self.label_ids.clone(),
                internal_date: Some(Utc::now()),
                snippet: self.snippet.clone(),
                raw: self.raw.clone(),
            })
        }

        fn get_thread(&self, _thread_id: &ThreadId) -> Result<Vec<crate::remote::MessageRef>> {
            Ok(Vec::new())
        }

        fn list_history_since(&self, _cursor: &str) -> Result<HistoryDelta> {
            unimplemented!()
        }

        fn current_cursor(&self) -> Result<String> {
            Ok("1".to_string())
        }
    }

    /// Blob store that refuses every write
    struct FailingBlobStore;

    impl BlobStore for FailingBlobStore {
        fn put(&self, _key: &str, _data: &[u8], _content_type: &str) -> Result<BlobRef> {
            bail!("disk full")
        }
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        fn exists(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn raw_with_attachment() -> Vec<u8> {
        b"From: Alice <alice@acme.io>\r\n\
          To: bob@widgets.example\r\n\
          Subject: With attachment\r\n\
          Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
          \r\n\
          --outer\r\n\
          Content-Type: text/html; charset=utf-8\r\n\
          \r\n\
          <p>Logo: <img src=\"cid:logo@acme.io\"></p>\r\n\
          --outer\r\n\
          Content-Type: image/png\r\n\
          Content-ID: <logo@acme.io>\r\n\
          Content-Disposition: attachment; filename=\"logo.png\"\r\n\
          Content-Transfer-Encoding: base64\r\n\
          \r\n\
          iVBORw0KGgo=\r\n\
          --outer--\r\n"
            .to_vec()
    }

    fn file_blobs() -> (crate::storage::FileBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = crate::storage::FileBlobStore::new(dir.path().join("blobs")).unwrap();
        (blobs, dir)
    }

    #[test]
    fn test_process_stores_once() {
        let remote = FixedRemote {
            raw: raw_with_attachment(),
            label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
            snippet: None,
        };
        let store = InMemoryMailboxStore::new();
        let (blobs, _dir) = file_blobs();
        let id = MessageId::new("m1");

        let outcome = process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();
        assert_eq!(outcome, ProcessOutcome::Stored);

        let outcome = process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);

        let email = store.get_email(&id).unwrap().unwrap();
        assert_eq!(email.subject.as_deref(), Some("With attachment"));
        assert!(!email.is_read);
        assert!(email.html_ref.is_some());

        // Counted exactly once despite the second call
        let alice = store.get_person(MAILBOX, "alice@acme.io").unwrap().unwrap();
        assert_eq!(alice.interaction_count, 1);
    }

    #[test]
    fn test_cid_rewritten_in_offloaded_html() {
        let remote = FixedRemote {
            raw: raw_with_attachment(),
            label_ids: vec!["INBOX".to_string()],
            snippet: None,
        };
        let store = InMemoryMailboxStore::new();
        let (blobs, _dir) = file_blobs();
        let id = MessageId::new("m1");

        process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();

        let attachments = store.list_attachments(&id).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "logo.png");

        let html_bytes = blobs.get(&email_html_key("m1")).unwrap().unwrap();
        let html = String::from_utf8(html_bytes).unwrap();
        assert!(!html.contains("cid:logo@acme.io"));
        assert!(html.contains(attachments[0].content_ref.as_str()));
    }

    #[test]
    fn test_blob_failure_degrades_without_losing_email() {
        let remote = FixedRemote {
            raw: raw_with_attachment(),
            label_ids: vec!["INBOX".to_string()],
            snippet: None,
        };
        let store = InMemoryMailboxStore::new();
        let id = MessageId::new("m1");

        let outcome = process_message(&remote, &store, &FailingBlobStore, MAILBOX, &id).unwrap();
        assert_eq!(outcome, ProcessOutcome::Stored);

        let email = store.get_email(&id).unwrap().unwrap();
        assert!(email.html_ref.is_none());
        assert!(store.list_attachments(&id).unwrap().is_empty());
    }

    #[test]
    fn test_snippet_ignores_provider_snippet() {
        let raw = b"From: alice@acme.io\r\nSubject: Hi\r\n\
            Content-Type: text/plain\r\n\r\nThe actual body text.\r\n"
            .to_vec();
        let remote = FixedRemote {
            raw,
            label_ids: Vec::new(),
            snippet: Some("PROVIDER SNIPPET".to_string()),
        };
        let store = InMemoryMailboxStore::new();
        let (blobs, _dir) = file_blobs();
        let id = MessageId::new("m3");

        process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();

        let email = store.get_email(&id).unwrap().unwrap();
        let snippet = email.snippet.unwrap();
        assert!(email.text.unwrap().starts_with(&snippet));
        assert!(snippet.starts_with("The actual body text."));
    }

    #[test]
    fn test_nameless_attachment_parts_are_dropped() {
        let raw = b"From: alice@acme.io\r\n\
            Subject: Nameless part\r\n\
            Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
            \r\n\
            --outer\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Body.\r\n\
            --outer\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            JVBERi0xLjQ=\r\n\
            --outer--\r\n"
            .to_vec();
        let remote = FixedRemote {
            raw,
            label_ids: Vec::new(),
            snippet: None,
        };
        let store = InMemoryMailboxStore::new();
        let (blobs, _dir) = file_blobs();
        let id = MessageId::new("m4");

        let outcome = process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();
        assert_eq!(outcome, ProcessOutcome::Stored);
        assert!(store.list_attachments(&id).unwrap().is_empty());
    }

    #[test]
    fn test_snippet_derived_from_text() {
        let body = "x".repeat(500);
        let raw = format!(
            "From: alice@acme.io\r\nSubject: Long\r\nContent-Type: text/plain\r\n\r\n{}",
            body
        );
        let remote = FixedRemote {
            raw: raw.into_bytes(),
            label_ids: Vec::new(),
            snippet: None,
        };
        let store = InMemoryMailboxStore::new();
        let (blobs, _dir) = file_blobs();
        let id = MessageId::new("m2");

        process_message(&remote, &store, &blobs, MAILBOX, &id).unwrap();

        let email = store.get_email(&id).unwrap().unwrap();
        assert_eq!(email.snippet.unwrap().chars().count(), 200);
        // No UNREAD label means the message reads as seen
        assert!(email.is_read);
    }
}
