//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Attachment, Checkpoint, Company, Email, MessageId, Person};

/// Trait for durable storage of mirrored mail entities
///
/// This trait abstracts over different storage backends (in-memory, SQLite)
/// and is the narrow interface the sync engine holds on the local store.
///
/// `has_email` is the engine's sole idempotency gate: an email ID that
/// exists is never fetched, parsed, or counted again. The interaction
/// upserts must therefore stay exact under serialized per-message calls.
pub trait MailboxStore: Send + Sync {
    /// Check if an email exists (the idempotency gate)
    fn has_email(&self, id: &MessageId) -> Result<bool>;

    /// Create an email together with its attachments as one logical write.
    ///
    /// Inserting an ID that already exists is a no-op.
    fn insert_email(&self, email: Email, attachments: Vec<Attachment>) -> Result<()>;

    /// Get an email by ID
    fn get_email(&self, id: &MessageId) -> Result<Option<Email>>;

    /// List the attachments owned by an email
    fn list_attachments(&self, email_id: &MessageId) -> Result<Vec<Attachment>>;

    /// Count emails mirrored for a mailbox
    fn count_emails(&self, mailbox_id: &str) -> Result<usize>;

    /// Upsert a person: create with a count of 1, or increment the count
    /// and move `last_interacted` forward (never backward).
    fn record_person_interaction(
        &self,
        mailbox_id: &str,
        address: &str,
        name: Option<&str>,
        company_domain: Option<&str>,
        interacted_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Upsert a company by domain membership: if any company's `domains`
    /// set contains the domain, increment it; otherwise create a new
    /// company named after the domain.
    fn record_company_interaction(
        &self,
        mailbox_id: &str,
        domain: &str,
        interacted_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Get a person by mailbox and lower-cased address
    fn get_person(&self, mailbox_id: &str, address: &str) -> Result<Option<Person>>;

    /// Find the company whose domain set contains the given domain
    fn find_company_by_domain(&self, mailbox_id: &str, domain: &str) -> Result<Option<Company>>;

    /// Get the checkpoint for a mailbox
    fn get_checkpoint(&self, mailbox_id: &str) -> Result<Option<Checkpoint>>;

    /// Save a checkpoint (upsert, never destructive)
    fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
