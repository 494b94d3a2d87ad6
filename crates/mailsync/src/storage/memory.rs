//! In-memory storage implementation
//!
//! Used for tests and as a stub where no durable store is configured.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::MailboxStore;
use crate::models::{Attachment, Checkpoint, Company, Email, MessageId, Person};

/// In-memory implementation of MailboxStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryMailboxStore {
    emails: RwLock<HashMap<String, Email>>,
    attachments: RwLock<HashMap<String, Vec<Attachment>>>,
    /// Keyed by (mailbox_id, lower-cased address)
    people: RwLock<HashMap<(String, String), Person>>,
    /// Companies per mailbox; membership is scanned over the domain sets
    companies: RwLock<HashMap<String, Vec<Company>>>,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryMailboxStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            emails: RwLock::new(HashMap::new()),
            attachments: RwLock::new(HashMap::new()),
            people: RwLock::new(HashMap::new()),
            companies: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMailboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxStore for InMemoryMailboxStore {
    fn has_email(&self, id: &MessageId) -> Result<bool> {
        let emails = self.emails.read().unwrap();
        Ok(emails.contains_key(&id.0))
    }

    fn insert_email(&self, email: Email, attachments: Vec<Attachment>) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        if emails.contains_key(&email.id.0) {
            return Ok(());
        }

        let mut stored_attachments = self.attachments.write().unwrap();
        stored_attachments.insert(email.id.0.clone(), attachments);
        emails.insert(email.id.0.clone(), email);
        Ok(())
    }

    fn get_email(&self, id: &MessageId) -> Result<Option<Email>> {
        let emails = self.emails.read().unwrap();
        Ok(emails.get(&id.0).cloned())
    }

    fn list_attachments(&self, email_id: &MessageId) -> Result<Vec<Attachment>> {
        let attachments = self.attachments.read().unwrap();
        Ok(attachments.get(&email_id.0).cloned().unwrap_or_default())
    }

    fn count_emails(&self, mailbox_id: &str) -> Result<usize> {
        let emails = self.emails.read().unwrap();
        Ok(emails.values().filter(|e| e.mailbox_id == mailbox_id).count())
    }

    fn record_person_interaction(
        &self,
        mailbox_id: &str,
        address: &str,
        name: Option<&str>,
        company_domain: Option<&str>,
        interacted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut people = self.people.write().unwrap();
        let key = (mailbox_id.to_string(), address.to_string());

        if let Some(person) = people.get_mut(&key) {
            person.interaction_count += 1;
            if interacted_at > person.last_interacted {
                person.last_interacted = interacted_at;
            }
            if person.name.is_none() {
                person.name = name.map(ToOwned::to_owned);
            }
        } else {
            people.insert(
                key,
                Person::new(
                    mailbox_id,
                    address,
                    name.map(ToOwned::to_owned),
                    company_domain.map(ToOwned::to_owned),
                    interacted_at,
                ),
            );
        }

        Ok(())
    }

    fn record_company_interaction(
        &self,
        mailbox_id: &str,
        domain: &str,
        interacted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut companies = self.companies.write().unwrap();
        let entries = companies.entry(mailbox_id.to_string()).or_default();

        if let Some(company) = entries.iter_mut().find(|c| c.domains.contains(domain)) {
            company.interaction_count += 1;
            if interacted_at > company.last_interacted {
                company.last_interacted = interacted_at;
            }
        } else {
            entries.push(Company::from_domain(mailbox_id, domain, interacted_at));
        }

        Ok(())
    }

    fn get_person(&self, mailbox_id: &str, address: &str) -> Result<Option<Person>> {
        let people = self.people.read().unwrap();
        Ok(people
            .get(&(mailbox_id.to_string(), address.to_string()))
            .cloned())
    }

    fn find_company_by_domain(&self, mailbox_id: &str, domain: &str) -> Result<Option<Company>> {
        let companies = self.companies.read().unwrap();
        Ok(companies
            .get(mailbox_id)
            .and_then(|entries| entries.iter().find(|c| c.domains.contains(domain)))
            .cloned())
    }

    fn get_checkpoint(&self, mailbox_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().unwrap();
        Ok(checkpoints.get(mailbox_id).cloned())
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        checkpoints.insert(checkpoint.mailbox_id.clone(), checkpoint);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.emails.write().unwrap().clear();
        self.attachments.write().unwrap().clear();
        self.people.write().unwrap().clear();
        self.companies.write().unwrap().clear();
        self.checkpoints.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Email;

    const MAILBOX: &str = "user@example.com";

    fn make_test_email(id: &str) -> Email {
        Email::builder(MessageId::new(id), MAILBOX)
            .subject(Some("Test".to_string()))
            .text(Some("Test body".to_string()))
            .build()
    }

    #[test]
    fn test_insert_and_get_email() {
        let store = InMemoryMailboxStore::new();

        assert!(!store.has_email(&MessageId::new("m1")).unwrap());
        store.insert_email(make_test_email("m1"), Vec::new()).unwrap();
        assert!(store.has_email(&MessageId::new("m1")).unwrap());

        let email = store.get_email(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(email.subject.as_deref(), Some("Test"));
    }

    #[test]
    fn test_insert_email_is_create_once() {
        let store = InMemoryMailboxStore::new();

        store.insert_email(make_test_email("m1"), Vec::new()).unwrap();

        let mut replacement = make_test_email("m1");
        replacement.subject = Some("Changed".to_string());
        store.insert_email(replacement, Vec::new()).unwrap();

        let email = store.get_email(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(email.subject.as_deref(), Some("Test"));
        assert_eq!(store.count_emails(MAILBOX).unwrap(), 1);
    }

    #[test]
    fn test_person_interaction_counts() {
        let store = InMemoryMailboxStore::new();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::hours(1);

        store
            .record_person_interaction(MAILBOX, "alice@acme.io", Some("Alice"), Some("acme.io"), t1)
            .unwrap();
        store
            .record_person_interaction(MAILBOX, "alice@acme.io", None, Some("acme.io"), t2)
            .unwrap();

        let person = store.get_person(MAILBOX, "alice@acme.io").unwrap().unwrap();
        assert_eq!(person.interaction_count, 2);
        assert_eq!(person.last_interacted, t2);
        assert_eq!(person.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_person_last_interacted_never_regresses() {
        let store = InMemoryMailboxStore::new();
        let t1 = Utc::now();
        let earlier = t1 - chrono::Duration::days(3);

        store
            .record_person_interaction(MAILBOX, "alice@acme.io", None, Some("acme.io"), t1)
            .unwrap();
        store
            .record_person_interaction(MAILBOX, "alice@acme.io", None, Some("acme.io"), earlier)
            .unwrap();

        let person = store.get_person(MAILBOX, "alice@acme.io").unwrap().unwrap();
        assert_eq!(person.interaction_count, 2);
        assert_eq!(person.last_interacted, t1);
    }

    #[test]
    fn test_company_matched_by_domain_membership() {
        let store = InMemoryMailboxStore::new();
        let now = Utc::now();

        store.record_company_interaction(MAILBOX, "acme.io", now).unwrap();
        store.record_company_interaction(MAILBOX, "acme.io", now).unwrap();

        let company = store.find_company_by_domain(MAILBOX, "acme.io").unwrap().unwrap();
        assert_eq!(company.name, "acme.io");
        assert_eq!(company.interaction_count, 2);

        assert!(store.find_company_by_domain(MAILBOX, "other.io").unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_upsert() {
        let store = InMemoryMailboxStore::new();

        assert!(store.get_checkpoint(MAILBOX).unwrap().is_none());

        let ckpt = Checkpoint::new(MAILBOX).advanced_incremental("123");
        store.save_checkpoint(ckpt).unwrap();

        let loaded = store.get_checkpoint(MAILBOX).unwrap().unwrap();
        assert_eq!(loaded.last_history_id.as_deref(), Some("123"));

        store.save_checkpoint(loaded.advanced_incremental("456")).unwrap();
        let loaded = store.get_checkpoint(MAILBOX).unwrap().unwrap();
        assert_eq!(loaded.last_history_id.as_deref(), Some("456"));
    }

    #[test]
    fn test_attachments_stored_with_email() {
        let store = InMemoryMailboxStore::new();

        let attachment = Attachment {
            id: "m1/report.pdf".to_string(),
            email_id: MessageId::new("m1"),
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 8,
            content_ref: crate::storage::BlobRef::new("blobs/attachments/m1/report.pdf.zst"),
            content_id: None,
        };
        store
            .insert_email(make_test_email("m1"), vec![attachment])
            .unwrap();

        let attachments = store.list_attachments(&MessageId::new("m1")).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "report.pdf");
    }
}
