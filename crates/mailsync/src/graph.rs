//! Interaction graph maintenance
//!
//! Every processed message contributes exactly one interaction per distinct
//! participant to the person graph, and one per person to that person's
//! company. Companies are keyed by domain membership, not by name.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;

use crate::mime::ParsedMessage;
use crate::storage::MailboxStore;

/// Extract the lower-cased domain from an email address
///
/// Returns None for addresses without a non-empty local part and domain.
/// Such participants still get a person entry, just no company.
pub fn extract_domain(address: &str) -> Option<String> {
    let (local, domain) = address.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_lowercase())
}

/// Record one interaction per distinct participant of a message
///
/// `interacted_at` is the message's internal date. Participants come
/// pre-deduplicated and lower-cased from [`ParsedMessage::participants`].
pub fn record_interactions(
    store: &dyn MailboxStore,
    mailbox_id: &str,
    parsed: &ParsedMessage,
    interacted_at: DateTime<Utc>,
) -> Result<usize> {
    let participants = parsed.participants();

    for participant in &participants {
        let domain = extract_domain(&participant.email);
        if domain.is_none() {
            debug!("[GRAPH] No domain for {}, skipping company", participant.email);
        }

        store.record_person_interaction(
            mailbox_id,
            &participant.email,
            participant.name.as_deref(),
            domain.as_deref(),
            interacted_at,
        )?;

        if let Some(domain) = domain {
            store.record_company_interaction(mailbox_id, &domain, interacted_at)?;
        }
    }

    Ok(participants.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;
    use crate::storage::InMemoryMailboxStore;

    const MAILBOX: &str = "user@example.com";

    fn message_with(addresses: &[(&str, Option<&str>)]) -> ParsedMessage {
        ParsedMessage {
            from: addresses
                .iter()
                .map(|(email, name)| EmailAddress {
                    name: name.map(ToOwned::to_owned),
                    email: email.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("Alice@Acme.IO"), Some("acme.io".to_string()));
        assert_eq!(extract_domain("no-at-sign"), None);
        assert_eq!(extract_domain("@acme.io"), None);
        assert_eq!(extract_domain("alice@"), None);
    }

    #[test]
    fn test_one_interaction_per_participant() {
        let store = InMemoryMailboxStore::new();
        let now = Utc::now();

        let parsed = message_with(&[
            ("alice@acme.io", Some("Alice")),
            ("bob@widgets.example", None),
        ]);
        record_interactions(&store, MAILBOX, &parsed, now).unwrap();

        let alice = store.get_person(MAILBOX, "alice@acme.io").unwrap().unwrap();
        assert_eq!(alice.interaction_count, 1);
        assert_eq!(alice.company_domain.as_deref(), Some("acme.io"));

        let acme = store.find_company_by_domain(MAILBOX, "acme.io").unwrap().unwrap();
        assert_eq!(acme.interaction_count, 1);
    }

    #[test]
    fn test_same_domain_participants_share_company() {
        let store = InMemoryMailboxStore::new();
        let now = Utc::now();

        let parsed = message_with(&[
            ("alice@acme.io", None),
            ("carol@acme.io", None),
        ]);
        record_interactions(&store, MAILBOX, &parsed, now).unwrap();

        // Two people, one company counted once per person
        let acme = store.find_company_by_domain(MAILBOX, "acme.io").unwrap().unwrap();
        assert_eq!(acme.interaction_count, 2);
    }

    #[test]
    fn test_unparseable_address_gets_person_without_company() {
        let store = InMemoryMailboxStore::new();
        let now = Utc::now();

        let parsed = message_with(&[("undisclosed-recipients", None)]);
        let count = record_interactions(&store, MAILBOX, &parsed, now).unwrap();
        assert_eq!(count, 1);

        let person = store
            .get_person(MAILBOX, "undisclosed-recipients")
            .unwrap()
            .unwrap();
        assert!(person.company_domain.is_none());
    }
}
