//! Person and company rows derived from message participants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One known correspondent, keyed by `(mailbox_id, email)`.
///
/// Upserted on every synced message naming this address as a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub mailbox_id: String,
    /// Lower-cased address, unique per mailbox
    pub email: String,
    pub name: Option<String>,
    /// Domain extracted from the address at creation time
    pub company_domain: Option<String>,
    pub last_interacted: DateTime<Utc>,
    pub interaction_count: u64,
}

impl Person {
    pub fn new(
        mailbox_id: impl Into<String>,
        email: impl Into<String>,
        name: Option<String>,
        company_domain: Option<String>,
        interacted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            mailbox_id: mailbox_id.into(),
            email: email.into(),
            name,
            company_domain,
            last_interacted: interacted_at,
            interaction_count: 1,
        }
    }
}

/// One company, matched by domain membership rather than by ID.
///
/// The `domains` set may grow as aliases are discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub mailbox_id: String,
    pub name: String,
    pub domains: BTreeSet<String>,
    pub last_interacted: DateTime<Utc>,
    pub interaction_count: u64,
}

impl Company {
    /// Create a company from its first observed domain
    pub fn from_domain(
        mailbox_id: impl Into<String>,
        domain: impl Into<String>,
        interacted_at: DateTime<Utc>,
    ) -> Self {
        let domain = domain.into();
        Self {
            mailbox_id: mailbox_id.into(),
            name: domain.clone(),
            domains: BTreeSet::from([domain]),
            last_interacted: interacted_at,
            interaction_count: 1,
        }
    }
}
