//! Email and attachment models for one mirrored message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::BlobRef;

/// Unique identifier for a message (the remote provider's message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a thread (the remote provider's thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// One mirrored message, created exactly once per remote ID.
///
/// The sync engine never mutates a stored Email; other flows may flip
/// `is_read` out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Remote message ID, globally unique
    pub id: MessageId,
    /// Mailbox this message was mirrored from
    pub mailbox_id: String,
    /// Subject line
    pub subject: Option<String>,
    /// Sender address
    pub from: Option<EmailAddress>,
    /// Prefix of the plain-text body, at most 200 characters
    pub snippet: Option<String>,
    /// Provider-side receive timestamp
    pub internal_date: Option<DateTime<Utc>>,
    /// Whether the message was read at sync time
    pub is_read: bool,
    /// Provider label IDs (e.g., "INBOX", "SENT", "UNREAD")
    pub label_ids: Vec<String>,
    /// Thread this message belongs to
    pub thread_id: Option<ThreadId>,
    /// Message-ID header value
    pub message_id_header: Option<String>,
    /// In-Reply-To header value
    pub in_reply_to: Option<String>,
    /// References header values
    pub references: Vec<String>,
    /// Blob reference to the offloaded HTML body, if any
    pub html_ref: Option<BlobRef>,
    /// Plain-text body
    pub text: Option<String>,
}

impl Email {
    /// Create a new email builder
    pub fn builder(id: MessageId, mailbox_id: impl Into<String>) -> EmailBuilder {
        EmailBuilder::new(id, mailbox_id.into())
    }
}

/// A binary attachment owned by exactly one Email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Derived from message ID and filename
    pub id: String,
    /// Owning email's remote message ID
    pub email_id: MessageId,
    pub filename: String,
    pub content_type: String,
    /// Size of the original content in bytes
    pub size: u64,
    /// Blob reference to the offloaded content
    pub content_ref: BlobRef,
    /// Content-ID header value, for inline `cid:` references
    pub content_id: Option<String>,
}

impl Attachment {
    /// Derive the attachment ID from its owning message and filename
    pub fn derive_id(message_id: &MessageId, filename: &str) -> String {
        format!("{}/{}", message_id.as_str(), filename)
    }
}

/// Builder for creating Email instances
pub struct EmailBuilder {
    id: MessageId,
    mailbox_id: String,
    subject: Option<String>,
    from: Option<EmailAddress>,
    snippet: Option<String>,
    internal_date: Option<DateTime<Utc>>,
    is_read: bool,
    label_ids: Vec<String>,
    thread_id: Option<ThreadId>,
    message_id_header: Option<String>,
    in_reply_to: Option<String>,
    references: Vec<String>,
    html_ref: Option<BlobRef>,
    text: Option<String>,
}

impl EmailBuilder {
    fn new(id: MessageId, mailbox_id: String) -> Self {
        Self {
            id,
            mailbox_id,
            subject: None,
            from: None,
            snippet: None,
            internal_date: None,
            is_read: false,
            label_ids: Vec::new(),
            thread_id: None,
            message_id_header: None,
            in_reply_to: None,
            references: Vec::new(),
            html_ref: None,
            text: None,
        }
    }

    pub fn subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn from(mut self, from: Option<EmailAddress>) -> Self {
        self.from = from;
        self
    }

    pub fn snippet(mut self, snippet: Option<String>) -> Self {
        self.snippet = snippet;
        self
    }

    pub fn internal_date(mut self, internal_date: Option<DateTime<Utc>>) -> Self {
        self.internal_date = internal_date;
        self
    }

    pub fn is_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn label_ids(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    pub fn thread_id(mut self, thread_id: Option<ThreadId>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn message_id_header(mut self, value: Option<String>) -> Self {
        self.message_id_header = value;
        self
    }

    pub fn in_reply_to(mut self, value: Option<String>) -> Self {
        self.in_reply_to = value;
        self
    }

    pub fn references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn html_ref(mut self, html_ref: Option<BlobRef>) -> Self {
        self.html_ref = html_ref;
        self
    }

    pub fn text(mut self, text: Option<String>) -> Self {
        self.text = text;
        self
    }

    pub fn build(self) -> Email {
        Email {
            id: self.id,
            mailbox_id: self.mailbox_id,
            subject: self.subject,
            from: self.from,
            snippet: self.snippet,
            internal_date: self.internal_date,
            is_read: self.is_read,
            label_ids: self.label_ids,
            thread_id: self.thread_id,
            message_id_header: self.message_id_header,
            in_reply_to: self.in_reply_to,
            references: self.references,
            html_ref: self.html_ref,
            text: self.text,
        }
    }
}
