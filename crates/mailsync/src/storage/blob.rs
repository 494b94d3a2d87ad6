//! Blob storage trait for offloaded content (HTML bodies, attachments)

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Opaque, retrievable locator returned by a blob store.
///
/// For the file-backed store this is a filesystem path; an object-store
/// implementation would return a URL. The engine only threads it through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key for the offloaded HTML body of a message
pub fn email_html_key(message_id: &str) -> String {
    format!("emails/{}.html", message_id)
}

/// Key for one attachment of a message
pub fn attachment_key(message_id: &str, filename: &str) -> String {
    format!("attachments/{}/{}", message_id, filename)
}

/// Trait for blob storage operations
///
/// Keys are caller-chosen; see [`email_html_key`] and [`attachment_key`]
/// for the conventions the sync engine uses.
pub trait BlobStore: Send + Sync {
    /// Store blob content and return a retrievable reference
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<BlobRef>;

    /// Retrieve blob content by key
    ///
    /// Returns None if the blob doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Check if a blob exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a blob
    fn delete(&self, key: &str) -> Result<()>;

    /// Clear all blobs (for testing/reset)
    fn clear(&self) -> Result<()>;
}
