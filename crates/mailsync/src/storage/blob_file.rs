//! File-based blob storage with zstd compression

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::blob::{BlobRef, BlobStore};

/// File-based blob storage with zstd compression
///
/// Keys map directly to paths under the root:
/// ```text
/// blobs/
///   emails/
///     ab12cd34ef56.html.zst
///   attachments/
///     ab12cd34ef56/
///       report.pdf.zst
/// ```
///
/// The returned [`BlobRef`] is the absolute path of the compressed file.
pub struct FileBlobStore {
    root: PathBuf,
    compression_level: i32,
}

impl FileBlobStore {
    /// Create a new file blob store at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create blob storage directory")?;
        Ok(Self {
            root,
            compression_level: 3, // Good balance of speed vs compression
        })
    }

    /// Get the file path for a blob key
    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        // Keys come from attachment filenames; refuse anything that could
        // escape the root.
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            bail!("Invalid blob key: {}", key);
        }
        Ok(self.root.join(format!("{}.zst", key)))
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<BlobRef> {
        let path = self.blob_path(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let compressed =
            zstd::encode_all(data, self.compression_level).context("Failed to compress blob")?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &compressed)?;
        fs::rename(&temp_path, &path)?;

        Ok(BlobRef::new(path.to_string_lossy().into_owned()))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key)?;

        if !path.exists() {
            return Ok(None);
        }

        let compressed = fs::read(&path)?;
        let mut decoder = zstd::Decoder::new(compressed.as_slice())?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("Failed to decompress blob")?;

        Ok(Some(decompressed))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blob_path(key)?.exists())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::{attachment_key, email_html_key};
    use tempfile::tempdir;

    #[test]
    fn test_put_get_html() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        let key = email_html_key("abc123");
        let data = b"<html><body>Hello</body></html>";

        let blob_ref = store.put(&key, data, "text/html").unwrap();
        assert!(blob_ref.as_str().ends_with("emails/abc123.html.zst"));

        let retrieved = store.get(&key).unwrap().unwrap();
        assert_eq!(retrieved, data);
    }

    #[test]
    fn test_put_get_attachment() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        let key = attachment_key("abc123", "report.pdf");
        store.put(&key, b"%PDF-1.4", "application/pdf").unwrap();

        let retrieved = store.get(&key).unwrap().unwrap();
        assert_eq!(retrieved, b"%PDF-1.4");
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        let result = store.get(&email_html_key("nonexistent")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_rejects_traversal_key() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        assert!(store.put("attachments/m1/../../etc", b"x", "text/plain").is_err());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        let key = email_html_key("abc123");
        store.put(&key, b"data", "text/html").unwrap();
        assert!(store.exists(&key).unwrap());

        store.delete(&key).unwrap();
        assert!(!store.exists(&key).unwrap());
    }

    #[test]
    fn test_compression_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("blobs")).unwrap();

        let key = email_html_key("abc123");
        let data = "Hello, world! ".repeat(1000);

        store.put(&key, data.as_bytes(), "text/html").unwrap();

        let path = store.blob_path(&key).unwrap();
        let compressed_size = fs::metadata(&path).unwrap().len();
        assert!(
            compressed_size < data.len() as u64,
            "Compressed size {} should be less than original {}",
            compressed_size,
            data.len()
        );

        let retrieved = store.get(&key).unwrap().unwrap();
        assert_eq!(retrieved, data.as_bytes());
    }
}
