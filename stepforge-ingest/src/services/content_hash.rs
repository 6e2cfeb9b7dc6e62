//! Content addressing for source documents
//!
//! A document's identity is the SHA-256 digest of its bytes. Two uploads of
//! byte-identical PDFs resolve to the same identity regardless of filename,
//! which is what makes re-ingestion and asset lookup idempotent downstream.

use sha2::{Digest, Sha256};
use std::path::Path;
use stepforge_common::{Error, Result};

/// Number of hex characters used as the external, human-typable handle.
/// Filenames and URLs carry this prefix; the ledger stores the full digest.
pub const HASH_PREFIX_LEN: usize = 16;

/// Full SHA-256 content hash of a source document, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a file's content by streaming fixed-size chunks.
    ///
    /// Memory use is independent of document size. An absent or unreadable
    /// file is an error; callers abort ingestion before writing anything.
    pub async fn of_file(path: &Path) -> Result<Self> {
        let path_buf = path.to_path_buf();
        tracing::debug!(path = %path_buf.display(), "Calculating SHA-256 hash");

        let hash = tokio::task::spawn_blocking(move || -> Result<String> {
            use std::fs::File;
            use std::io::Read;

            let mut file = File::open(&path_buf).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to open file for hashing: {e}"),
                ))
            })?;

            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; 1024 * 1024]; // 1MB chunks

            loop {
                let bytes_read = file.read(&mut buffer).map_err(|e| {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to read file for hashing: {e}"),
                    ))
                })?;

                if bytes_read == 0 {
                    break;
                }

                hasher.update(&buffer[..bytes_read]);
            }

            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .map_err(|e| Error::internal(format!("Hash calculation task failed: {e}")))??;

        Ok(Self(hash))
    }

    /// Full 64-char hex digest
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// The 16-char external handle used in filenames and URLs
    pub fn prefix(&self) -> &str {
        &self.0[..HASH_PREFIX_LEN]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_identical_bytes_same_identity() {
        let mut file_a = NamedTempFile::new().unwrap();
        file_a.write_all(b"manual content").unwrap();
        file_a.flush().unwrap();

        let mut file_b = NamedTempFile::new().unwrap();
        file_b.write_all(b"manual content").unwrap();
        file_b.flush().unwrap();

        // Different filenames, identical bytes
        let hash_a = ContentHash::of_file(file_a.path()).await.unwrap();
        let hash_b = ContentHash::of_file(file_b.path()).await.unwrap();

        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.as_hex().len(), 64);
    }

    #[tokio::test]
    async fn test_known_digest() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let hash = ContentHash::of_file(file.path()).await.unwrap();
        let expected = format!("{:x}", Sha256::digest(b"test content"));
        assert_eq!(hash.as_hex(), expected);
        assert_eq!(hash.prefix(), &expected[..16]);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_an_error() {
        let result = ContentHash::of_file(Path::new("/no/such/file.pdf")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
