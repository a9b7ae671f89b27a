//! Physical storage drivers.
//!
//! A [`StorageDriver`] owns bytes on disk and nothing else: it never makes
//! namespace decisions beyond what the contract below requires. The two
//! implementations are interchangeable behind the trait. [`PathDriver`]
//! mirrors logical paths onto a physical tree; [`CasDriver`] stores each
//! unique blob once under its content hash.

pub mod cas_driver;
pub mod path_driver;

pub use cas_driver::CasDriver;
pub use path_driver::PathDriver;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex SHA-256 digest of `data`. Content hashes and CAS blob names are
/// always this digest.
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    faster_hex::hex_string(digest.as_slice())
}

/// Metadata for a file found during a raw physical scan (database-less
/// mode).
#[derive(Debug, Clone, Serialize)]
pub struct ScannedFile {
    /// Full logical path of the file.
    pub path: String,
    pub size: u64,
    /// Last modification, seconds since UNIX epoch.
    pub modified_at: u64,
}

/// Raw result of a driver-level directory scan.
#[derive(Debug, Default)]
pub struct DirScan {
    pub folders: Vec<String>,
    pub files: Vec<ScannedFile>,
}

/// Contract implemented identically by both drivers.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Persists `content` and returns the physical locator: the relative
    /// path for path-mirrored storage, the content hash for CAS.
    ///
    /// Idempotent: saving identical content to the same identifier neither
    /// errors nor duplicates storage.
    async fn save_file(&self, content: &[u8], relative_path: &str) -> Result<String>;

    /// Creates a physical directory (recursive, idempotent) for
    /// path-mirrored storage. CAS has no physical folders; the call
    /// succeeds without effect.
    async fn create_folder(&self, relative_path: &str) -> Result<()>;

    /// Removes a file or directory tree for path-mirrored storage; absent
    /// paths are a silent no-op. For CAS this never touches blobs (other
    /// logical paths may reference the same hash), so deletion is purely a
    /// catalog operation there.
    async fn delete_item(&self, relative_path: &str) -> Result<()>;

    /// Renames on disk, creating intermediate directories; fails with
    /// `NotFound` if `old_path` has no physical item. Metadata-only (a
    /// no-op) for CAS.
    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Raw directory scan usable without a catalog. CAS cannot answer this
    /// and returns `Unsupported`.
    async fn list_contents(&self, prefix: &str) -> Result<DirScan>;

    /// Resolves a logical path (plus the catalog-supplied content hash,
    /// where addressing needs it) to the absolute on-disk location.
    fn physical_path(&self, relative_path: &str, content_hash: Option<&str>) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_hash_distinguishes_content() {
        assert_ne!(content_hash(b"hello"), content_hash(b"hello "));
        assert_eq!(content_hash(b""), content_hash(b""));
    }
}
