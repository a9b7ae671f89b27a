use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{content_hash, DirScan, StorageDriver};
use crate::error::{Result, StorageError};

/// Content-addressed blob storage: each unique blob is written once under
/// `root`, named by its hex SHA-256 digest. The driver knows nothing about
/// logical names or folders; all namespace truth lives in the catalog.
#[derive(Debug)]
pub struct CasDriver {
    root: PathBuf,
}

impl CasDriver {
    /// Creates the driver, making sure the blob directory exists.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::io("driver.init", root.display().to_string(), e))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl StorageDriver for CasDriver {
    async fn save_file(&self, content: &[u8], relative_path: &str) -> Result<String> {
        let op = "driver.save_file";
        let hash = content_hash(content);
        let blob_path = self.root.join(&hash);

        let exists = tokio::fs::try_exists(&blob_path)
            .await
            .map_err(|e| StorageError::io(op, relative_path, e))?;
        if exists {
            debug!(path = relative_path, hash = hash.as_str(), "blob already stored");
            return Ok(hash);
        }

        tokio::fs::write(&blob_path, content)
            .await
            .map_err(|e| StorageError::io(op, relative_path, e))?;

        debug!(
            path = relative_path,
            hash = hash.as_str(),
            bytes = content.len(),
            "stored new blob"
        );
        Ok(hash)
    }

    async fn create_folder(&self, _relative_path: &str) -> Result<()> {
        // Folders exist only in the catalog.
        Ok(())
    }

    async fn delete_item(&self, _relative_path: &str) -> Result<()> {
        // Other logical paths may reference the same hash; blobs are never
        // deleted here. Deletion is purely a catalog operation.
        Ok(())
    }

    async fn move_item(&self, _old_path: &str, _new_path: &str) -> Result<()> {
        // Moves are metadata-only.
        Ok(())
    }

    async fn list_contents(&self, _prefix: &str) -> Result<DirScan> {
        Err(StorageError::unsupported(
            "driver.list_contents",
            "content-addressed storage requires the catalog for listing",
        ))
    }

    fn physical_path(&self, relative_path: &str, content_hash: Option<&str>) -> Result<PathBuf> {
        match content_hash {
            Some(hash) => Ok(self.root.join(hash)),
            None => Err(StorageError::unsupported(
                "driver.physical_path",
                format!(
                    "content-addressed storage requires catalog metadata to resolve {}",
                    relative_path
                ),
            )),
        }
    }
}
