//! The storage manager: the only surface callers use.
//!
//! Combines a [`StorageDriver`] with the [`Catalog`] and decides ordering
//! (physical write before catalog write) and which catalog operations apply
//! per driver mode. Running without a catalog is supported for path-mirrored
//! storage (raw scans); content-addressed storage has no authoritative
//! meaning without one.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{Catalog, FileRecord, VersionRecord};
use crate::error::{Result, StorageError};
use crate::metrics::SharedMetrics;
use crate::storage::{content_hash, StorageDriver};

/// One direct-child file in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileItem {
    /// Name relative to the listed prefix.
    pub name: String,
    /// Full logical path.
    pub path: String,
    pub size: u64,
    pub uploaded_at: u64,
    /// Absent in database-less mode, where no hash is on record.
    pub content_hash: Option<String>,
    /// Catalog row id; absent in database-less mode.
    pub id: Option<String>,
    pub annotation: Option<String>,
}

/// Direct children of one listed prefix.
#[derive(Debug, Default, Serialize)]
pub struct Listing {
    /// Immediate child folder names, sorted and deduplicated.
    pub folders: Vec<String>,
    pub files: Vec<FileItem>,
}

/// Result of an upload.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    /// Catalog row id; absent in database-less mode.
    pub id: Option<String>,
    pub content_hash: String,
}

pub struct StorageManager {
    driver: Box<dyn StorageDriver>,
    catalog: Option<Catalog>,
    metrics: SharedMetrics,
}

impl StorageManager {
    pub fn new(
        driver: Box<dyn StorageDriver>,
        catalog: Option<Catalog>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            driver,
            catalog,
            metrics,
        }
    }

    /// Stores `content` under the logical `path`.
    ///
    /// The physical write happens before the catalog write, so a crash in
    /// between never leaves the catalog pointing at nonexistent bytes.
    /// Re-uploading an existing path updates its row in place.
    pub async fn upload(
        &self,
        content: &[u8],
        path: &str,
        annotation: Option<&str>,
    ) -> Result<UploadOutcome> {
        let path = normalize_path(path);
        let hash = content_hash(content);

        self.driver.save_file(content, &path).await?;

        let id = match &self.catalog {
            Some(catalog) => {
                Some(catalog.record_upload(&path, &hash, content.len() as u64, annotation)?)
            }
            None => None,
        };

        self.metrics.file_uploaded();
        self.metrics.bytes_received(content.len());
        debug!(path = path.as_str(), hash = hash.as_str(), "upload complete");

        Ok(UploadOutcome {
            id,
            content_hash: hash,
        })
    }

    /// Creates a folder, physically where the driver has directories and as
    /// an explicit marker in the catalog. Idempotent.
    pub async fn create_folder(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);

        self.driver.create_folder(&path).await?;
        if let Some(catalog) = &self.catalog {
            catalog.record_folder(&path)?;
        }

        self.metrics.folder_created();
        Ok(())
    }

    /// Deletes the file or folder at `path`, cascading over everything
    /// nested under it.
    ///
    /// Physical delete runs first: a dangling catalog row is the safer
    /// failure mode than an orphan physical file with no record. With a
    /// catalog configured, zero affected rows means `NotFound`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);

        self.driver.delete_item(&path).await?;
        if let Some(catalog) = &self.catalog {
            let count = catalog.delete_by_path_or_prefix(&path)?;
            if count == 0 {
                return Err(StorageError::not_found("delete", path));
            }
        }

        self.metrics.item_deleted();
        Ok(())
    }

    /// Moves a file or folder. `is_folder` is caller-supplied: when nothing
    /// exists physically (CAS mode) the manager cannot disambiguate a file
    /// named `a` from a folder named `a` on its own.
    pub async fn move_item(&self, old_path: &str, new_path: &str, is_folder: bool) -> Result<()> {
        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);

        self.driver.move_item(&old_path, &new_path).await?;

        let moved = match &self.catalog {
            Some(catalog) => {
                let moved = if is_folder {
                    catalog.move_by_prefix(&old_path, &new_path)?
                } else {
                    catalog.move_file(&old_path, &new_path)? as usize
                };
                if moved == 0 {
                    return Err(StorageError::not_found("move", old_path));
                }
                moved
            }
            None => 1,
        };

        self.metrics.items_moved(moved as u64);
        Ok(())
    }

    /// Lists the direct children of `prefix`.
    ///
    /// With a catalog: a folder is visible if it was explicitly created
    /// *or* any entry exists at or below it. Content-addressed storage
    /// never creates physical directories, so inference from entry paths is
    /// the only way deeply-nested files surface their intermediate folders.
    /// Without a catalog: the driver's raw scan (path-mirrored storage
    /// only).
    pub async fn list(&self, prefix: &str) -> Result<Listing> {
        let prefix = normalize_prefix(prefix);

        let catalog = match &self.catalog {
            Some(catalog) => catalog,
            None => return self.list_scanned(&prefix).await,
        };

        let (folder_rows, entry_rows) = catalog.list_under(&prefix)?;

        let mut folders: BTreeSet<String> = BTreeSet::new();
        for row in folder_rows {
            let rest = &row.path[prefix.len()..];
            let child = match rest.find('/') {
                Some(i) => &rest[..i],
                None => rest,
            };
            if !child.is_empty() {
                folders.insert(child.to_string());
            }
        }

        let mut files = Vec::new();
        for row in entry_rows {
            let rest = &row.path[prefix.len()..];
            match rest.find('/') {
                // A nested entry implies its intermediate folder, marker or
                // not.
                Some(i) => {
                    folders.insert(rest[..i].to_string());
                }
                None if !rest.is_empty() => {
                    files.push(FileItem {
                        name: rest.to_string(),
                        path: row.path,
                        size: row.size,
                        uploaded_at: row.uploaded_at,
                        content_hash: Some(row.content_hash),
                        id: Some(row.id),
                        annotation: row.annotation,
                    });
                }
                None => {}
            }
        }

        Ok(Listing {
            folders: folders.into_iter().collect(),
            files,
        })
    }

    async fn list_scanned(&self, prefix: &str) -> Result<Listing> {
        let scan = self
            .driver
            .list_contents(prefix.trim_end_matches('/'))
            .await?;

        let files = scan
            .files
            .into_iter()
            .map(|f| {
                let name = f.path[prefix.len()..].to_string();
                FileItem {
                    name,
                    path: f.path,
                    size: f.size,
                    uploaded_at: f.modified_at,
                    content_hash: None,
                    id: None,
                    annotation: None,
                }
            })
            .collect();

        Ok(Listing {
            folders: scan.folders,
            files,
        })
    }

    /// Reads back the content stored at the logical `path`.
    pub async fn download(&self, path: &str) -> Result<Bytes> {
        let op = "download";
        let path = normalize_path(path);

        let physical = match &self.catalog {
            Some(catalog) => {
                let entry = catalog
                    .entry(&path)?
                    .ok_or_else(|| StorageError::not_found(op, path.clone()))?;
                self.driver
                    .physical_path(&path, Some(&entry.content_hash))?
            }
            None => self.driver.physical_path(&path, None)?,
        };

        let content = match tokio::fs::read(&physical).await {
            Ok(content) => content,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(op, path));
            }
            Err(e) => return Err(StorageError::io(op, path, e)),
        };

        self.metrics.bytes_sent(content.len());
        Ok(Bytes::from(content))
    }

    /// Catalog metadata for the entry at `path`.
    pub fn metadata(&self, path: &str) -> Result<FileRecord> {
        let path = normalize_path(path);
        let catalog = self.require_catalog("metadata")?;
        catalog
            .entry(&path)?
            .ok_or_else(|| StorageError::not_found("metadata", path))
    }

    /// Upload history for `path`, newest first.
    pub fn versions(&self, path: &str) -> Result<Vec<VersionRecord>> {
        let path = normalize_path(path);
        let catalog = self.require_catalog("versions")?;
        catalog.versions(&path)
    }

    fn require_catalog(&self, op: &'static str) -> Result<&Catalog> {
        self.catalog
            .as_ref()
            .ok_or_else(|| StorageError::unsupported(op, "no catalog configured"))
    }
}

/// Strips leading/trailing slashes from a logical path.
fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Normalizes a listing prefix to end with `/` when non-empty; root is `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}
