use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tracing::debug;

use super::{DirScan, ScannedFile, StorageDriver};
use crate::error::{Result, StorageError};

/// Mirrors the logical namespace 1:1 onto a physical directory tree under
/// `root`. Usable with or without a catalog; the raw scan in
/// [`list_contents`](StorageDriver::list_contents) is the database-less
/// fallback.
#[derive(Debug)]
pub struct PathDriver {
    root: PathBuf,
}

impl PathDriver {
    /// Creates the driver, making sure `root` exists.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::io("driver.init", root.display().to_string(), e))?;
        Ok(Self { root })
    }

    fn full_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

#[async_trait]
impl StorageDriver for PathDriver {
    async fn save_file(&self, content: &[u8], relative_path: &str) -> Result<String> {
        let op = "driver.save_file";
        let full = self.full_path(relative_path);

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(op, relative_path, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| StorageError::io(op, relative_path, e))?;

        debug!(path = relative_path, bytes = content.len(), "saved file");
        Ok(relative_path.to_string())
    }

    async fn create_folder(&self, relative_path: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.full_path(relative_path))
            .await
            .map_err(|e| StorageError::io("driver.create_folder", relative_path, e))
    }

    async fn delete_item(&self, relative_path: &str) -> Result<()> {
        let op = "driver.delete_item";
        let full = self.full_path(relative_path);

        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            // Absent paths are a no-op; the catalog decides "not found".
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(op, relative_path, e)),
        };

        if meta.is_dir() {
            tokio::fs::remove_dir_all(&full)
                .await
                .map_err(|e| StorageError::io(op, relative_path, e))?;
        } else {
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| StorageError::io(op, relative_path, e))?;
        }

        debug!(path = relative_path, "deleted physical item");
        Ok(())
    }

    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        let op = "driver.move_item";
        let old_full = self.full_path(old_path);
        let new_full = self.full_path(new_path);

        match tokio::fs::metadata(&old_full).await {
            Ok(_) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(op, old_path));
            }
            Err(e) => return Err(StorageError::io(op, old_path, e)),
        }

        if let Some(parent) = new_full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(op, new_path, e))?;
        }
        tokio::fs::rename(&old_full, &new_full)
            .await
            .map_err(|e| StorageError::io(op, old_path, e))?;

        debug!(from = old_path, to = new_path, "moved physical item");
        Ok(())
    }

    async fn list_contents(&self, prefix: &str) -> Result<DirScan> {
        let op = "driver.list_contents";
        let target = self.full_path(prefix);

        let mut read_dir = match tokio::fs::read_dir(&target).await {
            Ok(rd) => rd,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DirScan::default());
            }
            Err(e) => return Err(StorageError::io(op, prefix, e)),
        };

        let mut scan = DirScan::default();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StorageError::io(op, prefix, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(op, prefix, e))?;

            if meta.is_dir() {
                scan.folders.push(name);
            } else {
                let modified_at = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                scan.files.push(ScannedFile {
                    path: join_logical(prefix, &name),
                    size: meta.len(),
                    modified_at,
                });
            }
        }

        scan.folders.sort();
        scan.files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(scan)
    }

    fn physical_path(&self, relative_path: &str, _content_hash: Option<&str>) -> Result<PathBuf> {
        Ok(self.full_path(relative_path))
    }
}

/// Joins a listing prefix and an entry name into a full logical path with
/// forward slashes.
fn join_logical(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_driver() -> (tempfile::TempDir, PathDriver) {
        let dir = tempfile::tempdir().unwrap();
        let driver = PathDriver::new(dir.path().join("files")).unwrap();
        (dir, driver)
    }

    #[tokio::test]
    async fn test_save_file_creates_parents_and_mirrors_path() {
        let (dir, driver) = test_driver();

        let locator = driver.save_file(b"hello", "docs/notes/a.txt").await.unwrap();
        assert_eq!(locator, "docs/notes/a.txt");

        let on_disk = std::fs::read(dir.path().join("files/docs/notes/a.txt")).unwrap();
        assert_eq!(on_disk, b"hello");
    }

    #[tokio::test]
    async fn test_save_file_overwrites_in_place() {
        let (dir, driver) = test_driver();

        driver.save_file(b"one", "a.txt").await.unwrap();
        driver.save_file(b"two", "a.txt").await.unwrap();

        let on_disk = std::fs::read(dir.path().join("files/a.txt")).unwrap();
        assert_eq!(on_disk, b"two");
    }

    #[tokio::test]
    async fn test_delete_item_removes_trees_and_ignores_missing() {
        let (dir, driver) = test_driver();

        driver.save_file(b"x", "sub/deep/a.txt").await.unwrap();
        driver.delete_item("sub").await.unwrap();
        assert!(!dir.path().join("files/sub").exists());

        // Deleting again is a no-op, not an error.
        driver.delete_item("sub").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_item_creates_intermediate_dirs() {
        let (dir, driver) = test_driver();

        driver.save_file(b"x", "a.txt").await.unwrap();
        driver.move_item("a.txt", "nested/deeper/b.txt").await.unwrap();

        assert!(!dir.path().join("files/a.txt").exists());
        let on_disk = std::fs::read(dir.path().join("files/nested/deeper/b.txt")).unwrap();
        assert_eq!(on_disk, b"x");
    }

    #[tokio::test]
    async fn test_move_item_missing_source_is_not_found() {
        let (_dir, driver) = test_driver();

        let err = driver.move_item("ghost.txt", "b.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_contents_scans_one_level() {
        let (_dir, driver) = test_driver();

        driver.save_file(b"aaa", "top.txt").await.unwrap();
        driver.save_file(b"bb", "sub/inner.txt").await.unwrap();

        let scan = driver.list_contents("").await.unwrap();
        assert_eq!(scan.folders, vec!["sub"]);
        assert_eq!(scan.files.len(), 1);
        assert_eq!(scan.files[0].path, "top.txt");
        assert_eq!(scan.files[0].size, 3);

        let scan = driver.list_contents("sub").await.unwrap();
        assert!(scan.folders.is_empty());
        assert_eq!(scan.files[0].path, "sub/inner.txt");

        // Missing prefix scans as empty, like an empty directory.
        let scan = driver.list_contents("ghost").await.unwrap();
        assert!(scan.folders.is_empty() && scan.files.is_empty());
    }
}
