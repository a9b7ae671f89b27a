//! Durable metadata catalog: the single source of truth for the logical
//! namespace.
//!
//! Rows are bincode-encoded records in named fjall partitions. Every
//! mutation runs inside one write transaction, so multi-row operations
//! (prefix cascades) are all-or-nothing.

mod records;

pub use records::{FileRecord, FolderRecord, VersionRecord};

use std::path::PathBuf;

use fjall::{Config, PartitionCreateOptions, PersistMode, TxKeyspace, TxPartitionHandle};
use tracing::debug;
use uuid::Uuid;

use crate::config::Durability;
use crate::error::{Result, StorageError};
use records::now_secs;

const FILES_TREE: &str = "_FILES";
const FOLDERS_TREE: &str = "_FOLDERS";
const VERSIONS_TREE: &str = "_VERSIONS";

/// Version rows are keyed `path \0 version-id`; logical paths never contain
/// NUL, so the prefix `path \0` selects exactly one file's history.
fn version_key(path: &str, version_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(path.len() + 1 + version_id.len());
    key.extend_from_slice(path.as_bytes());
    key.push(0);
    key.extend_from_slice(version_id.as_bytes());
    key
}

fn version_prefix(path: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(path.len() + 1);
    prefix.extend_from_slice(path.as_bytes());
    prefix.push(0);
    prefix
}

/// Metadata catalog mapping logical paths to content hashes and folder
/// markers, backed by a transactional fjall keyspace.
pub struct Catalog {
    keyspace: TxKeyspace,
    files: TxPartitionHandle,
    folders: TxPartitionHandle,
    versions: TxPartitionHandle,
    durability: Option<Durability>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("durability", &self.durability)
            .finish()
    }
}

impl Catalog {
    /// Opens (or creates) the catalog under `meta_root`.
    pub fn open(mut meta_root: PathBuf, durability: Option<Durability>) -> Result<Self> {
        meta_root.push("db");

        let keyspace = Config::new(&meta_root)
            .open_transactional()
            .map_err(|e| StorageError::io("catalog.open", meta_root.display().to_string(), e))?;

        let files = keyspace.open_partition(FILES_TREE, PartitionCreateOptions::default())?;
        let folders = keyspace.open_partition(FOLDERS_TREE, PartitionCreateOptions::default())?;
        let versions = keyspace.open_partition(VERSIONS_TREE, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            files,
            folders,
            versions,
            durability,
        })
    }

    fn persist(&self, op: &'static str) -> Result<()> {
        let mode = match self.durability {
            None | Some(Durability::Buffer) => PersistMode::Buffer,
            Some(Durability::Fsync) => PersistMode::SyncAll,
            Some(Durability::Fdatasync) => PersistMode::SyncData,
        };
        self.keyspace
            .persist(mode)
            .map_err(|e| StorageError::io(op, "<keyspace>", e))
    }

    /// Upserts the entry at `path` and appends a version row.
    ///
    /// The row id is minted on first upload and survives re-uploads;
    /// the returned id identifies the catalog row, not the content.
    pub fn record_upload(
        &self,
        path: &str,
        content_hash: &str,
        size: u64,
        annotation: Option<&str>,
    ) -> Result<String> {
        let op = "catalog.record_upload";

        let id = match self.entry(path)? {
            Some(existing) => existing.id,
            None => Uuid::new_v4().to_string(),
        };
        let now = now_secs();

        let record = FileRecord {
            id: id.clone(),
            path: path.to_string(),
            content_hash: content_hash.to_string(),
            size,
            uploaded_at: now,
            annotation: annotation.map(str::to_string),
        };
        let version = VersionRecord {
            id: Uuid::new_v4().to_string(),
            path: path.to_string(),
            content_hash: content_hash.to_string(),
            uploaded_at: now,
            annotation: annotation.map(str::to_string),
        };

        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.files, path.as_bytes(), record.to_vec()?);
        tx.insert(
            &self.versions,
            version_key(path, &version.id),
            version.to_vec()?,
        );
        tx.commit().map_err(|e| StorageError::io(op, path, e))?;
        self.persist(op)?;

        debug!(path, content_hash, "recorded upload");
        Ok(id)
    }

    /// Inserts a folder marker if absent. Repeated calls are silent no-ops.
    pub fn record_folder(&self, path: &str) -> Result<()> {
        let op = "catalog.record_folder";

        if self
            .folders
            .contains_key(path.as_bytes())
            .map_err(|e| StorageError::io(op, path, e))?
        {
            return Ok(());
        }

        let record = FolderRecord {
            path: path.to_string(),
            created_at: now_secs(),
        };

        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.folders, path.as_bytes(), record.to_vec()?);
        tx.commit().map_err(|e| StorageError::io(op, path, e))?;
        self.persist(op)?;

        debug!(path, "recorded folder");
        Ok(())
    }

    /// Point lookup for the entry at `path`.
    pub fn entry(&self, path: &str) -> Result<Option<FileRecord>> {
        match self
            .files
            .get(path.as_bytes())
            .map_err(|e| StorageError::io("catalog.entry", path, e))?
        {
            Some(raw) => Ok(Some(FileRecord::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// All folder markers and entries whose path starts with `prefix`.
    ///
    /// The caller (the manager) derives the hierarchical listing; this is a
    /// flat prefix scan over both trees, entries ordered by path.
    pub fn list_under(&self, prefix: &str) -> Result<(Vec<FolderRecord>, Vec<FileRecord>)> {
        let op = "catalog.list_under";
        let rtx = self.keyspace.read_tx();

        let mut folders = Vec::new();
        for item in rtx.prefix(&self.folders, prefix.as_bytes()) {
            let (_key, value) = item.map_err(|e| StorageError::io(op, prefix, e))?;
            folders.push(FolderRecord::from_slice(&value)?);
        }

        let mut entries = Vec::new();
        for item in rtx.prefix(&self.files, prefix.as_bytes()) {
            let (_key, value) = item.map_err(|e| StorageError::io(op, prefix, e))?;
            entries.push(FileRecord::from_slice(&value)?);
        }

        Ok((folders, entries))
    }

    /// Upload history for `path`, newest first.
    pub fn versions(&self, path: &str) -> Result<Vec<VersionRecord>> {
        let op = "catalog.versions";
        let rtx = self.keyspace.read_tx();

        let mut out = Vec::new();
        for item in rtx.prefix(&self.versions, version_prefix(path)) {
            let (_key, value) = item.map_err(|e| StorageError::io(op, path, e))?;
            out.push(VersionRecord::from_slice(&value)?);
        }
        out.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        Ok(out)
    }

    /// Deletes the entry at `path`, every entry and folder marker nested
    /// under `path/`, and their version rows, in one transaction.
    ///
    /// Returns the number of entry + folder rows removed; the manager treats
    /// zero as "nothing found".
    pub fn delete_by_path_or_prefix(&self, path: &str) -> Result<usize> {
        let op = "catalog.delete";
        let nested = format!("{}/", path);

        let mut file_keys: Vec<Vec<u8>> = Vec::new();
        let mut folder_keys: Vec<Vec<u8>> = Vec::new();
        let mut ver_keys: Vec<Vec<u8>> = Vec::new();
        {
            let rtx = self.keyspace.read_tx();

            if rtx
                .contains_key(&self.files, path.as_bytes())
                .map_err(|e| StorageError::io(op, path, e))?
            {
                file_keys.push(path.as_bytes().to_vec());
            }
            for item in rtx.prefix(&self.files, nested.as_bytes()) {
                let (key, _value) = item.map_err(|e| StorageError::io(op, path, e))?;
                file_keys.push(key.to_vec());
            }

            if rtx
                .contains_key(&self.folders, path.as_bytes())
                .map_err(|e| StorageError::io(op, path, e))?
            {
                folder_keys.push(path.as_bytes().to_vec());
            }
            for item in rtx.prefix(&self.folders, nested.as_bytes()) {
                let (key, _value) = item.map_err(|e| StorageError::io(op, path, e))?;
                folder_keys.push(key.to_vec());
            }

            for file_key in &file_keys {
                let file_path = String::from_utf8_lossy(file_key).into_owned();
                for item in rtx.prefix(&self.versions, version_prefix(&file_path)) {
                    let (key, _value) = item.map_err(|e| StorageError::io(op, path, e))?;
                    ver_keys.push(key.to_vec());
                }
            }
        }

        let count = file_keys.len() + folder_keys.len();
        if count == 0 {
            return Ok(0);
        }

        let mut tx = self.keyspace.write_tx();
        for key in file_keys {
            tx.remove(&self.files, key);
        }
        for key in folder_keys {
            tx.remove(&self.folders, key);
        }
        for key in ver_keys {
            tx.remove(&self.versions, key);
        }
        tx.commit().map_err(|e| StorageError::io(op, path, e))?;
        self.persist(op)?;

        debug!(path, count, "deleted catalog rows");
        Ok(count)
    }

    /// Rewrites the entry at exactly `old_path` (and its versions) to
    /// `new_path`. Returns false if no entry matched.
    pub fn move_file(&self, old_path: &str, new_path: &str) -> Result<bool> {
        Ok(self.rename_rows("catalog.move_file", old_path, new_path, false)? > 0)
    }

    /// Rewrites the row at exactly `old_prefix` plus every entry, folder
    /// marker and version row nested under `old_prefix/`, substituting the
    /// prefix. All rows move in one transaction or none do.
    ///
    /// Returns the number of entry + folder rows rewritten.
    pub fn move_by_prefix(&self, old_prefix: &str, new_prefix: &str) -> Result<usize> {
        self.rename_rows("catalog.move_prefix", old_prefix, new_prefix, true)
    }

    fn rename_rows(
        &self,
        op: &'static str,
        old_path: &str,
        new_path: &str,
        include_nested: bool,
    ) -> Result<usize> {
        let nested = format!("{}/", old_path);
        let rewrite = |p: &str| format!("{}{}", new_path, &p[old_path.len()..]);

        // (old key, new key, re-encoded value) per row, collected up front so
        // the write transaction only replays them.
        let mut file_moves: Vec<(Vec<u8>, Vec<u8>, Vec<u8>)> = Vec::new();
        let mut folder_moves: Vec<(Vec<u8>, Vec<u8>, Vec<u8>)> = Vec::new();
        let mut ver_moves: Vec<(Vec<u8>, Vec<u8>, Vec<u8>)> = Vec::new();
        {
            let rtx = self.keyspace.read_tx();

            let mut file_rows: Vec<FileRecord> = Vec::new();
            if let Some(raw) = rtx
                .get(&self.files, old_path.as_bytes())
                .map_err(|e| StorageError::io(op, old_path, e))?
            {
                file_rows.push(FileRecord::from_slice(&raw)?);
            }
            let mut folder_rows: Vec<FolderRecord> = Vec::new();
            if let Some(raw) = rtx
                .get(&self.folders, old_path.as_bytes())
                .map_err(|e| StorageError::io(op, old_path, e))?
            {
                folder_rows.push(FolderRecord::from_slice(&raw)?);
            }
            if include_nested {
                for item in rtx.prefix(&self.files, nested.as_bytes()) {
                    let (_key, value) = item.map_err(|e| StorageError::io(op, old_path, e))?;
                    file_rows.push(FileRecord::from_slice(&value)?);
                }
                for item in rtx.prefix(&self.folders, nested.as_bytes()) {
                    let (_key, value) = item.map_err(|e| StorageError::io(op, old_path, e))?;
                    folder_rows.push(FolderRecord::from_slice(&value)?);
                }
            }

            for record in file_rows {
                let from = record.path.clone();
                let to = rewrite(&from);

                for item in rtx.prefix(&self.versions, version_prefix(&from)) {
                    let (key, value) = item.map_err(|e| StorageError::io(op, old_path, e))?;
                    let mut version = VersionRecord::from_slice(&value)?;
                    version.path = to.clone();
                    ver_moves.push((
                        key.to_vec(),
                        version_key(&to, &version.id),
                        version.to_vec()?,
                    ));
                }

                let mut moved = record;
                moved.path = to.clone();
                file_moves.push((from.into_bytes(), to.into_bytes(), moved.to_vec()?));
            }

            for record in folder_rows {
                let from = record.path.clone();
                let to = rewrite(&from);
                let mut moved = record;
                moved.path = to.clone();
                folder_moves.push((from.into_bytes(), to.into_bytes(), moved.to_vec()?));
            }
        }

        let count = file_moves.len() + folder_moves.len();
        if count == 0 {
            return Ok(0);
        }

        let mut tx = self.keyspace.write_tx();
        for (old_key, new_key, value) in file_moves {
            tx.remove(&self.files, old_key);
            tx.insert(&self.files, new_key, value);
        }
        for (old_key, new_key, value) in folder_moves {
            tx.remove(&self.folders, old_key);
            tx.insert(&self.folders, new_key, value);
        }
        for (old_key, new_key, value) in ver_moves {
            tx.remove(&self.versions, old_key);
            tx.insert(&self.versions, new_key, value);
        }
        tx.commit().map_err(|e| StorageError::io(op, old_path, e))?;
        self.persist(op)?;

        debug!(old_path, new_path, count, "moved catalog rows");
        Ok(count)
    }

    /// Returns the number of keys of the file, folder, and version trees.
    pub fn num_keys(&self) -> (usize, usize, usize) {
        let rtx = self.keyspace.read_tx();
        (
            rtx.iter(&self.files).count(),
            rtx.iter(&self.folders).count(),
            rtx.iter(&self.versions).count(),
        )
    }

    /// Returns the disk space used by the catalog.
    pub fn disk_space(&self) -> u64 {
        self.keyspace.disk_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().to_path_buf(), None).unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_record_upload_upserts_by_path() {
        let (_dir, catalog) = test_catalog();

        let id1 = catalog
            .record_upload("docs/readme.txt", "aaaa", 4, Some("first"))
            .unwrap();
        let id2 = catalog
            .record_upload("docs/readme.txt", "bbbb", 8, None)
            .unwrap();

        // Same row, same id, updated fields.
        assert_eq!(id1, id2);
        let (_, entries) = catalog.list_under("").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content_hash, "bbbb");
        assert_eq!(entries[0].size, 8);
        assert_eq!(entries[0].annotation, None);
    }

    #[test]
    fn test_record_upload_appends_versions() {
        let (_dir, catalog) = test_catalog();

        catalog.record_upload("a.txt", "aaaa", 1, None).unwrap();
        catalog.record_upload("a.txt", "bbbb", 2, None).unwrap();

        let versions = catalog.versions("a.txt").unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.content_hash == "aaaa"));
        assert!(versions.iter().any(|v| v.content_hash == "bbbb"));
    }

    #[test]
    fn test_record_folder_is_idempotent() {
        let (_dir, catalog) = test_catalog();

        catalog.record_folder("docs").unwrap();
        catalog.record_folder("docs").unwrap();

        let (folders, _) = catalog.list_under("").unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].path, "docs");
    }

    #[test]
    fn test_list_under_prefix_excludes_siblings() {
        let (_dir, catalog) = test_catalog();

        catalog.record_upload("x/a.txt", "aa", 1, None).unwrap();
        catalog.record_upload("x/b/c.txt", "bb", 1, None).unwrap();
        catalog.record_upload("xy.txt", "cc", 1, None).unwrap();
        catalog.record_folder("x/empty").unwrap();

        let (folders, entries) = catalog.list_under("x/").unwrap();
        assert_eq!(folders.len(), 1);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["x/a.txt", "x/b/c.txt"]);
    }

    #[test]
    fn test_delete_cascades_and_counts() {
        let (_dir, catalog) = test_catalog();

        catalog.record_folder("x").unwrap();
        catalog.record_folder("x/sub").unwrap();
        catalog.record_upload("x/a.txt", "aa", 1, None).unwrap();
        catalog.record_upload("x/sub/b.txt", "bb", 1, None).unwrap();
        catalog.record_upload("other.txt", "cc", 1, None).unwrap();

        // 2 entries + 2 folder markers under "x"
        let count = catalog.delete_by_path_or_prefix("x").unwrap();
        assert_eq!(count, 4);

        let (folders, entries) = catalog.list_under("").unwrap();
        assert!(folders.is_empty());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "other.txt");

        // Version rows follow the cascade.
        assert!(catalog.versions("x/a.txt").unwrap().is_empty());

        // Nothing left to delete.
        assert_eq!(catalog.delete_by_path_or_prefix("x").unwrap(), 0);
    }

    #[test]
    fn test_move_by_prefix_rewrites_all_rows() {
        let (_dir, catalog) = test_catalog();

        catalog.record_folder("x").unwrap();
        catalog.record_folder("x/sub").unwrap();
        catalog.record_upload("x/a.txt", "aa", 1, None).unwrap();
        catalog.record_upload("x/sub/b.txt", "bb", 1, None).unwrap();

        let count = catalog.move_by_prefix("x", "z").unwrap();
        assert_eq!(count, 4);

        let (folders, entries) = catalog.list_under("").unwrap();
        let folder_paths: Vec<&str> = folders.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(folder_paths, vec!["z", "z/sub"]);
        let entry_paths: Vec<&str> = entries.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(entry_paths, vec!["z/a.txt", "z/sub/b.txt"]);

        // History moved with the rows.
        assert_eq!(catalog.versions("z/a.txt").unwrap().len(), 1);
        assert!(catalog.versions("x/a.txt").unwrap().is_empty());
    }

    #[test]
    fn test_move_file_renames_single_entry() {
        let (_dir, catalog) = test_catalog();

        catalog.record_upload("a.txt", "aa", 1, None).unwrap();

        assert!(catalog.move_file("a.txt", "b.txt").unwrap());
        assert!(catalog.entry("a.txt").unwrap().is_none());
        let moved = catalog.entry("b.txt").unwrap().unwrap();
        assert_eq!(moved.content_hash, "aa");

        assert!(!catalog.move_file("missing.txt", "c.txt").unwrap());
    }
}
