//! Catalog inspection helpers for the CLI.

use std::path::PathBuf;

use anyhow::Result;

use crate::catalog::Catalog;

/// Total number of keys across the file, folder and version trees.
pub fn num_keys(meta_root: PathBuf) -> Result<usize> {
    let catalog = Catalog::open(meta_root, None)?;
    let (files, folders, versions) = catalog.num_keys();
    Ok(files + folders + versions)
}

/// Disk space used by the catalog keyspace.
pub fn disk_space(meta_root: PathBuf) -> Result<u64> {
    let catalog = Catalog::open(meta_root, None)?;
    Ok(catalog.disk_space())
}
