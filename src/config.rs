use std::str::FromStr;

/// Which physical storage strategy backs the logical namespace.
///
/// Selected once at process start (flag or `STORAGE_MODE` env var);
/// not changeable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Mirror logical paths 1:1 onto a physical directory tree.
    Path,
    /// Store each unique blob once, named by its content hash.
    Cas,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "path" => Ok(StorageMode::Path),
            "cas" => Ok(StorageMode::Cas),
            _ => Err(format!("Unknown storage mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Durability {
    Buffer,
    Fsync,
    Fdatasync,
}

impl FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buffer" => Ok(Durability::Buffer),
            "fsync" => Ok(Durability::Fsync),
            "fdatasync" => Ok(Durability::Fdatasync),
            _ => Err(format!("Unknown durability option: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_parsing() {
        assert_eq!("path".parse::<StorageMode>().unwrap(), StorageMode::Path);
        assert_eq!("CAS".parse::<StorageMode>().unwrap(), StorageMode::Cas);
        assert!("blob".parse::<StorageMode>().is_err());
    }
}
