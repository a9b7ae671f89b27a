use std::error::Error;
use std::fmt;

/// Result type alias for storage core operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the drivers, the catalog and the storage manager.
///
/// Every variant carries the operation name and the logical path it was
/// working on, so the caller can produce a user-facing message without
/// re-deriving context.
#[derive(Debug)]
pub enum StorageError {
    /// No entry or physical item matched the given path.
    NotFound { op: &'static str, path: String },
    /// Physical storage or catalog persistence failure.
    IoFailure {
        op: &'static str,
        path: String,
        source: Box<dyn Error + Send + Sync>,
    },
    /// The operation is not meaningful for the configured driver,
    /// e.g. listing a content-addressed store without a catalog.
    Unsupported { op: &'static str, reason: String },
    /// Reserved for optimistic locking. Not produced by the current design.
    Conflict { op: &'static str, path: String },
}

impl StorageError {
    pub fn not_found(op: &'static str, path: impl Into<String>) -> Self {
        StorageError::NotFound {
            op,
            path: path.into(),
        }
    }

    pub fn io(
        op: &'static str,
        path: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        StorageError::IoFailure {
            op,
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn unsupported(op: &'static str, reason: impl Into<String>) -> Self {
        StorageError::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    /// True if this error means "nothing matched", as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { op, path } => {
                write!(f, "{}: no such item: {}", op, path)
            }
            StorageError::IoFailure { op, path, source } => {
                write!(f, "{}: I/O failure for {}: {}", op, path, source)
            }
            StorageError::Unsupported { op, reason } => {
                write!(f, "{}: unsupported: {}", op, reason)
            }
            StorageError::Conflict { op, path } => {
                write!(f, "{}: conflicting update on {}", op, path)
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::IoFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<fjall::Error> for StorageError {
    fn from(e: fjall::Error) -> Self {
        StorageError::io("catalog", "<keyspace>", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_operation_and_path() {
        let err = StorageError::not_found("delete", "docs/readme.txt");
        assert_eq!(err.to_string(), "delete: no such item: docs/readme.txt");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_failure_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = StorageError::io("upload", "a.txt", io);
        assert!(err.source().is_some());
        assert!(!err.is_not_found());
    }
}
