use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// One named file in the logical namespace.
///
/// Exactly one record exists per path; re-uploading the same path rewrites
/// this record in place (new hash/size/time) and never creates a second one.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct FileRecord {
    /// Stable identifier, minted on first upload and kept across re-uploads.
    pub id: String,
    /// Full logical path, e.g. `docs/readme.txt`. Unique key.
    pub path: String,
    /// Hex SHA-256 digest of the content.
    pub content_hash: String,
    /// Content size in bytes.
    pub size: u64,
    /// Seconds since UNIX epoch.
    pub uploaded_at: u64,
    /// Optional free-text comment supplied at upload time.
    pub annotation: Option<String>,
}

/// An explicitly-created folder, persisted even while empty.
///
/// Folders that exist only because a file was uploaded into them get no
/// record; listings infer those from file paths.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct FolderRecord {
    pub path: String,
    pub created_at: u64,
}

/// One entry in a file's upload history.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct VersionRecord {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub uploaded_at: u64,
    pub annotation: Option<String>,
}

macro_rules! impl_record_codec {
    ($ty:ty) => {
        impl $ty {
            /// Serializes the record to bytes
            pub fn to_vec(&self) -> Result<Vec<u8>> {
                bincode::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
                    StorageError::io("catalog.encode", self.path.clone(), e.to_string())
                })
            }

            /// Deserializes a record from bytes
            pub fn from_slice(data: &[u8]) -> Result<Self> {
                let (record, _len) = bincode::decode_from_slice(data, bincode::config::standard())
                    .map_err(|e| StorageError::io("catalog.decode", "<record>", e.to_string()))?;
                Ok(record)
            }
        }
    };
}

impl_record_codec!(FileRecord);
impl_record_codec!(FolderRecord);
impl_record_codec!(VersionRecord);

/// Current time as seconds since the UNIX epoch.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
