//! Backing stores for [`TtlCache`](super::TtlCache).

use std::{
    borrow::Cow,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

const SOURCE: &str = "cache::storage";
const FILE_SUFFIX: &str = ".json";
const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("unreadable cache file for `{key}`: {source}")]
    Record {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to persist `{key}`: {source}")]
    Persist {
        key: String,
        #[source]
        source: tempfile::PersistError,
    },
}

impl StorageError {
    fn io(key: &str, source: io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// String key/value store shared by caches with different namespaces.
pub trait CacheStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Snapshot of every key currently stored.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Whether entries outlive the process.
    fn is_persistent(&self) -> bool;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// On-disk layout of a [`FileStorage`] entry.
#[derive(Serialize, Deserialize)]
struct FileRecord<'a> {
    key: Cow<'a, str>,
    value: Cow<'a, str>,
}

/// One file per key under a directory.
///
/// File names are the hex SHA-256 of the key so long keys stay under the
/// file-name limit; the key itself is stored in the file next to the value.
/// Writes go to a temp file in the same directory and are renamed into place,
/// so a reader sees either the old or the new payload.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| StorageError::io(&dir.display().to_string(), err))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}{FILE_SUFFIX}", hex::encode(hasher.finalize().as_slice()))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    fn is_entry_file(file_name: &str) -> bool {
        file_name.strip_suffix(FILE_SUFFIX).is_some_and(|digest| {
            digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
        })
    }

    fn read_record(path: &Path, key: &str) -> Result<Option<(String, String)>, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(key, err)),
        };
        let record: FileRecord<'_> =
            serde_json::from_str(&raw).map_err(|source| StorageError::Record {
                key: key.to_string(),
                source,
            })?;
        Ok(Some((record.key.into_owned(), record.value.into_owned())))
    }
}

impl CacheStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(Self::read_record(&self.path_for(key), key)?
            .filter(|(stored, _)| stored == key)
            .map(|(_, value)| value))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let record = FileRecord {
            key: Cow::Borrowed(key),
            value: Cow::Borrowed(value),
        };
        let payload = serde_json::to_vec(&record).map_err(|source| StorageError::Record {
            key: key.to_string(),
            source,
        })?;
        let mut file = NamedTempFile::new_in(&self.dir).map_err(|err| StorageError::io(key, err))?;
        file.write_all(&payload)
            .map_err(|err| StorageError::io(key, err))?;
        file.persist(self.path_for(key))
            .map_err(|source| StorageError::Persist {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(key, err)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let dir_key = self.dir.display().to_string();
        let entries = fs::read_dir(&self.dir).map_err(|err| StorageError::io(&dir_key, err))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io(&dir_key, err))?;
            // Temp files and foreign files are skipped.
            let is_entry = entry.file_name().to_str().is_some_and(Self::is_entry_file);
            if !is_entry {
                continue;
            }
            match Self::read_record(&entry.path(), &dir_key) {
                Ok(Some((key, _))) => keys.push(key),
                Ok(None) => {}
                Err(err) => debug!(
                    target_module = SOURCE,
                    file = %entry.path().display(),
                    error = %err,
                    "Skipping unreadable cache file"
                ),
            }
        }
        Ok(keys)
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
