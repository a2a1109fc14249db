//! File-based key-value store adapter.
//!
//! Each key maps to one file inside a data directory (`~/.chatgate` by
//! default). Writes go to a sibling temp file that is renamed over the
//! target, so readers see either the previous value or the new one.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::traits::{KeyValueStore, StorageError};

/// The default data directory name, relative to the home directory.
const DATA_DIR: &str = ".chatgate";

/// File-based key-value store.
///
/// # Example
///
/// ```ignore
/// use chatgate::adapters::FileKeyValueStore;
/// use chatgate::traits::KeyValueStore;
///
/// let store = FileKeyValueStore::new()?;
/// store.set("session.credentials", "{...}").await?;
/// ```
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Create a store rooted at `~/.chatgate`.
    ///
    /// # Returns
    /// The store, or an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, StorageError> {
        dirs::home_dir()
            .map(|home| Self::with_dir(home.join(DATA_DIR)))
            .ok_or_else(|| StorageError::Other("Failed to determine home directory".to_string()))
    }

    /// Create a store rooted at a custom directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the stored files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed(format!("{}: {}", path.display(), e))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", path.display(), e)))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFailed(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::with_dir(temp_dir.path());
        assert_eq!(store.get("session.credentials").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::with_dir(temp_dir.path());

        store.set("session.credentials", r#"{"a":1}"#).await.unwrap();
        assert_eq!(
            store.get("session.credentials").await.unwrap(),
            Some(r#"{"a":1}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_set_replaces_and_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::with_dir(temp_dir.path());

        store.set("k", "first").await.unwrap();
        store.set("k", "second").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("second".to_string()));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_set_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("data");
        let store = FileKeyValueStore::with_dir(&nested);

        store.set("k", "v").await.unwrap();
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::with_dir(temp_dir.path());

        store.set("k", "v").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Removing again is fine
        store.remove("k").await.unwrap();
    }

    #[test]
    fn test_path_for_sanitizes_key() {
        let store = FileKeyValueStore::with_dir("/data");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/data/.._etc_passwd.json")
        );
        assert_eq!(
            store.path_for("session.credentials"),
            PathBuf::from("/data/session.credentials.json")
        );
    }
}
