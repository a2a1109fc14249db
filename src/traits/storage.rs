//! Durable key-value persistence trait abstraction.
//!
//! The session core persists a single document (the credential pair) under a
//! well-known key. Implementations must make `set` and `remove` atomic with
//! respect to `get`: a concurrent reader observes either the old value or the
//! new one, never a partial write.

use async_trait::async_trait;

/// Key-value storage errors.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Failed to read a value
    ReadFailed(String),
    /// Failed to write a value
    WriteFailed(String),
    /// Failed to remove a value
    RemoveFailed(String),
    /// IO error
    Io(String),
    /// Other error
    Other(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ReadFailed(msg) => write!(f, "Failed to read value: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "Failed to write value: {}", msg),
            StorageError::RemoveFailed(msg) => write!(f, "Failed to remove value: {}", msg),
            StorageError::Io(msg) => write!(f, "IO error: {}", msg),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Trait for durable key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if nothing is stored under the key
    /// - `Err(error)` if reading failed
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        assert_eq!(
            StorageError::ReadFailed("bad utf-8".to_string()).to_string(),
            "Failed to read value: bad utf-8"
        );
        assert_eq!(
            StorageError::WriteFailed("disk full".to_string()).to_string(),
            "Failed to write value: disk full"
        );
        assert_eq!(
            StorageError::RemoveFailed("busy".to_string()).to_string(),
            "Failed to remove value: busy"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Io(ref msg) if msg.contains("denied")));
    }
}
