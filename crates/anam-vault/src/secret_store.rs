//! Secret store abstraction
//!
//! Durable, encrypted key-value persistence for named blobs. Every
//! implementation must make a `get` observe either the previous or the
//! fully written new value, never a partial write, and must apply a
//! [`SecretStore::write_batch`] all-or-nothing.

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// Maximum key length
pub const MAX_KEY_LENGTH: usize = 128;

/// One write inside an atomic batch
#[derive(Debug, Clone, Copy)]
pub enum BatchOp<'a> {
    /// Insert or replace `key`
    Put {
        /// Key
        key: &'a str,
        /// Plaintext value
        value: &'a [u8],
    },
    /// Remove `key`; absent keys are not an error
    Delete {
        /// Key
        key: &'a str,
    },
}

impl BatchOp<'_> {
    /// Key touched by this op
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Encrypted key-value store for named blobs
pub trait SecretStore: Send + Sync {
    /// Read `key`
    fn get(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Read several keys from one consistent snapshot
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Zeroizing<Vec<u8>>>>>;

    /// Apply all ops or none
    fn write_batch(&self, ops: &[BatchOp<'_>]) -> Result<()>;

    /// Insert or replace `key`
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write_batch(&[BatchOp::Put { key, value }])
    }

    /// Remove `key`; removing an absent key succeeds
    fn delete(&self, key: &str) -> Result<()> {
        self.write_batch(&[BatchOp::Delete { key }])
    }

    /// Whether `key` holds a value
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Keys are short ASCII identifiers
pub fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid secret key: {:?}", key)))
    }
}

/// Process-local store; contents are lost on drop
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Zeroizing<Vec<u8>>>>> {
        for key in keys {
            validate_key(key)?;
        }
        let entries = self.entries.read();
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn write_batch(&self, ops: &[BatchOp<'_>]) -> Result<()> {
        for op in ops {
            validate_key(op.key())?;
        }
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key.to_string(), Zeroizing::new(value.to_vec()));
                }
                BatchOp::Delete { key } => {
                    entries.remove(*key);
                }
            }
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.entries.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemorySecretStore::new();
        assert!(store.get("alpha").unwrap().is_none());

        store.put("alpha", b"one").unwrap();
        assert_eq!(store.get("alpha").unwrap().unwrap().as_slice(), b"one");
        assert!(store.contains("alpha").unwrap());

        store.delete("alpha").unwrap();
        assert!(store.get("alpha").unwrap().is_none());
        store.delete("alpha").unwrap();
    }

    #[test]
    fn test_invalid_key_rejects_whole_batch() {
        let store = MemorySecretStore::new();
        let result = store.write_batch(&[
            BatchOp::Put {
                key: "good",
                value: b"1",
            },
            BatchOp::Put {
                key: "bad/key",
                value: b"2",
            },
        ]);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_many_snapshot() {
        let store = MemorySecretStore::new();
        store.put("a", b"1").unwrap();
        store.put("c", b"3").unwrap();

        let values = store.get_many(&["a", "b", "c"]).unwrap();
        assert_eq!(values[0].as_deref().map(Vec::as_slice), Some(&b"1"[..]));
        assert!(values[1].is_none());
        assert_eq!(values[2].as_deref().map(Vec::as_slice), Some(&b"3"[..]));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("app_password_salt").is_ok());
        assert!(validate_key("kdf.params-v1").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a b").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }
}
