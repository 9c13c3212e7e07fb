//! SQLite-backed secret store

use crate::keystore::{PlatformKeystore, SealedKey};
use crate::secret_store::{validate_key, BatchOp, SecretStore};
use crate::security::{EncryptionAlgorithm, MasterKey};
use crate::{migrations, Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use zeroize::Zeroizing;

/// Platform keystore alias of the store key
pub const MASTER_KEY_ID: &str = "anam_vault_master";

const SEALED_KEY_META: &str = "sealed_master_key";

/// Encrypted secret store on a SQLite database
///
/// Every value is sealed with the store key and bound to its row key as
/// associated data. The connection mutex serializes all access, so reads
/// and writes on the same key are linearizable.
pub struct SqliteSecretStore {
    conn: Mutex<Connection>,
    master_key: MasterKey,
}

impl SqliteSecretStore {
    /// Open (or create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P, keystore: &dyn PlatformKeystore) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("create data dir: {}", e)))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // journal_mode returns a row
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened secret store");

        Self::init(conn, keystore)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory(keystore: &dyn PlatformKeystore) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, keystore)
    }

    fn init(conn: Connection, keystore: &dyn PlatformKeystore) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        let master_key = load_or_create_master_key(&conn, keystore)?;
        Ok(Self {
            conn: Mutex::new(conn),
            master_key,
        })
    }

    fn decrypt_row(&self, key: &str, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.master_key.decrypt(blob, key.as_bytes()).map_err(|e| {
            tracing::warn!(key = %key, "Secret row failed authentication");
            e
        })
    }
}

fn load_or_create_master_key(
    conn: &Connection,
    keystore: &dyn PlatformKeystore,
) -> Result<MasterKey> {
    let existing: Option<Vec<u8>> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![SEALED_KEY_META],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(bytes) = existing {
        let sealed = SealedKey::deserialize(&bytes)?;
        return keystore.unseal_key(&sealed);
    }

    let key = MasterKey::generate(EncryptionAlgorithm::ChaCha20Poly1305);
    let sealed = keystore.seal_key(&key, MASTER_KEY_ID)?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)",
        params![SEALED_KEY_META, sealed.serialize()],
    )?;
    tracing::info!(
        hardware_backed = keystore.capabilities().has_secure_hardware,
        "Generated new secret store key"
    );
    Ok(key)
}

impl SecretStore for SqliteSecretStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        validate_key(key)?;
        let blob: Option<Vec<u8>> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM secrets WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|blob| self.decrypt_row(key, &blob)).transpose()
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Zeroizing<Vec<u8>>>>> {
        for key in keys {
            validate_key(key)?;
        }
        let blobs = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let mut blobs = Vec::with_capacity(keys.len());
            {
                let mut stmt = tx.prepare_cached("SELECT value FROM secrets WHERE key = ?1")?;
                for key in keys {
                    let blob: Option<Vec<u8>> =
                        stmt.query_row(params![key], |row| row.get(0)).optional()?;
                    blobs.push(blob);
                }
            }
            tx.commit()?;
            blobs
        };

        keys.iter()
            .zip(blobs)
            .map(|(key, blob)| blob.map(|blob| self.decrypt_row(key, &blob)).transpose())
            .collect()
    }

    fn write_batch(&self, ops: &[BatchOp<'_>]) -> Result<()> {
        for op in ops {
            validate_key(op.key())?;
        }
        // Encrypt before taking the lock so a crypto failure leaves nothing written
        let sealed: Vec<Option<Vec<u8>>> = ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => {
                    self.master_key.encrypt(value, key.as_bytes()).map(Some)
                }
                BatchOp::Delete { .. } => Ok(None),
            })
            .collect::<Result<_>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (op, blob) in ops.iter().zip(sealed) {
            match blob {
                Some(blob) => {
                    tx.execute(
                        "INSERT INTO secrets (key, value, updated_at)
                         VALUES (?1, ?2, strftime('%s', 'now'))
                         ON CONFLICT(key) DO UPDATE SET
                             value = excluded.value,
                             updated_at = excluded.updated_at",
                        params![op.key(), blob],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM secrets WHERE key = ?1", params![op.key()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM secrets WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::SoftwareKeystore;

    #[test]
    fn test_open_in_memory() {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open_in_memory(&keystore).unwrap();
        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_slice(), b"v");
    }

    #[test]
    fn test_put_replaces_value() {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open_in_memory(&keystore).unwrap();
        store.put("k", b"old").unwrap();
        store.put("k", b"new").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_slice(), b"new");
    }

    #[test]
    fn test_rows_are_encrypted() {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open_in_memory(&keystore).unwrap();
        store.put("k", b"plaintext secret").unwrap();

        let raw: Vec<u8> = store
            .conn
            .lock()
            .query_row("SELECT value FROM secrets WHERE key = 'k'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!raw
            .windows(b"plaintext secret".len())
            .any(|w| w == b"plaintext secret"));
    }

    #[test]
    fn test_swapped_rows_fail_authentication() {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open_in_memory(&keystore).unwrap();
        store.put("a", b"alpha").unwrap();
        store.put("b", b"beta").unwrap();

        store
            .conn
            .lock()
            .execute(
                "UPDATE secrets SET value = (SELECT value FROM secrets WHERE key = 'b') WHERE key = 'a'",
                [],
            )
            .unwrap();
        assert!(matches!(store.get("a"), Err(Error::Encryption(_))));
    }
}
