//! SQLite secret store integration tests
//!
//! Persistence across reopen, encryption at rest, atomic batches.

use anam_vault::{BatchOp, Error, SecretStore, SoftwareKeystore, SqliteSecretStore};
use tempfile::TempDir;

fn file_contains(path: &std::path::Path, needle: &[u8]) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => bytes.windows(needle.len()).any(|w| w == needle),
        Err(_) => false,
    }
}

#[test]
fn test_values_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("vault.sqlite3");
    let key_path = temp_dir.path().join("keystore.bin");

    {
        let keystore = SoftwareKeystore::open_file(&key_path).unwrap();
        let store = SqliteSecretStore::open(&db_path, &keystore).unwrap();
        store.put("wallet_seed", b"abandon abandon about").unwrap();
    }

    let keystore = SoftwareKeystore::open_file(&key_path).unwrap();
    let store = SqliteSecretStore::open(&db_path, &keystore).unwrap();
    assert_eq!(
        store.get("wallet_seed").unwrap().unwrap().as_slice(),
        b"abandon abandon about"
    );
}

#[test]
fn test_reopen_with_foreign_keystore_fails() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("vault.sqlite3");

    {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open(&db_path, &keystore).unwrap();
        store.put("k", b"v").unwrap();
    }

    let result = SqliteSecretStore::open(&db_path, &SoftwareKeystore::ephemeral());
    assert!(matches!(result, Err(Error::Keystore(_))));
}

#[test]
fn test_no_plaintext_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("vault.sqlite3");
    let secret = b"super-secret-keystore-material";

    {
        let keystore = SoftwareKeystore::ephemeral();
        let store = SqliteSecretStore::open(&db_path, &keystore).unwrap();
        store.put("keystore", secret).unwrap();
    }

    let wal_path = temp_dir.path().join("vault.sqlite3-wal");
    assert!(!file_contains(&db_path, secret));
    assert!(!file_contains(&wal_path, secret));
}

#[test]
fn test_batch_is_atomic() {
    let keystore = SoftwareKeystore::ephemeral();
    let store = SqliteSecretStore::open_in_memory(&keystore).unwrap();
    store.put("existing", b"before").unwrap();

    let result = store.write_batch(&[
        BatchOp::Put {
            key: "existing",
            value: b"after",
        },
        BatchOp::Delete { key: "not a key" },
    ]);
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(store.get("existing").unwrap().unwrap().as_slice(), b"before");

    store
        .write_batch(&[
            BatchOp::Put {
                key: "a",
                value: b"1",
            },
            BatchOp::Put {
                key: "b",
                value: b"2",
            },
            BatchOp::Delete { key: "existing" },
        ])
        .unwrap();
    let values = store.get_many(&["a", "b", "existing"]).unwrap();
    assert_eq!(values[0].as_deref().map(Vec::as_slice), Some(&b"1"[..]));
    assert_eq!(values[1].as_deref().map(Vec::as_slice), Some(&b"2"[..]));
    assert!(values[2].is_none());
}

#[test]
fn test_concurrent_writers_never_tear() {
    let keystore = SoftwareKeystore::ephemeral();
    let store = std::sync::Arc::new(SqliteSecretStore::open_in_memory(&keystore).unwrap());
    store.put("k", &[0u8; 64]).unwrap();

    let handles: Vec<_> = (1u8..=4)
        .map(|n| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store.put("k", &[n; 64]).unwrap();
                    let value = store.get("k").unwrap().unwrap();
                    assert!(value.iter().all(|&b| b == value[0]));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
