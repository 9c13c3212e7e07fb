//! Credential gate integration tests

use anam_vault::{
    BatchOp, CredentialGate, Error, GateError, KdfParams, MemorySecretStore, Result, SecretStore,
    SoftwareKeystore, SqliteSecretStore, KDF_PARAMS_KEY, SALT_KEY, VERIFIER_KEY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use zeroize::Zeroizing;

const FAST: KdfParams = KdfParams {
    cost: 4,
    block_size: 8,
    parallelism: 1,
};

/// Store whose writes or reads can be made to fail
#[derive(Default)]
struct BrokenStore {
    inner: MemorySecretStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl SecretStore for BrokenStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk unreadable".to_string()));
        }
        self.inner.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Zeroizing<Vec<u8>>>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk unreadable".to_string()));
        }
        self.inner.get_many(keys)
    }

    fn write_batch(&self, ops: &[BatchOp<'_>]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".to_string()));
        }
        self.inner.write_batch(ops)
    }
}

#[test]
fn test_sqlite_backed_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("vault.sqlite3");
    let key_path = temp_dir.path().join("keystore.bin");

    {
        let keystore = SoftwareKeystore::open_file(&key_path).unwrap();
        let store = Arc::new(SqliteSecretStore::open(&db_path, &keystore).unwrap());
        let gate = CredentialGate::new(store, FAST).unwrap();
        gate.set_password("correct-horse").unwrap();
        assert!(gate.verify_password("correct-horse").unwrap());
    }

    // fresh process: no cached state
    let keystore = SoftwareKeystore::open_file(&key_path).unwrap();
    let store = Arc::new(SqliteSecretStore::open(&db_path, &keystore).unwrap());
    let gate = CredentialGate::new(store, FAST).unwrap();
    assert!(gate.has_password().unwrap());
    assert!(gate.verify_password("correct-horse").unwrap());
    assert!(!gate.verify_password("wrong").unwrap());
    assert!(!gate.verify_password("").unwrap());
}

#[test]
fn test_stored_params_survive_default_change() {
    let store = Arc::new(MemorySecretStore::new());
    CredentialGate::new(store.clone(), FAST)
        .unwrap()
        .set_password("correct-horse")
        .unwrap();

    let stronger = KdfParams {
        cost: 6,
        block_size: 8,
        parallelism: 1,
    };
    let gate = CredentialGate::new(store.clone(), stronger).unwrap();
    assert!(gate.verify_password("correct-horse").unwrap());

    let params = store.get(KDF_PARAMS_KEY).unwrap().unwrap();
    let params: KdfParams = serde_json::from_slice(&params).unwrap();
    assert_eq!(params, FAST);

    gate.set_password("correct-horse").unwrap();
    let params = store.get(KDF_PARAMS_KEY).unwrap().unwrap();
    let params: KdfParams = serde_json::from_slice(&params).unwrap();
    assert_eq!(params, stronger);
}

#[test]
fn test_failed_write_leaves_no_record() {
    let store = Arc::new(BrokenStore::default());
    let gate = CredentialGate::new(store.clone(), FAST).unwrap();
    store.fail_writes.store(true, Ordering::SeqCst);

    let result = gate.set_password("correct-horse");
    assert!(matches!(result, Err(GateError::StorageFailure(_))));
    assert!(!gate.has_password().unwrap());
    for key in [VERIFIER_KEY, SALT_KEY, KDF_PARAMS_KEY] {
        assert!(store.get(key).unwrap().is_none());
    }
    assert!(!*gate.subscribe().borrow());
}

#[test]
fn test_failed_clear_keeps_record() {
    let store = Arc::new(BrokenStore::default());
    let gate = CredentialGate::new(store.clone(), FAST).unwrap();
    gate.set_password("correct-horse").unwrap();
    store.fail_writes.store(true, Ordering::SeqCst);

    assert!(matches!(gate.clear(), Err(GateError::StorageFailure(_))));
    assert!(gate.verify_password("correct-horse").unwrap());
}

#[test]
fn test_unreadable_store_is_storage_failure() {
    let store = Arc::new(BrokenStore::default());
    let gate = CredentialGate::new(store.clone(), FAST).unwrap();
    gate.set_password("pw").unwrap();
    store.fail_reads.store(true, Ordering::SeqCst);

    assert!(matches!(
        gate.verify_password("pw"),
        Err(GateError::StorageFailure(Error::Storage(_)))
    ));
    assert!(matches!(
        gate.has_password(),
        Err(GateError::StorageFailure(_))
    ));
}

#[test]
fn test_verifier_is_not_the_password() {
    let store = Arc::new(MemorySecretStore::new());
    let gate = CredentialGate::new(store.clone(), FAST).unwrap();
    gate.set_password("correct-horse").unwrap();

    for key in [VERIFIER_KEY, SALT_KEY, KDF_PARAMS_KEY] {
        let value = store.get(key).unwrap().unwrap();
        assert!(!value
            .windows(b"correct-horse".len())
            .any(|w| w == b"correct-horse"));
    }
}

#[test]
fn test_fresh_salt_per_set() {
    let store = Arc::new(MemorySecretStore::new());
    let gate = CredentialGate::new(store.clone(), FAST).unwrap();

    gate.set_password("same").unwrap();
    let first_salt = store.get(SALT_KEY).unwrap().unwrap();
    let first_verifier = store.get(VERIFIER_KEY).unwrap().unwrap();

    gate.set_password("same").unwrap();
    assert_ne!(store.get(SALT_KEY).unwrap().unwrap(), first_salt);
    assert_ne!(store.get(VERIFIER_KEY).unwrap().unwrap(), first_verifier);
}

#[tokio::test]
async fn test_subscribers_notified() {
    let store = Arc::new(MemorySecretStore::new());
    let gate = Arc::new(CredentialGate::new(store, FAST).unwrap());
    let mut rx = gate.subscribe();

    let setter = gate.clone();
    tokio::task::spawn_blocking(move || setter.set_password("pw").unwrap())
        .await
        .unwrap();
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());

    gate.clear().unwrap();
    rx.changed().await.unwrap();
    assert!(!*rx.borrow_and_update());
}
