//! Encrypted secret storage and app password gate for the Anam wallet
//!
//! Holds the only persisted copy of the master password verifier. Nothing
//! in this crate is reachable from mini-app content.
//!
//! ## Security Features
//!
//! - **Secret Store**: SQLite rows sealed with ChaCha20-Poly1305, key name bound as AAD
//! - **Master Key Sealing**: store key wrapped by a platform keystore (Android Keystore, Keychain, ...)
//! - **Password KDF**: scrypt verifier, parameters persisted with every record
//! - **Constant-time Verification**: verifier comparison via `subtle`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credential_gate;
pub mod database;
pub mod error;
pub mod kdf;
pub mod keystore;
pub mod migrations;
pub mod secret_store;
pub mod security;

pub use credential_gate::{
    CredentialGate, GateError, GateState, VerifierRecord, KDF_PARAMS_KEY, SALT_KEY, VERIFIER_KEY,
};
pub use database::SqliteSecretStore;
pub use error::{Error, Result};
pub use kdf::{compare, derive};
pub use keystore::{
    KeystoreCapabilities, Platform, PlatformKeystore, SealedKey, SoftwareKeystore,
};
pub use secret_store::{BatchOp, MemorySecretStore, SecretStore};
pub use security::{generate_salt, EncryptionAlgorithm, MasterKey};

pub use anam_params::{KdfParams, DERIVED_KEY_LEN};
