//! App password gate
//!
//! Stores a scrypt verifier of the master password, never the password.
//! The record lives under three fixed keys in the secret store and is
//! always written and removed as one batch.

use crate::kdf;
use crate::secret_store::{BatchOp, SecretStore};
use crate::security::generate_salt;
use crate::Error;
use anam_params::{KdfParams, DERIVED_KEY_LEN};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tokio::sync::watch;
use zeroize::Zeroizing;

/// Secret store key of the verifier
pub const VERIFIER_KEY: &str = "app_password_verifier";
/// Secret store key of the salt
pub const SALT_KEY: &str = "app_password_salt";
/// Secret store key of the KDF parameters
pub const KDF_PARAMS_KEY: &str = "kdf_params";

const RECORD_KEYS: [&str; 3] = [VERIFIER_KEY, SALT_KEY, KDF_PARAMS_KEY];

const DECOY_SALT: [u8; 32] = [0u8; 32];

/// Gate failures visible to the presentation layer
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Empty password
    #[error("Password must not be empty")]
    EmptyPassword,

    /// Secret store I/O or crypto failure
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] Error),
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No verifier record
    NoPasswordSet,
    /// A verifier record exists
    PasswordSet,
}

/// Persisted verifier record
pub struct VerifierRecord {
    /// Derived verifier
    pub verifier: Zeroizing<[u8; DERIVED_KEY_LEN]>,
    /// Salt used for derivation
    pub salt: [u8; 32],
    /// Parameters used for derivation
    pub params: KdfParams,
}

impl std::fmt::Debug for VerifierRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierRecord")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl VerifierRecord {
    /// Derive a new record for `password` with a fresh salt
    pub fn create(password: &[u8], params: KdfParams) -> crate::Result<Self> {
        let salt = generate_salt();
        let verifier = kdf::derive(password, &salt, &params)?;
        Ok(Self {
            verifier,
            salt,
            params,
        })
    }

    /// Check `password` against this record using the record's own parameters
    pub fn matches(&self, password: &[u8]) -> crate::Result<bool> {
        let candidate = kdf::derive(password, &self.salt, &self.params)?;
        Ok(kdf::compare(candidate.as_slice(), self.verifier.as_slice()))
    }

    /// Store encoding: base64 verifier, base64 salt, JSON params
    fn encode(&self) -> crate::Result<[Zeroizing<Vec<u8>>; 3]> {
        Ok([
            Zeroizing::new(BASE64.encode(self.verifier.as_slice()).into_bytes()),
            Zeroizing::new(BASE64.encode(self.salt).into_bytes()),
            Zeroizing::new(serde_json::to_vec(&self.params)?),
        ])
    }

    fn decode(verifier: &[u8], salt: &[u8], params: &[u8]) -> crate::Result<Self> {
        let verifier_bytes = Zeroizing::new(
            BASE64
                .decode(verifier)
                .map_err(|e| Error::Validation(format!("verifier encoding: {}", e)))?,
        );
        let salt_bytes = BASE64
            .decode(salt)
            .map_err(|e| Error::Validation(format!("salt encoding: {}", e)))?;
        let params: KdfParams = serde_json::from_slice(params)?;

        let mut record = Self {
            verifier: Zeroizing::new([0u8; DERIVED_KEY_LEN]),
            salt: salt_bytes
                .try_into()
                .map_err(|_| Error::Validation("salt length".to_string()))?,
            params,
        };
        if verifier_bytes.len() != DERIVED_KEY_LEN {
            return Err(Error::Validation("verifier length".to_string()));
        }
        record.verifier.copy_from_slice(&verifier_bytes);
        Ok(record)
    }
}

/// Master password gate over a secret store
pub struct CredentialGate {
    store: Arc<dyn SecretStore>,
    default_params: KdfParams,
    state_tx: watch::Sender<bool>,
}

impl CredentialGate {
    /// Create a gate deriving new verifiers with `default_params`
    pub fn new(store: Arc<dyn SecretStore>, default_params: KdfParams) -> Result<Self, GateError> {
        default_params.validate().map_err(Error::from)?;
        let initial = store.contains(VERIFIER_KEY)?;
        let (state_tx, _) = watch::channel(initial);
        Ok(Self {
            store,
            default_params,
            state_tx,
        })
    }

    /// Parameters used for newly set passwords
    pub fn default_params(&self) -> KdfParams {
        self.default_params
    }

    /// Derive and persist a verifier for `password`, replacing any previous one
    pub fn set_password(&self, password: &str) -> Result<(), GateError> {
        if password.is_empty() {
            return Err(GateError::EmptyPassword);
        }

        let record = VerifierRecord::create(password.as_bytes(), self.default_params)?;
        let [verifier, salt, params] = record.encode()?;
        self.store.write_batch(&[
            BatchOp::Put {
                key: VERIFIER_KEY,
                value: &verifier,
            },
            BatchOp::Put {
                key: SALT_KEY,
                value: &salt,
            },
            BatchOp::Put {
                key: KDF_PARAMS_KEY,
                value: &params,
            },
        ])?;

        tracing::info!(
            cost = record.params.cost,
            block_size = record.params.block_size,
            parallelism = record.params.parallelism,
            "App password set"
        );
        self.state_tx.send_replace(true);
        Ok(())
    }

    /// Check `password` against the stored verifier
    ///
    /// Returns `Ok(false)` when no password is set or the record is unusable;
    /// `Err` only when the store itself cannot be read.
    pub fn verify_password(&self, password: &str) -> Result<bool, GateError> {
        let record = match self.load_record()? {
            Some(record) => record,
            None => return Ok(false),
        };

        let matched = match record {
            Ok(record) => match record.matches(password.as_bytes()) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(error = %e, "Stored KDF parameters rejected");
                    self.decoy_derivation(password)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Verifier record unreadable");
                self.decoy_derivation(password)
            }
        };

        if !matched {
            tracing::debug!("App password verification failed");
        }
        Ok(matched)
    }

    /// Whether a verifier record is persisted
    pub fn has_password(&self) -> Result<bool, GateError> {
        let present = self.store.contains(VERIFIER_KEY)?;
        self.state_tx.send_if_modified(|current| {
            let changed = *current != present;
            *current = present;
            changed
        });
        Ok(present)
    }

    /// Current gate state
    pub fn state(&self) -> Result<GateState, GateError> {
        Ok(if self.has_password()? {
            GateState::PasswordSet
        } else {
            GateState::NoPasswordSet
        })
    }

    /// Observe `has_password` changes made through this gate
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }

    /// Remove the verifier record; succeeds when none exists
    pub fn clear(&self) -> Result<(), GateError> {
        let ops = RECORD_KEYS.map(|key| BatchOp::Delete { key });
        self.store.write_batch(&ops)?;
        tracing::info!("App password cleared");
        self.state_tx.send_replace(false);
        Ok(())
    }

    /// Pays for one derivation with the default parameters; always `false`
    ///
    /// Keeps an unusable record as slow to reject as a wrong password.
    fn decoy_derivation(&self, password: &str) -> bool {
        let derived = kdf::derive(password.as_bytes(), &DECOY_SALT, &self.default_params);
        tracing::trace!(ran = derived.is_ok(), "Decoy verifier derivation");
        false
    }

    /// Outer `None`: no record. Inner `Err`: record present but corrupt.
    fn load_record(&self) -> Result<Option<crate::Result<VerifierRecord>>, GateError> {
        let values = self.store.get_many(&RECORD_KEYS)?;
        match (&values[0], &values[1], &values[2]) {
            (None, None, None) => Ok(None),
            (Some(verifier), Some(salt), Some(params)) => {
                Ok(Some(VerifierRecord::decode(verifier, salt, params)))
            }
            _ => Ok(Some(Err(Error::Validation(
                "incomplete verifier record".to_string(),
            )))),
        }
    }
}
