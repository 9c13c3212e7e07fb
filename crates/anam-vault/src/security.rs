//! Encryption primitives for the secret store
//!
//! Implements AES-256-GCM and ChaCha20-Poly1305 row encryption with the
//! row key bound as associated data, plus salt generation.

use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use zeroize::Zeroizing;

/// Ciphertext format version
const FORMAT_VERSION: u8 = 1;

/// Header length: version(1) + algorithm(1) + nonce(12)
const HEADER_LEN: usize = 14;

/// Encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM
    AesGcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    /// Wire tag
    pub fn tag(self) -> u8 {
        match self {
            EncryptionAlgorithm::AesGcm => 0,
            EncryptionAlgorithm::ChaCha20Poly1305 => 1,
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(EncryptionAlgorithm::AesGcm),
            1 => Ok(EncryptionAlgorithm::ChaCha20Poly1305),
            other => Err(Error::Encryption(format!("Unknown algorithm: {}", other))),
        }
    }
}

/// Data-encryption key for the secret store
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; 32]>,
    algorithm: EncryptionAlgorithm,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl MasterKey {
    /// Generate new random master key
    pub fn generate(algorithm: EncryptionAlgorithm) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut_slice());
        Self { key, algorithm }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8], algorithm: EncryptionAlgorithm) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Encryption("Invalid key length".to_string()));
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self { key, algorithm })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Algorithm this key encrypts with
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it
    ///
    /// Format: `[version(1)][algorithm(1)][nonce(12)][ciphertext]`
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::AesGcm => {
                let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key[..]));
                cipher.encrypt(aes_gcm::Nonce::from_slice(&nonce_bytes), payload)
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.key[..]));
                cipher.encrypt(chacha20poly1305::Nonce::from_slice(&nonce_bytes), payload)
            }
        }
        .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        result.push(FORMAT_VERSION);
        result.push(self.algorithm.tag());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by [`MasterKey::encrypt`] with the same `aad`
    pub fn decrypt(&self, data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LEN {
            return Err(Error::Encryption("Invalid ciphertext length".to_string()));
        }

        let version = data[0];
        if version != FORMAT_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported encryption version: {}",
                version
            )));
        }

        let algorithm = EncryptionAlgorithm::from_tag(data[1])?;
        if algorithm != self.algorithm {
            return Err(Error::Encryption(format!(
                "Algorithm mismatch: key is {:?}, data is {:?}",
                self.algorithm, algorithm
            )));
        }

        let nonce_bytes = &data[2..HEADER_LEN];
        let payload = Payload {
            msg: &data[HEADER_LEN..],
            aad,
        };

        let plaintext = match algorithm {
            EncryptionAlgorithm::AesGcm => {
                let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key[..]));
                cipher.decrypt(aes_gcm::Nonce::from_slice(nonce_bytes), payload)
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.key[..]));
                cipher.decrypt(chacha20poly1305::Nonce::from_slice(nonce_bytes), payload)
            }
        }
        .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(Zeroizing::new(plaintext))
    }
}

/// Generate secure random 256-bit salt
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}
