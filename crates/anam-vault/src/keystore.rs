//! Platform keystore integration for sealing the store key
//!
//! The secret store's data-encryption key is only ever persisted sealed by
//! a [`PlatformKeystore`]. On device the implementation bridges to the
//! hardware-backed keystore (Android Keystore / StrongBox, Keychain with
//! Secure Enclave); [`SoftwareKeystore`] covers tests and desktop tooling.

use crate::{EncryptionAlgorithm, Error, MasterKey, Result};
use std::path::Path;

/// Sealed key blob format version
const SEALED_KEY_VERSION: u8 = 1;

/// Platform capabilities for secure storage
#[derive(Debug, Clone, Default)]
pub struct KeystoreCapabilities {
    /// Has hardware-backed secure storage (TEE, StrongBox, Secure Enclave)
    pub has_secure_hardware: bool,
    /// Platform name
    pub platform: Platform,
}

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// Android (Keystore, StrongBox)
    Android,
    /// iOS (Keychain, Secure Enclave)
    Ios,
    /// macOS (Keychain, Secure Enclave)
    MacOs,
    /// Windows (DPAPI)
    Windows,
    /// Linux (libsecret)
    Linux,
    /// Unknown platform
    #[default]
    Unknown,
}

impl Platform {
    /// Detect current platform at compile time
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }
}

/// Master key wrapped by a platform keystore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    /// Encrypted master key
    pub encrypted_key: Vec<u8>,
    /// Key identifier inside the platform keystore
    pub key_id: String,
    /// Algorithm of the wrapped key
    pub algorithm: EncryptionAlgorithm,
}

impl SealedKey {
    /// Create new sealed key
    pub fn new(encrypted_key: Vec<u8>, key_id: String, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            encrypted_key,
            key_id,
            algorithm,
        }
    }

    /// Serialize for storage
    ///
    /// Format: `[version(1)][algorithm(1)][id_len(4 LE)][id][key_len(4 LE)][key]`
    pub fn serialize(&self) -> Vec<u8> {
        let key_id_bytes = self.key_id.as_bytes();
        let mut data =
            Vec::with_capacity(10 + key_id_bytes.len() + self.encrypted_key.len());
        data.push(SEALED_KEY_VERSION);
        data.push(self.algorithm.tag());
        data.extend_from_slice(&(key_id_bytes.len() as u32).to_le_bytes());
        data.extend_from_slice(key_id_bytes);
        data.extend_from_slice(&(self.encrypted_key.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.encrypted_key);
        data
    }

    /// Deserialize from storage
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Reader { data, pos: 0 };

        if reader.take(1)?[0] != SEALED_KEY_VERSION {
            return Err(Error::Keystore("Unknown sealed key version".to_string()));
        }
        let algorithm = EncryptionAlgorithm::from_tag(reader.take(1)?[0])?;

        let key_id_len = reader.take_len()?;
        let key_id = String::from_utf8(reader.take(key_id_len)?.to_vec())
            .map_err(|_| Error::Keystore("Invalid key ID".to_string()))?;

        let key_len = reader.take_len()?;
        let encrypted_key = reader.take(key_len)?.to_vec();

        if reader.pos != data.len() {
            return Err(Error::Keystore("Trailing sealed key data".to_string()));
        }

        Ok(Self {
            encrypted_key,
            key_id,
            algorithm,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::Keystore("Truncated sealed key data".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_len(&mut self) -> Result<usize> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }
}

/// Platform keystore abstraction
///
/// Implementations wrap keys with a key-encryption key that never leaves
/// the platform keystore.
pub trait PlatformKeystore: Send + Sync {
    /// Get platform capabilities
    fn capabilities(&self) -> KeystoreCapabilities;

    /// Seal (encrypt) a master key
    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey>;

    /// Unseal (decrypt) a master key
    fn unseal_key(&self, sealed: &SealedKey) -> Result<MasterKey>;
}

/// Software keystore for tests and desktop tooling
///
/// Wraps keys with an AES-256-GCM key-encryption key held in process memory,
/// optionally loaded from a file. Offers no hardware protection.
pub struct SoftwareKeystore {
    kek: MasterKey,
}

impl SoftwareKeystore {
    /// Keystore with a fresh in-memory key-encryption key
    pub fn ephemeral() -> Self {
        Self {
            kek: MasterKey::generate(EncryptionAlgorithm::AesGcm),
        }
    }

    /// Keystore whose key-encryption key lives in `path`, created if absent
    ///
    /// A new key is written to a private temporary file and hard-linked into
    /// place, so concurrent first opens agree on one key and never observe a
    /// partially written file.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => Self::from_file_bytes(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match Self::create_file(path)? {
                Some(kek) => {
                    tracing::info!(path = %path.display(), "Created software keystore");
                    Ok(Self { kek })
                }
                None => {
                    let bytes = std::fs::read(path)
                        .map_err(|e| Error::Keystore(format!("read keystore file: {}", e)))?;
                    Self::from_file_bytes(&bytes)
                }
            },
            Err(e) => Err(Error::Keystore(format!("read keystore file: {}", e))),
        }
    }

    fn from_file_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            kek: MasterKey::from_bytes(bytes, EncryptionAlgorithm::AesGcm)?,
        })
    }

    /// `None` when another opener published a key first
    fn create_file(path: &Path) -> Result<Option<MasterKey>> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Keystore(format!("create keystore dir: {}", e)))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Keystore("keystore path has no file name".to_string()))?;
        let staging = parent.join(format!(
            ".{}.{:016x}.tmp",
            file_name.to_string_lossy(),
            rand::random::<u64>()
        ));

        let kek = MasterKey::generate(EncryptionAlgorithm::AesGcm);
        write_private(&staging, kek.as_bytes())?;
        let published = std::fs::hard_link(&staging, path);
        if let Err(e) = std::fs::remove_file(&staging) {
            tracing::warn!(path = %staging.display(), error = %e, "Failed to remove keystore staging file");
        }
        match published {
            Ok(()) => Ok(Some(kek)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::Keystore(format!("publish keystore file: {}", e))),
        }
    }
}

/// Create `path` readable by the owner only and write `bytes`
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|e| Error::Keystore(format!("create keystore file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::Keystore(format!("write keystore file: {}", e)))
}

impl PlatformKeystore for SoftwareKeystore {
    fn capabilities(&self) -> KeystoreCapabilities {
        KeystoreCapabilities {
            has_secure_hardware: false,
            platform: Platform::current(),
        }
    }

    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey> {
        let encrypted = self
            .kek
            .encrypt(key.as_bytes(), key_id.as_bytes())
            .map_err(|e| Error::Keystore(e.to_string()))?;
        Ok(SealedKey::new(encrypted, key_id.to_string(), key.algorithm()))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> Result<MasterKey> {
        let key_bytes = self
            .kek
            .decrypt(&sealed.encrypted_key, sealed.key_id.as_bytes())
            .map_err(|e| Error::Keystore(e.to_string()))?;
        MasterKey::from_bytes(&key_bytes, sealed.algorithm)
    }
}
