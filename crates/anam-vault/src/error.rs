//! Error types

/// Vault errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Platform keystore error
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// Key derivation error
    #[error("KDF error: {0}")]
    Kdf(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage error (generic)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<anam_params::Error> for Error {
    fn from(e: anam_params::Error) -> Self {
        Error::Kdf(e.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
