//! Anam wallet parameters and configuration
//!
//! This crate provides the KDF policy, mini-app manifest model and the
//! on-disk configuration shared by the vault and the mini-app bridge.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod kdf;
pub mod manifest;

pub use config::{NavigationPolicy, VaultConfig, DEFAULT_MINIAPP_HOST_SUFFIX};
pub use kdf::{KdfParams, DERIVED_KEY_LEN};
pub use manifest::MiniAppManifest;

/// Error types for parameter and configuration operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file could not be read
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or manifest JSON is malformed
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid KDF parameters
    #[error("Invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    /// Invalid manifest
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// No usable data directory
    #[error("Data directory unavailable")]
    NoDataDir,
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
