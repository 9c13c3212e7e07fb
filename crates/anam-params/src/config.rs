//! Vault and bridge configuration
//!
//! Loaded from a JSON file; every field has a default so a missing file or
//! a partial file is valid.

use crate::kdf::KdfParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Host suffix for sandbox origins (`https://{app_id}.{suffix}/`)
pub const DEFAULT_MINIAPP_HOST_SUFFIX: &str = "miniapp.local";

/// Secret store database file name
pub const DATABASE_FILE_NAME: &str = "vault.sqlite3";

/// Behaviour for manifests that declare no pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPolicy {
    /// Empty page set allows every path (compatible with existing bundles)
    #[default]
    FailOpen,
    /// Empty page set allows nothing
    FailClosed,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the secret store; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// KDF parameters for newly set passwords
    pub kdf: KdfParams,
    /// Empty-manifest navigation behaviour
    pub navigation: NavigationPolicy,
    /// Host suffix for mini-app origins
    pub miniapp_host_suffix: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            kdf: KdfParams::DEFAULT,
            navigation: NavigationPolicy::FailOpen,
            miniapp_host_suffix: DEFAULT_MINIAPP_HOST_SUFFIX.to_string(),
        }
    }
}

impl VaultConfig {
    /// Load config from `path`; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&json)
    }

    /// Parse and validate config JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.kdf.validate()?;
        Ok(config)
    }

    /// Configured data dir, falling back to the platform data dir
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("com", "anam145", "wallet")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(Error::NoDataDir)
    }

    /// Path of the secret store database
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(DATABASE_FILE_NAME))
    }
}
