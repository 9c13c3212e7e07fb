//! Mini-app manifest model
//!
//! Manifests are loaded by the hub from each mini-app bundle. This crate
//! only reads them; nothing here writes a manifest back.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Page extension stripped during normalization
pub const PAGE_EXTENSION: &str = ".html";

/// Mini-app descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniAppManifest {
    /// Mini-app (blockchain) identifier, used as the sandbox origin label
    pub app_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Bundle version
    #[serde(default)]
    pub version: String,
    /// Declared pages, in manifest order
    #[serde(default)]
    pub pages: Vec<String>,
}

impl MiniAppManifest {
    /// Create a manifest with the given pages
    pub fn new(app_id: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: String::new(),
            version: String::new(),
            pages,
        }
    }

    /// Parse and validate a manifest from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The app id must be usable as a single DNS label
    pub fn validate(&self) -> Result<()> {
        let id = self.app_id.as_str();
        let valid = !id.is_empty()
            && id.len() <= 63
            && !id.starts_with('-')
            && !id.ends_with('-')
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(Error::InvalidManifest(format!("invalid app id: {:?}", id)));
        }
        Ok(())
    }

    /// Declared pages in normalized form, manifest order preserved
    pub fn normalized_pages(&self) -> Vec<String> {
        self.pages
            .iter()
            .map(|page| normalize_page(page).to_string())
            .collect()
    }
}

/// Strip one leading `/` and one trailing `.html`
pub fn normalize_page(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix(PAGE_EXTENSION).unwrap_or(path)
}
