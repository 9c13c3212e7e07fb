//! Manifest-driven navigation allowlist
//!
//! A mini-app may only navigate to pages its manifest declares, or to
//! sub-paths of them. Rejections are logged and dropped; the sandbox is
//! never told and never redirected.

use anam_params::manifest::{normalize_page, PAGE_EXTENSION};
use anam_params::{MiniAppManifest, NavigationPolicy, VaultConfig, DEFAULT_MINIAPP_HOST_SUFFIX};
use url::Url;

/// Navigation guard for one mini-app
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    app_id: String,
    pages: Vec<String>,
    policy: NavigationPolicy,
    host_suffix: String,
}

impl NavigationGuard {
    /// Guard for `manifest` on the default host suffix
    pub fn new(manifest: &MiniAppManifest, policy: NavigationPolicy) -> Self {
        Self {
            app_id: manifest.app_id.clone(),
            pages: manifest.normalized_pages(),
            policy,
            host_suffix: DEFAULT_MINIAPP_HOST_SUFFIX.to_string(),
        }
    }

    /// Guard using the policy and host suffix from `config`
    pub fn from_config(manifest: &MiniAppManifest, config: &VaultConfig) -> Self {
        Self::new(manifest, config.navigation).with_host_suffix(&config.miniapp_host_suffix)
    }

    /// Override the origin host suffix
    pub fn with_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.host_suffix = suffix.into();
        self
    }

    /// Sandbox origin host, `{app_id}.{suffix}`
    pub fn host(&self) -> String {
        format!("{}.{}", self.app_id, self.host_suffix)
    }

    /// Whether `requested` (path with optional `?query`) may be loaded
    pub fn is_allowed(&self, requested: &str) -> bool {
        self.target(requested).is_some()
    }

    /// Target URL for an allowed navigation
    pub fn resolve(&self, requested: &str) -> Option<Url> {
        let url = self.target(requested);
        if url.is_none() {
            tracing::warn!(
                requested = %requested.escape_debug(),
                allowed = ?self.pages,
                "Navigation blocked: not in manifest pages"
            );
        }
        url
    }

    /// Matching runs on the parsed URL path, after the URL parser has
    /// decoded dot segments and dropped tabs and newlines.
    fn target(&self, requested: &str) -> Option<Url> {
        if requested.chars().any(char::is_control) {
            return None;
        }
        let (path, query) = split_query(requested);
        if !is_page_path(path) {
            return None;
        }

        let path = path.strip_prefix('/').unwrap_or(path);
        let mut target = format!("https://{}/{}", self.host(), path);
        if !path.ends_with(PAGE_EXTENSION) {
            target.push_str(PAGE_EXTENSION);
        }
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }

        let url = match Url::parse(&target) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "Navigation target unparsable");
                return None;
            }
        };
        if url.host_str() != Some(self.host().as_str()) {
            return None;
        }
        self.permits(normalize_page(url.path())).then_some(url)
    }

    fn permits(&self, page: &str) -> bool {
        if page.is_empty() {
            return false;
        }
        if self.pages.is_empty() {
            return self.policy == NavigationPolicy::FailOpen;
        }
        self.pages.iter().any(|declared| {
            page == declared.as_str()
                || page
                    .strip_prefix(declared.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn split_query(requested: &str) -> (&str, Option<&str>) {
    match requested.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (requested, None),
    }
}

/// Relative page path: non-empty, no scheme or authority, no `..` segments
fn is_page_path(path: &str) -> bool {
    let relative = path.strip_prefix('/').unwrap_or(path);
    if relative.is_empty() || relative.starts_with('/') || path.contains('\\') {
        return false;
    }
    let first_segment = relative.split('/').next().unwrap_or_default();
    if first_segment.contains(':') {
        return false;
    }
    !relative.split('/').any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn guard(pages: &[&str]) -> NavigationGuard {
        let manifest =
            MiniAppManifest::new("ethereum", pages.iter().map(|p| p.to_string()).collect());
        NavigationGuard::new(&manifest, NavigationPolicy::FailOpen)
    }

    #[test]
    fn test_declared_pages_and_subpaths() {
        let guard = guard(&["wallet", "wallet/send"]);
        assert!(guard.is_allowed("wallet"));
        assert!(guard.is_allowed("wallet.html"));
        assert!(guard.is_allowed("/wallet.html"));
        assert!(guard.is_allowed("wallet/send?amount=1"));
        assert!(guard.is_allowed("wallet/send/confirm"));
        assert!(!guard.is_allowed("settings"));
        assert!(!guard.is_allowed("walletx"));
    }

    #[test]
    fn test_manifest_entries_are_normalized() {
        let guard = guard(&["/pages/index.html"]);
        assert!(guard.is_allowed("pages/index"));
        assert!(guard.is_allowed("/pages/index.html?tab=1"));
    }

    #[test]
    fn test_traversal_and_schemes_rejected() {
        let guard = guard(&[]);
        assert!(!guard.is_allowed("wallet/../../etc/passwd"));
        assert!(!guard.is_allowed("//evil.example/wallet"));
        assert!(!guard.is_allowed("https://evil.example/wallet"));
        assert!(!guard.is_allowed("javascript:alert(1)"));
        assert!(!guard.is_allowed("wallet\\..\\x"));
        assert!(!guard.is_allowed(""));
        assert!(!guard.is_allowed("?q=1"));
    }

    #[test]
    fn test_encoded_dot_segments_rejected() {
        let guard = guard(&["wallet"]);
        assert!(!guard.is_allowed("settings"));
        for requested in [
            "wallet/%2e%2e/settings",
            "wallet/.%2E/settings",
            "wallet/%2E./settings",
            "wallet/.\n./settings",
            "wallet/.\t./settings",
            "wallet/.\r./settings",
        ] {
            assert!(!guard.is_allowed(requested), "{:?}", requested);
            assert!(guard.resolve(requested).is_none(), "{:?}", requested);
        }
        assert!(guard.is_allowed("wallet/%2e%2e"));
        assert!(guard.is_allowed("wallet/./send"));
    }

    #[test]
    fn test_resolve_builds_origin_url() {
        let guard = guard(&["wallet", "wallet/send"]);
        assert_eq!(
            guard.resolve("wallet").unwrap().as_str(),
            "https://ethereum.miniapp.local/wallet.html"
        );
        assert_eq!(
            guard.resolve("/wallet/send.html?amount=1").unwrap().as_str(),
            "https://ethereum.miniapp.local/wallet/send.html?amount=1"
        );
        assert!(guard.resolve("settings").is_none());
    }

    #[test]
    fn test_custom_host_suffix() {
        let guard = guard(&[]).with_host_suffix("apps.test");
        assert_eq!(
            guard.resolve("home").unwrap().as_str(),
            "https://ethereum.apps.test/home.html"
        );
    }

    proptest! {
        #[test]
        fn prop_resolved_urls_stay_on_origin(requested in "[a-z/.?=:%@#\\\\-]{0,24}") {
            let guard = guard(&[]);
            if let Some(url) = guard.resolve(&requested) {
                prop_assert_eq!(url.scheme(), "https");
                prop_assert_eq!(url.host_str(), Some("ethereum.miniapp.local"));
            }
        }
    }
}
