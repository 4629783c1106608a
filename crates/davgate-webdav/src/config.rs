//! Engine configuration.
//!
//! The configuration collaborator parses whatever file format it likes and
//! hands the engine one immutable [`DavConfig`] value at startup. Nothing in
//! the engine reads ambient global state, and nothing here changes after
//! construction.

use davgate_core::{DavPath, InvalidPath, LocalFsProvider, MemoryProvider, StorageError};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Immutable engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DavConfig {
    /// Authentication realm presented in challenges.
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Accounts allowed to authenticate.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Mount prefixes and the providers behind them.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    /// Offer the Basic scheme.
    #[serde(default = "default_true")]
    pub auth_basic: bool,
    /// Offer the Digest scheme.
    #[serde(default = "default_true")]
    pub auth_digest: bool,
}

impl Default for DavConfig {
    fn default() -> Self {
        DavConfig {
            realm: default_realm(),
            accounts: Vec::new(),
            mounts: Vec::new(),
            auth_basic: true,
            auth_digest: true,
        }
    }
}

/// One account in the credential table.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    /// Mount prefixes this account may touch. Defaults to everything.
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,
}

/// One mount: a URL prefix bound to a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// URL prefix, e.g. `/dav`.
    pub prefix: String,
    /// Provider locator: `memory://` or `file:///absolute/dir`.
    pub uri: String,
    /// Reject mutation through this mount.
    #[serde(default)]
    pub read_only: bool,
}

fn default_realm() -> String {
    "davgate".to_string()
}

fn default_true() -> bool {
    true
}

fn default_permissions() -> Vec<String> {
    vec!["/".to_string()]
}

/// Fatal engine-construction failure.
///
/// Per-request failures are [`DavError`](crate::DavError)s; anything here
/// means the process must not come up with this configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid mount prefix {0:?}")]
    InvalidPrefix(String, #[source] InvalidPath),

    #[error("duplicate mount prefix {0}")]
    DuplicateMount(String),

    #[error("unsupported provider uri {0:?}")]
    UnsupportedUri(String),

    #[error("provider init failed for mount {prefix}")]
    ProviderInit {
        prefix: String,
        #[source]
        source: StorageError,
    },

    #[error("invalid permission prefix {prefix:?} for account {username}")]
    InvalidPermission {
        username: String,
        prefix: String,
        #[source]
        source: InvalidPath,
    },
}

/// Construct the provider a mount entry points at.
pub(crate) fn build_provider(
    mount: &MountConfig,
) -> Result<Arc<dyn davgate_core::DavProvider>, EngineError> {
    if mount.uri == "memory://" || mount.uri == "memory:///" {
        return Ok(if mount.read_only {
            Arc::new(MemoryProvider::new_read_only())
        } else {
            Arc::new(MemoryProvider::new())
        });
    }
    if let Some(dir) = mount.uri.strip_prefix("file://") {
        let provider = if mount.read_only {
            LocalFsProvider::new_read_only(Path::new(dir))
        } else {
            LocalFsProvider::new(Path::new(dir))
        };
        return provider
            .map(|p| Arc::new(p) as Arc<dyn davgate_core::DavProvider>)
            .map_err(|source| EngineError::ProviderInit {
                prefix: mount.prefix.clone(),
                source,
            });
    }
    Err(EngineError::UnsupportedUri(mount.uri.clone()))
}

/// Parse a configured prefix string into a [`DavPath`].
pub(crate) fn parse_prefix(prefix: &str) -> Result<DavPath, EngineError> {
    DavPath::parse(prefix).map_err(|e| EngineError::InvalidPrefix(prefix.to_string(), e))
}
