//! Path-to-provider mount resolution.

use crate::config::EngineError;
use davgate_core::{DavPath, DavProvider};
use std::sync::Arc;

/// One configured mount: a URL prefix bound to a provider.
#[derive(Clone)]
pub struct Mount {
    pub prefix: DavPath,
    pub provider: Arc<dyn DavProvider>,
}

/// A resolved request path.
#[derive(Clone)]
pub struct Resolved {
    /// The provider serving this path.
    pub provider: Arc<dyn DavProvider>,
    /// The mount prefix that won.
    pub prefix: DavPath,
    /// The provider-relative remainder of the path.
    pub relative: DavPath,
}

/// The immutable mount table, built once at engine construction.
///
/// Resolution picks the longest configured prefix that matches the request
/// path on a full segment boundary; overlapping mounts are allowed,
/// identical ones are not.
pub struct MountTable {
    /// Mounts sorted by prefix depth, deepest first, so the first
    /// segment-boundary match is the longest one.
    mounts: Vec<Mount>,
}

impl MountTable {
    /// Build a table, rejecting duplicate prefixes.
    pub fn new(mut mounts: Vec<Mount>) -> Result<Self, EngineError> {
        mounts.sort_by(|a, b| {
            b.prefix
                .depth()
                .cmp(&a.prefix.depth())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        for pair in mounts.windows(2) {
            if pair[0].prefix == pair[1].prefix {
                return Err(EngineError::DuplicateMount(pair[0].prefix.as_url()));
            }
        }
        Ok(MountTable { mounts })
    }

    /// Resolve a request path to its provider, longest prefix wins.
    pub fn resolve(&self, path: &DavPath) -> Option<Resolved> {
        self.mounts.iter().find_map(|mount| {
            path.strip_prefix(&mount.prefix).map(|relative| Resolved {
                provider: Arc::clone(&mount.provider),
                prefix: mount.prefix.clone(),
                relative,
            })
        })
    }

    /// All configured mounts, deepest prefix first.
    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }
}
