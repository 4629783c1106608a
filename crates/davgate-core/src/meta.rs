//! Resource metadata.

use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata for a single resource, as reported by a provider.
///
/// The engine derives every live WebDAV property from this plus its own lock
/// state, so providers never deal in protocol concepts.
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    /// Collection (directory) or leaf (file).
    pub is_collection: bool,
    /// Content length in bytes; zero for collections.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Media type, when the provider knows one.
    pub content_type: Option<String>,
}

impl ResourceMeta {
    /// Metadata for a collection.
    pub fn collection(modified: SystemTime) -> Self {
        ResourceMeta {
            is_collection: true,
            len: 0,
            modified,
            content_type: None,
        }
    }

    /// Metadata for a leaf resource.
    pub fn leaf(len: u64, modified: SystemTime, content_type: Option<String>) -> Self {
        ResourceMeta {
            is_collection: false,
            len,
            modified,
            content_type,
        }
    }

    /// Weak entity tag derived from length and modification time.
    pub fn etag(&self) -> String {
        let mtime = self
            .modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("\"{:x}-{:x}\"", self.len, mtime)
    }
}
