//! The property store.
//!
//! Dead (client-supplied) properties live in a table keyed by path; live
//! properties are computed from provider metadata and lock state at read
//! time and are never persisted. The whole DAV: namespace is server-owned:
//! a PROPPATCH touching it fails, and per RFC 4918 that failure vetoes the
//! entire batch for the resource.

use chrono::{DateTime, SecondsFormat, Utc};
use davgate_core::{DavPath, ResourceMeta};
use http::StatusCode;
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// XML-qualified property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropName {
    /// Namespace URI; empty for unnamespaced properties.
    pub ns: String,
    /// Local element name.
    pub name: String,
}

impl PropName {
    /// A property in the DAV: namespace.
    pub fn dav(name: &str) -> Self {
        PropName {
            ns: DAV_NS.to_string(),
            name: name.to_string(),
        }
    }

    /// A property in an arbitrary namespace.
    pub fn new(ns: &str, name: &str) -> Self {
        PropName {
            ns: ns.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether this name is server-owned (live or protected).
    pub fn is_protected(&self) -> bool {
        self.ns == DAV_NS
    }
}

/// The DAV: namespace URI.
pub const DAV_NS: &str = "DAV:";

/// The live properties the engine computes.
pub const LIVE_PROP_NAMES: [&str; 9] = [
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "lockdiscovery",
    "supportedlock",
];

/// A parsed PROPPATCH body: ordered set and remove instructions.
#[derive(Debug, Clone, Default)]
pub struct PropPatch {
    /// Property values to set; values are raw inner XML.
    pub set: Vec<(PropName, String)>,
    /// Property names to remove.
    pub remove: Vec<PropName>,
}

impl PropPatch {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Per-name outcome of a PROPPATCH batch.
#[derive(Debug, Clone)]
pub struct PropOutcome {
    pub name: PropName,
    pub status: StatusCode,
}

/// Inputs for live property computation on one resource.
pub struct LivePropContext<'a> {
    pub path: &'a DavPath,
    pub meta: &'a ResourceMeta,
    /// Pre-rendered `lockdiscovery` inner XML; empty when unlocked.
    pub lockdiscovery: &'a str,
    pub supports_locking: bool,
}

/// Compute the value of one live property.
///
/// Returns `None` for names that are not live; `Some(None)` renders as an
/// empty element, `Some(Some(xml))` carries raw inner XML.
pub fn live_prop_value(name: &str, ctx: &LivePropContext<'_>) -> Option<Option<String>> {
    let modified: DateTime<Utc> = ctx.meta.modified.into();
    match name {
        "creationdate" => Some(Some(modified.to_rfc3339_opts(SecondsFormat::Secs, true))),
        "displayname" => Some(Some(
            escape(ctx.path.name().unwrap_or_default()).into_owned(),
        )),
        "getcontentlength" => {
            if ctx.meta.is_collection {
                None
            } else {
                Some(Some(ctx.meta.len.to_string()))
            }
        }
        "getcontenttype" => Some(Some(if ctx.meta.is_collection {
            "httpd/unix-directory".to_string()
        } else {
            escape(
                ctx.meta
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .into_owned()
        })),
        "getetag" => Some(Some(escape(&ctx.meta.etag()).into_owned())),
        "getlastmodified" => Some(Some(http_date(ctx.meta.modified))),
        "resourcetype" => Some(if ctx.meta.is_collection {
            Some("<D:collection/>".to_string())
        } else {
            None
        }),
        "lockdiscovery" => Some(if ctx.lockdiscovery.is_empty() {
            None
        } else {
            Some(ctx.lockdiscovery.to_string())
        }),
        "supportedlock" => Some(if ctx.supports_locking {
            Some(SUPPORTED_LOCK_ENTRIES.to_string())
        } else {
            None
        }),
        _ => None,
    }
}

/// RFC 1123 date for `Last-Modified` headers and `getlastmodified`.
pub(crate) fn http_date(time: std::time::SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Inner XML of `supportedlock` for providers that allow locking.
pub const SUPPORTED_LOCK_ENTRIES: &str = "<D:lockentry><D:lockscope><D:exclusive/></D:lockscope>\
     <D:locktype><D:write/></D:locktype></D:lockentry>\
     <D:lockentry><D:lockscope><D:shared/></D:lockscope>\
     <D:locktype><D:write/></D:locktype></D:lockentry>";

/// All live properties of one resource.
pub fn all_live_props(ctx: &LivePropContext<'_>) -> Vec<(PropName, Option<String>)> {
    LIVE_PROP_NAMES
        .iter()
        .filter_map(|name| live_prop_value(name, ctx).map(|value| (PropName::dav(name), value)))
        .collect()
}

/// The dead property table.
pub struct PropStore {
    table: Mutex<HashMap<DavPath, HashMap<PropName, String>>>,
}

impl PropStore {
    pub fn new() -> Self {
        PropStore {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// All dead properties of `path`.
    pub fn read(&self, path: &DavPath) -> Vec<(PropName, String)> {
        let table = self.lock_table();
        let Some(props) = table.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<_> = props
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// One dead property of `path`.
    pub fn get(&self, path: &DavPath, name: &PropName) -> Option<String> {
        self.lock_table().get(path)?.get(name).cloned()
    }

    /// Apply one PROPPATCH batch atomically.
    ///
    /// If any instruction fails (a protected name), nothing is committed:
    /// the failing names report 403 and every other name in the batch
    /// reports 424 Failed Dependency. On success every name reports 200.
    /// The check and the mutation run under one table lock.
    pub fn apply(&self, path: &DavPath, patch: &PropPatch) -> Vec<PropOutcome> {
        let mut table = self.lock_table();

        let names: Vec<&PropName> = patch
            .set
            .iter()
            .map(|(name, _)| name)
            .chain(patch.remove.iter())
            .collect();
        let any_protected = names.iter().any(|name| name.is_protected());

        if any_protected {
            return names
                .into_iter()
                .map(|name| PropOutcome {
                    name: name.clone(),
                    status: if name.is_protected() {
                        StatusCode::FORBIDDEN
                    } else {
                        StatusCode::FAILED_DEPENDENCY
                    },
                })
                .collect();
        }

        let props = table.entry(path.clone()).or_default();
        for (name, value) in &patch.set {
            props.insert(name.clone(), value.clone());
        }
        for name in &patch.remove {
            // Removing an absent property succeeds; remove is idempotent.
            props.remove(name);
        }
        if props.is_empty() {
            table.remove(path);
        }
        trace!(path = %path, set = patch.set.len(), removed = patch.remove.len(), "properties patched");

        names
            .into_iter()
            .map(|name| PropOutcome {
                name: name.clone(),
                status: StatusCode::OK,
            })
            .collect()
    }

    /// Drop the properties of `path` and all descendants.
    pub fn remove_resource(&self, path: &DavPath) {
        let mut table = self.lock_table();
        table.retain(|prop_path, _| prop_path != path && !path.is_ancestor_of(prop_path));
    }

    /// Re-key the subtree at `from` to `to` (MOVE follow-through).
    pub fn move_resource(&self, from: &DavPath, to: &DavPath) {
        let mut table = self.lock_table();
        let moved: Vec<(DavPath, HashMap<PropName, String>)> = table
            .iter()
            .filter(|(path, _)| *path == from || from.is_ancestor_of(path))
            .map(|(path, props)| (path.clone(), props.clone()))
            .collect();
        for (path, props) in moved {
            table.remove(&path);
            let relative = path.strip_prefix(from).expect("filtered on prefix");
            table.insert(to.join(&relative), props);
        }
    }

    /// Copy the properties of exactly one resource (COPY follow-through,
    /// called per successfully copied node).
    pub fn copy_one(&self, from: &DavPath, to: &DavPath) {
        let mut table = self.lock_table();
        if let Some(props) = table.get(from).cloned() {
            table.insert(to.clone(), props);
        } else {
            table.remove(to);
        }
    }

    fn lock_table(
        &self,
    ) -> MutexGuard<'_, HashMap<DavPath, HashMap<PropName, String>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PropStore {
    fn default() -> Self {
        PropStore::new()
    }
}
