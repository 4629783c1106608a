//! Normalized resource paths.
//!
//! Every resource the engine touches is addressed by a [`DavPath`]: an
//! absolute, slash-separated path that has already been percent-decoded and
//! cleaned of empty and dot segments. Keeping one canonical form means prefix
//! matching, ancestor walks, and table keys never have to worry about
//! trailing slashes or `.`/`..` tricks.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a raw path cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path: {0}")]
pub struct InvalidPath(pub String);

/// An absolute, normalized resource path.
///
/// The root path has zero segments. Display form is `/seg1/seg2`, with `/`
/// for the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DavPath {
    segments: Vec<String>,
}

impl DavPath {
    /// The root path.
    pub fn root() -> Self {
        DavPath { segments: Vec::new() }
    }

    /// Parse and normalize a raw (already percent-decoded) path.
    ///
    /// Empty segments and `.` segments collapse; `..` segments are rejected
    /// rather than resolved, so a path can never escape its mount.
    pub fn parse(raw: &str) -> Result<Self, InvalidPath> {
        let mut segments = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => {}
                ".." => return Err(InvalidPath(raw.to_string())),
                _ => segments.push(seg.to_string()),
            }
        }
        Ok(DavPath { segments })
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path; `None` for the root.
    pub fn parent(&self) -> Option<DavPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(DavPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn child(&self, name: &str) -> DavPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        DavPath { segments }
    }

    /// Append all segments of `other`.
    pub fn join(&self, other: &DavPath) -> DavPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        DavPath { segments }
    }

    /// Whether `prefix` matches this path on a full segment boundary.
    ///
    /// `/dav/sub` starts with `/dav` but `/davx` does not start with `/dav`.
    pub fn starts_with(&self, prefix: &DavPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strip a segment-boundary prefix, returning the remainder.
    pub fn strip_prefix(&self, prefix: &DavPath) -> Option<DavPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(DavPath {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// Whether this path is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &DavPath) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with(self)
    }

    /// All strict ancestors, root first.
    pub fn ancestors(&self) -> Vec<DavPath> {
        (0..self.segments.len())
            .map(|n| DavPath {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// URL form of the path: `/a/b`, or `/` for the root.
    pub fn as_url(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            let mut out = String::new();
            for seg in &self.segments {
                out.push('/');
                out.push_str(seg);
            }
            out
        }
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_url())
    }
}

impl FromStr for DavPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DavPath::parse(s)
    }
}
