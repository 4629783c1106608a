//! In-memory storage provider.
//!
//! Holds an entire resource tree behind one mutex. Useful as a scratch mount
//! and as the reference backend for engine tests. The lock is never held
//! across an await point; request bodies are collected before the tree is
//! touched.

use crate::error::{StorageError, StorageResult};
use crate::meta::ResourceMeta;
use crate::path::DavPath;
use crate::provider::{
    ByteStream, DavProvider, DirEntry, FsFuture, WriteOutcome, bytes_stream, collect_body,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::trace;

/// One node of the in-memory tree.
#[derive(Debug, Clone)]
enum Node {
    Collection {
        children: BTreeMap<String, Node>,
        modified: SystemTime,
    },
    Leaf {
        data: Bytes,
        modified: SystemTime,
        content_type: Option<String>,
    },
}

impl Node {
    fn empty_collection() -> Node {
        Node::Collection {
            children: BTreeMap::new(),
            modified: SystemTime::now(),
        }
    }

    fn meta(&self) -> ResourceMeta {
        match self {
            Node::Collection { modified, .. } => ResourceMeta::collection(*modified),
            Node::Leaf {
                data,
                modified,
                content_type,
            } => ResourceMeta::leaf(data.len() as u64, *modified, content_type.clone()),
        }
    }

    fn subtree_size(&self) -> u64 {
        match self {
            Node::Leaf { data, .. } => data.len() as u64,
            Node::Collection { children, .. } => {
                children.values().map(Node::subtree_size).sum()
            }
        }
    }
}

/// A storage provider backed by an in-memory tree.
pub struct MemoryProvider {
    root: Mutex<Node>,
    read_only: bool,
    quota: Option<u64>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        MemoryProvider {
            root: Mutex::new(Node::empty_collection()),
            read_only: false,
            quota: None,
        }
    }

    /// Create an empty read-only provider.
    pub fn new_read_only() -> Self {
        MemoryProvider {
            read_only: true,
            ..MemoryProvider::new()
        }
    }

    /// Cap total leaf bytes; writes beyond the cap fail with
    /// [`StorageError::InsufficientStorage`].
    pub fn with_quota(quota: u64) -> Self {
        MemoryProvider {
            quota: Some(quota),
            ..MemoryProvider::new()
        }
    }

    fn node_at<'n>(root: &'n Node, path: &DavPath) -> Option<&'n Node> {
        let mut node = root;
        for seg in path.segments() {
            match node {
                Node::Collection { children, .. } => node = children.get(seg)?,
                Node::Leaf { .. } => return None,
            }
        }
        Some(node)
    }

    /// Locate the parent collection's child map plus the final segment name.
    fn parent_children<'n>(
        root: &'n mut Node,
        path: &DavPath,
    ) -> StorageResult<(&'n mut BTreeMap<String, Node>, String)> {
        let name = path.name().ok_or(StorageError::Forbidden)?.to_string();
        let parent = path.parent().expect("non-root path has a parent");
        let mut node = root;
        for seg in parent.segments() {
            match node {
                Node::Collection { children, .. } => {
                    node = children.get_mut(seg).ok_or(StorageError::ParentMissing)?;
                }
                Node::Leaf { .. } => return Err(StorageError::ParentMissing),
            }
        }
        match node {
            Node::Collection { children, .. } => Ok((children, name)),
            Node::Leaf { .. } => Err(StorageError::ParentMissing),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Node> {
        self.root
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_quota(&self, root: &Node, added: u64, removed: u64) -> StorageResult<()> {
        if let Some(quota) = self.quota {
            let used = root.subtree_size();
            if used.saturating_sub(removed) + added > quota {
                return Err(StorageError::InsufficientStorage);
            }
        }
        Ok(())
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        MemoryProvider::new()
    }
}

impl DavProvider for MemoryProvider {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ResourceMeta> {
        Box::pin(async move {
            let root = self.lock();
            Self::node_at(&root, path)
                .map(Node::meta)
                .ok_or(StorageError::NotFound)
        })
    }

    fn list<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            let root = self.lock();
            match Self::node_at(&root, path).ok_or(StorageError::NotFound)? {
                Node::Collection { children, .. } => Ok(children
                    .iter()
                    .map(|(name, node)| DirEntry {
                        name: name.clone(),
                        meta: node.meta(),
                    })
                    .collect()),
                Node::Leaf { .. } => Err(StorageError::NotACollection),
            }
        })
    }

    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, (ResourceMeta, ByteStream)> {
        Box::pin(async move {
            let root = self.lock();
            let node = Self::node_at(&root, path).ok_or(StorageError::NotFound)?;
            match node {
                Node::Leaf { data, .. } => Ok((node.meta(), bytes_stream(data.clone()))),
                Node::Collection { .. } => Err(StorageError::IsACollection),
            }
        })
    }

    fn write<'a>(&'a self, path: &'a DavPath, body: ByteStream) -> FsFuture<'a, WriteOutcome> {
        Box::pin(async move {
            if self.read_only {
                return Err(StorageError::Forbidden);
            }
            // Collect before taking the lock; the lock never spans an await.
            let data = collect_body(body).await?;
            let mut root = self.lock();

            let removed = Self::node_at(&root, path)
                .map(Node::subtree_size)
                .unwrap_or(0);
            self.check_quota(&root, data.len() as u64, removed)?;

            let (children, name) = Self::parent_children(&mut root, path)?;
            let outcome = match children.get(&name) {
                Some(Node::Collection { .. }) => return Err(StorageError::IsACollection),
                Some(Node::Leaf { .. }) => WriteOutcome::Replaced,
                None => WriteOutcome::Created,
            };
            trace!(path = %path, len = data.len(), "memory write");
            children.insert(
                name,
                Node::Leaf {
                    data,
                    modified: SystemTime::now(),
                    content_type: None,
                },
            );
            Ok(outcome)
        })
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if self.read_only {
                return Err(StorageError::Forbidden);
            }
            let mut root = self.lock();
            let (children, name) = Self::parent_children(&mut root, path)?;
            match children.get(&name) {
                None => Err(StorageError::NotFound),
                Some(Node::Collection { children: c, .. }) if !c.is_empty() => {
                    Err(StorageError::Forbidden)
                }
                Some(_) => {
                    children.remove(&name);
                    Ok(())
                }
            }
        })
    }

    fn make_collection<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if self.read_only {
                return Err(StorageError::Forbidden);
            }
            let mut root = self.lock();
            let (children, name) = Self::parent_children(&mut root, path)?;
            if children.contains_key(&name) {
                return Err(StorageError::AlreadyExists);
            }
            children.insert(name, Node::empty_collection());
            Ok(())
        })
    }

    fn copy_leaf<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if self.read_only {
                return Err(StorageError::Forbidden);
            }
            let mut root = self.lock();
            let node = match Self::node_at(&root, from).ok_or(StorageError::NotFound)? {
                Node::Leaf {
                    data,
                    content_type,
                    ..
                } => Node::Leaf {
                    data: data.clone(),
                    modified: SystemTime::now(),
                    content_type: content_type.clone(),
                },
                Node::Collection { .. } => return Err(StorageError::IsACollection),
            };

            let removed = Self::node_at(&root, to).map(Node::subtree_size).unwrap_or(0);
            self.check_quota(&root, node.subtree_size(), removed)?;

            let (children, name) = Self::parent_children(&mut root, to)?;
            if matches!(children.get(&name), Some(Node::Collection { .. })) {
                return Err(StorageError::IsACollection);
            }
            children.insert(name, node);
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if self.read_only {
                return Err(StorageError::Forbidden);
            }
            if from.is_ancestor_of(to) {
                return Err(StorageError::Forbidden);
            }
            let mut root = self.lock();
            if Self::node_at(&root, to).is_some() {
                return Err(StorageError::AlreadyExists);
            }
            // Detach first so the borrow on the source parent ends before the
            // destination parent is looked up.
            let (children, name) = Self::parent_children(&mut root, from)?;
            let node = children.remove(&name).ok_or(StorageError::NotFound)?;
            match Self::parent_children(&mut root, to) {
                Ok((children, name)) => {
                    children.insert(name, node);
                    Ok(())
                }
                Err(e) => {
                    // Reattach at the source; the move must be all-or-nothing.
                    let (children, name) =
                        Self::parent_children(&mut root, from).expect("source parent exists");
                    children.insert(name, node);
                    Err(e)
                }
            }
        })
    }
}
