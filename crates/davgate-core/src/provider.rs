//! The storage provider trait.
//!
//! Methods return boxed futures so the engine can hold providers as
//! `Arc<dyn DavProvider>` trait objects and share one instance across
//! several mounts.

use crate::error::{StorageError, StorageResult};
use crate::meta::ResourceMeta;
use crate::path::DavPath;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::pin::Pin;

/// Boxed future returned by provider methods.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Body byte stream, on both the read and the write side.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// One entry of a collection listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Child name (single segment).
    pub name: String,
    /// Child metadata.
    pub meta: ResourceMeta,
}

/// Outcome of a write: did the resource exist before?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new leaf resource was created.
    Created,
    /// An existing leaf resource was replaced.
    Replaced,
}

/// A storage backend serving one tree of resources.
///
/// Paths are provider-relative; the engine strips the mount prefix before
/// calling in. Recursion (tree copy, tree delete) is the engine's job so it
/// can report per-child failures; providers only implement single-resource
/// operations plus an optional whole-subtree [`rename`](DavProvider::rename).
pub trait DavProvider: Send + Sync {
    /// Metadata for a resource.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ResourceMeta>;

    /// List the children of a collection.
    fn list<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DirEntry>>;

    /// Open a leaf resource for reading.
    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, (ResourceMeta, ByteStream)>;

    /// Create or replace a leaf resource from a byte stream.
    ///
    /// Fails with [`StorageError::ParentMissing`] when the parent collection
    /// does not exist.
    fn write<'a>(&'a self, path: &'a DavPath, body: ByteStream) -> FsFuture<'a, WriteOutcome>;

    /// Delete a leaf resource or an empty collection.
    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Create a collection. Parent must exist, target must not.
    fn make_collection<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Copy a single leaf resource, replacing the destination if present.
    fn copy_leaf<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;

    /// Move a resource, subtree included, replacing a leaf destination.
    ///
    /// Providers without an efficient rename may return
    /// [`StorageError::NotSupported`]; the engine then falls back to
    /// copy-and-delete recursion.
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()>;

    /// Whether this provider rejects mutation.
    fn read_only(&self) -> bool {
        false
    }

    /// Whether resources behind this provider may be locked.
    fn supports_locking(&self) -> bool {
        true
    }
}

/// Wrap a single buffer as a [`ByteStream`].
pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into one buffer.
pub async fn collect_body(mut body: ByteStream) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk.map_err(StorageError::from_io)?);
    }
    Ok(Bytes::from(buf))
}
