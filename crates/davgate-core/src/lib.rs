//! Storage provider abstraction for the davgate WebDAV engine.
//!
//! This crate defines the pieces the protocol engine talks to when it needs
//! actual storage:
//!
//! - [`DavPath`]: a normalized, slash-separated resource path
//! - [`ResourceMeta`]: metadata for a single resource (collection or leaf)
//! - [`DavProvider`]: the storage backend trait, with capability flags
//! - [`MemoryProvider`]: an in-memory tree backend
//! - [`LocalFsProvider`]: a local filesystem backend on top of `tokio::fs`
//!
//! Providers only deal in provider-relative paths; mounting a provider under
//! a URL prefix is the engine's concern. All provider methods return boxed
//! futures so providers can be held as `Arc<dyn DavProvider>` trait objects.

mod error;
mod localfs;
mod memory;
mod meta;
mod path;
mod provider;

pub use error::{StorageError, StorageResult};
pub use localfs::LocalFsProvider;
pub use memory::MemoryProvider;
pub use meta::ResourceMeta;
pub use path::{DavPath, InvalidPath};
pub use provider::{ByteStream, DavProvider, DirEntry, FsFuture, WriteOutcome, bytes_stream, collect_body};
