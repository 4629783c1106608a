//! Local filesystem storage provider.
//!
//! Maps a resource tree onto a directory using `tokio::fs`. Leaf reads load
//! the file into memory before streaming it out, which keeps no file handle
//! (and no directory lock) alive for the lifetime of a slow client.

use crate::error::{StorageError, StorageResult};
use crate::meta::ResourceMeta;
use crate::path::DavPath;
use crate::provider::{
    ByteStream, DavProvider, DirEntry, FsFuture, WriteOutcome, bytes_stream,
};
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

/// A storage provider rooted at a local directory.
pub struct LocalFsProvider {
    root: PathBuf,
    read_only: bool,
}

impl LocalFsProvider {
    /// Create a provider serving `root`.
    ///
    /// Fails if `root` does not exist or is not a directory; a misconfigured
    /// mount must surface at startup, not per request.
    pub fn new(root: &Path) -> StorageResult<Self> {
        let meta = std::fs::metadata(root).map_err(StorageError::from_io)?;
        if !meta.is_dir() {
            return Err(StorageError::NotACollection);
        }
        Ok(LocalFsProvider {
            root: root.to_path_buf(),
            read_only: false,
        })
    }

    /// Create a read-only provider serving `root`.
    pub fn new_read_only(root: &Path) -> StorageResult<Self> {
        let mut provider = Self::new(root)?;
        provider.read_only = true;
        Ok(provider)
    }

    /// Map a resource path onto the backing directory.
    ///
    /// `DavPath` segments are already normalized (no `..`), so a simple join
    /// cannot escape the root.
    fn fs_path(&self, path: &DavPath) -> PathBuf {
        let mut out = self.root.clone();
        for seg in path.segments() {
            out.push(seg);
        }
        out
    }

    fn meta_from_fs(meta: &std::fs::Metadata) -> ResourceMeta {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if meta.is_dir() {
            ResourceMeta::collection(modified)
        } else {
            ResourceMeta::leaf(meta.len(), modified, None)
        }
    }

    fn deny_if_read_only(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::Forbidden);
        }
        Ok(())
    }
}

impl DavProvider for LocalFsProvider {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ResourceMeta> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(self.fs_path(path))
                .await
                .map_err(StorageError::from_io)?;
            Ok(Self::meta_from_fs(&meta))
        })
    }

    fn list<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            let fs_path = self.fs_path(path);
            let meta = tokio::fs::metadata(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            if !meta.is_dir() {
                return Err(StorageError::NotACollection);
            }
            let mut dir = tokio::fs::read_dir(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            let mut entries = Vec::new();
            while let Some(entry) = dir.next_entry().await.map_err(StorageError::from_io)? {
                let Ok(name) = entry.file_name().into_string() else {
                    // Skip names that are not valid UTF-8; they cannot be
                    // addressed through a URL path anyway.
                    continue;
                };
                let meta = entry.metadata().await.map_err(StorageError::from_io)?;
                entries.push(DirEntry {
                    name,
                    meta: Self::meta_from_fs(&meta),
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            trace!(path = %path, count = entries.len(), "listed directory");
            Ok(entries)
        })
    }

    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, (ResourceMeta, ByteStream)> {
        Box::pin(async move {
            let fs_path = self.fs_path(path);
            let meta = tokio::fs::metadata(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            if meta.is_dir() {
                return Err(StorageError::IsACollection);
            }
            let data = tokio::fs::read(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            Ok((Self::meta_from_fs(&meta), bytes_stream(Bytes::from(data))))
        })
    }

    fn write<'a>(&'a self, path: &'a DavPath, mut body: ByteStream) -> FsFuture<'a, WriteOutcome> {
        Box::pin(async move {
            self.deny_if_read_only()?;
            let fs_path = self.fs_path(path);
            let parent = fs_path.parent().ok_or(StorageError::Forbidden)?;
            match tokio::fs::metadata(parent).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(StorageError::ParentMissing),
                Err(_) => return Err(StorageError::ParentMissing),
            }
            let existed = match tokio::fs::metadata(&fs_path).await {
                Ok(meta) if meta.is_dir() => return Err(StorageError::IsACollection),
                Ok(_) => true,
                Err(_) => false,
            };

            let mut file = tokio::fs::File::create(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(StorageError::from_io)?;
                file.write_all(&chunk).await.map_err(StorageError::from_io)?;
            }
            file.flush().await.map_err(StorageError::from_io)?;
            debug!(path = %path, existed, "wrote file");

            Ok(if existed {
                WriteOutcome::Replaced
            } else {
                WriteOutcome::Created
            })
        })
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            self.deny_if_read_only()?;
            let fs_path = self.fs_path(path);
            let meta = tokio::fs::metadata(&fs_path)
                .await
                .map_err(StorageError::from_io)?;
            if meta.is_dir() {
                tokio::fs::remove_dir(&fs_path)
                    .await
                    .map_err(StorageError::from_io)
            } else {
                tokio::fs::remove_file(&fs_path)
                    .await
                    .map_err(StorageError::from_io)
            }
        })
    }

    fn make_collection<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            self.deny_if_read_only()?;
            let fs_path = self.fs_path(path);
            if tokio::fs::metadata(&fs_path).await.is_ok() {
                return Err(StorageError::AlreadyExists);
            }
            let parent = fs_path.parent().ok_or(StorageError::Forbidden)?;
            if tokio::fs::metadata(parent).await.is_err() {
                return Err(StorageError::ParentMissing);
            }
            tokio::fs::create_dir(&fs_path)
                .await
                .map_err(StorageError::from_io)
        })
    }

    fn copy_leaf<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            self.deny_if_read_only()?;
            let from_fs = self.fs_path(from);
            let to_fs = self.fs_path(to);
            let meta = tokio::fs::metadata(&from_fs)
                .await
                .map_err(StorageError::from_io)?;
            if meta.is_dir() {
                return Err(StorageError::IsACollection);
            }
            tokio::fs::copy(&from_fs, &to_fs)
                .await
                .map_err(StorageError::from_io)?;
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            self.deny_if_read_only()?;
            if tokio::fs::metadata(self.fs_path(to)).await.is_ok() {
                return Err(StorageError::AlreadyExists);
            }
            tokio::fs::rename(self.fs_path(from), self.fs_path(to))
                .await
                .map_err(StorageError::from_io)
        })
    }
}
