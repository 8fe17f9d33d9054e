//! Capability traits every volume backend implements a subset of.
//!
//! `VolumeFetch` is mandatory. A backend opts into the other capabilities by
//! implementing the matching trait and returning `Some(self)` from the
//! discovery method (`as_read`, `as_write`, `as_watch`). [`Volume`] reads those
//! once at construction to derive its [`VolumeAccess`] flags.
//!
//! All operations take paths in the backend's own scheme; routing and access
//! checks happen before a call reaches these traits.
//!
//! [`Volume`]: crate::volume::Volume
//! [`VolumeAccess`]: svfs_types::VolumeAccess

use std::sync::Arc;

use async_trait::async_trait;
use svfs_types::{ChangeEvent, Metadata, VfsError, VfsResult, VirtualPath};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::events::Subscription;

/// Stream returned by [`VolumeRead::open_read`].
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Stream returned by [`VolumeWrite::open_write`].
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback invoked for every change a watchable volume observes.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identity of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Stable identifier, recorded by projects next to the scheme.
    pub id: String,
    pub scheme: String,
    /// Human-readable name for browsers and error messages.
    pub display_name: String,
    /// Where the content lives: an OS path, or a description for virtual stores.
    pub root: String,
}

impl VolumeInfo {
    pub fn new(
        id: impl Into<String>,
        scheme: impl Into<String>,
        display_name: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            scheme: scheme.into(),
            display_name: display_name.into(),
            root: root.into(),
        }
    }

    /// A fresh random identifier.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Enumerate and probe entries. Every volume implements this.
#[async_trait]
pub trait VolumeFetch: Send + Sync {
    fn info(&self) -> &VolumeInfo;

    /// Metadata of the entry at `path`, whatever its actual kind.
    async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata>;

    /// True if an entry of the kind `path` declares exists.
    async fn exists(&self, path: &VirtualPath) -> bool {
        match self.metadata(path).await {
            Ok(meta) => meta.kind == path.kind(),
            Err(_) => false,
        }
    }

    /// Direct children of `dir`, sorted by name. Directory children carry a
    /// trailing `/`.
    async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>>;

    /// Direct child files of `dir`.
    async fn files(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        let mut entries = self.entries(dir).await?;
        entries.retain(VirtualPath::is_file);
        Ok(entries)
    }

    /// Direct child directories of `dir`.
    async fn directories(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        let mut entries = self.entries(dir).await?;
        entries.retain(VirtualPath::is_directory);
        Ok(entries)
    }

    fn as_read(&self) -> Option<&dyn VolumeRead> {
        None
    }

    fn as_write(&self) -> Option<&dyn VolumeWrite> {
        None
    }

    fn as_watch(&self) -> Option<&dyn VolumeWatch> {
        None
    }
}

/// Open and read file contents.
#[async_trait]
pub trait VolumeRead: Send + Sync {
    /// Open a file for streaming reads.
    async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream>;

    /// Read the entire contents of a file.
    async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        let mut stream = self.open_read(path).await?;
        let mut data = Vec::new();
        stream
            .read_to_end(&mut data)
            .await
            .map_err(VfsError::io_at(path))?;
        Ok(data)
    }

    /// Read a file as UTF-8 text.
    async fn read_to_string(&self, path: &VirtualPath) -> VfsResult<String> {
        let data = self.read_bytes(path).await?;
        String::from_utf8(data).map_err(|err| VfsError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })
    }
}

/// Create, delete, move, rename, duplicate and write entries.
///
/// Each call is atomic only to the extent the underlying store makes a single
/// operation atomic. Nothing spans calls.
#[async_trait]
pub trait VolumeWrite: Send + Sync {
    /// Create an empty file, creating missing parent directories.
    ///
    /// Fails with `AlreadyExists` if the file exists and `overwrite` is false;
    /// with `overwrite` the file is truncated.
    async fn create_file(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<VirtualPath>;

    /// Create a directory and any missing parents.
    ///
    /// Fails with `AlreadyExists` if it exists and `overwrite` is false; with
    /// `overwrite` an existing directory is kept as is.
    async fn create_directory(&self, path: &VirtualPath, overwrite: bool)
    -> VfsResult<VirtualPath>;

    /// Delete a file, or a directory recursively.
    ///
    /// Returns `Ok(false)` when there was nothing to delete.
    async fn delete_entry(&self, path: &VirtualPath) -> VfsResult<bool>;

    /// Move `source` into the directory `dest_dir`, keeping its name.
    async fn move_entry(&self, source: &VirtualPath, dest_dir: &VirtualPath)
    -> VfsResult<VirtualPath>;

    /// Rename an entry within its parent directory.
    async fn rename_entry(&self, path: &VirtualPath, new_name: &str) -> VfsResult<VirtualPath>;

    /// Deep-copy an entry next to itself under the first free `"{stem} ({n}){ext}"`.
    async fn duplicate_entry(&self, path: &VirtualPath) -> VfsResult<VirtualPath>;

    /// Replace the contents of an existing file.
    async fn write_bytes(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()>;

    /// Open an existing file for streaming writes, truncating it.
    async fn open_write(&self, path: &VirtualPath) -> VfsResult<WriteStream>;
}

/// Subscribe to change events.
///
/// Handlers run synchronously on whichever thread observed the change (for
/// physical volumes, the OS watcher thread). They must not block.
pub trait VolumeWatch: Send + Sync {
    fn subscribe(&self, handler: ChangeHandler) -> Subscription;
}
