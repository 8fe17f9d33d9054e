//! The mountable volume: a backend plus its derived access flags.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::TryStreamExt;
use svfs_types::{Metadata, VfsError, VfsResult, VirtualPath, VolumeAccess};

use crate::entry::Entry;
use crate::events::Subscription;
use crate::traits::{
    ReadStream, VolumeFetch, VolumeInfo, VolumeRead, VolumeWatch, VolumeWrite, WriteStream,
};
use crate::walk::{self, EntryStream};

/// A capability-scoped backing store for one scheme.
///
/// Access flags are computed once, here, from the capability traits the
/// backend exposes, and never change afterwards. Every method checks the flag
/// it needs and returns `AccessDenied` otherwise.
pub struct Volume {
    backend: Arc<dyn VolumeFetch>,
    access: VolumeAccess,
    this: Weak<Volume>,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("info", self.info())
            .field("access", &self.access)
            .finish()
    }
}

impl Volume {
    /// Wrap a backend.
    pub fn new(backend: impl VolumeFetch + 'static) -> Arc<Self> {
        Self::from_backend(Arc::new(backend))
    }

    /// Wrap an already shared backend.
    pub fn from_backend(backend: Arc<dyn VolumeFetch>) -> Arc<Self> {
        let mut access = VolumeAccess::FETCH;
        if backend.as_read().is_some() {
            access |= VolumeAccess::READ;
        }
        if backend.as_write().is_some() {
            access |= VolumeAccess::WRITE;
        }
        if backend.as_watch().is_some() {
            access |= VolumeAccess::WATCH;
        }

        Arc::new_cyclic(|this| Self {
            backend,
            access,
            this: this.clone(),
        })
    }

    pub fn info(&self) -> &VolumeInfo {
        self.backend.info()
    }

    pub fn id(&self) -> &str {
        &self.info().id
    }

    pub fn scheme(&self) -> &str {
        &self.info().scheme
    }

    pub fn display_name(&self) -> &str {
        &self.info().display_name
    }

    pub fn access(&self) -> VolumeAccess {
        self.access
    }

    pub fn has_access(&self, access: VolumeAccess) -> bool {
        self.access.grants(access)
    }

    /// Fail with `AccessDenied` unless `access` is granted.
    pub fn require(&self, access: VolumeAccess) -> VfsResult<()> {
        if self.has_access(access) {
            Ok(())
        } else {
            Err(self.denied(access))
        }
    }

    fn denied(&self, access: VolumeAccess) -> VfsError {
        VfsError::AccessDenied {
            volume: self.display_name().to_string(),
            scheme: self.scheme().to_string(),
            access,
        }
    }

    pub fn backend(&self) -> &Arc<dyn VolumeFetch> {
        &self.backend
    }

    pub fn reader(&self) -> VfsResult<&dyn VolumeRead> {
        self.backend
            .as_read()
            .ok_or_else(|| self.denied(VolumeAccess::READ))
    }

    pub fn writer(&self) -> VfsResult<&dyn VolumeWrite> {
        self.backend
            .as_write()
            .ok_or_else(|| self.denied(VolumeAccess::WRITE))
    }

    pub fn watcher(&self) -> VfsResult<&dyn VolumeWatch> {
        self.backend
            .as_watch()
            .ok_or_else(|| self.denied(VolumeAccess::WATCH))
    }

    fn owns(&self, path: &VirtualPath) -> VfsResult<()> {
        if path.scheme().eq_ignore_ascii_case(self.scheme()) {
            Ok(())
        } else {
            Err(VfsError::InvalidPath {
                path: path.to_string(),
                reason: "path belongs to another scheme",
            })
        }
    }

    /// A handle for `path`, without checking that anything exists there.
    pub fn entry(&self, path: VirtualPath) -> Entry {
        Entry::new(path, self.this.clone())
    }

    pub fn root(&self) -> Entry {
        self.entry(VirtualPath::root(self.scheme()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Fetch
    // ═══════════════════════════════════════════════════════════════════

    pub async fn exists(&self, path: &VirtualPath) -> VfsResult<bool> {
        self.owns(path)?;
        Ok(self.backend.exists(path).await)
    }

    pub async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata> {
        self.owns(path)?;
        self.backend.metadata(path).await
    }

    /// A handle for an existing entry; `NotFound` otherwise.
    pub async fn get_entry(&self, path: &VirtualPath) -> VfsResult<Entry> {
        if self.exists(path).await? {
            Ok(self.entry(path.clone()))
        } else {
            Err(VfsError::NotFound(path.clone()))
        }
    }

    pub async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.owns(dir)?;
        let paths = self.backend.entries(dir).await?;
        Ok(self.entries_for(paths))
    }

    pub async fn files(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.owns(dir)?;
        let paths = self.backend.files(dir).await?;
        Ok(self.entries_for(paths))
    }

    pub async fn directories(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.owns(dir)?;
        let paths = self.backend.directories(dir).await?;
        Ok(self.entries_for(paths))
    }

    /// Lazily walk every file below `dir`. See [`crate::walk`] for the order.
    pub fn files_recursive(&self, dir: &VirtualPath) -> VfsResult<EntryStream> {
        self.owns(dir)?;
        let stream = walk::files_recursive(Arc::clone(&self.backend), dir.clone());
        Ok(self.entry_stream(stream))
    }

    /// Lazily walk every file and directory below `dir`.
    pub fn entries_recursive(&self, dir: &VirtualPath) -> VfsResult<EntryStream> {
        self.owns(dir)?;
        let stream = walk::entries_recursive(Arc::clone(&self.backend), dir.clone());
        Ok(self.entry_stream(stream))
    }

    fn entries_for(&self, paths: Vec<VirtualPath>) -> Vec<Entry> {
        paths.into_iter().map(|path| self.entry(path)).collect()
    }

    fn entry_stream(&self, stream: walk::PathStream) -> EntryStream {
        let this = self.this.clone();
        Box::pin(stream.map_ok(move |path| Entry::new(path, this.clone())))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Read
    // ═══════════════════════════════════════════════════════════════════

    pub async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream> {
        self.owns(path)?;
        self.reader()?.open_read(path).await
    }

    pub async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        self.owns(path)?;
        self.reader()?.read_bytes(path).await
    }

    pub async fn read_to_string(&self, path: &VirtualPath) -> VfsResult<String> {
        self.owns(path)?;
        self.reader()?.read_to_string(path).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Write
    // ═══════════════════════════════════════════════════════════════════

    pub async fn create_file(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<Entry> {
        self.owns(path)?;
        let created = self.writer()?.create_file(path, overwrite).await?;
        Ok(self.entry(created))
    }

    pub async fn create_directory(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<Entry> {
        self.owns(path)?;
        let created = self.writer()?.create_directory(path, overwrite).await?;
        Ok(self.entry(created))
    }

    pub async fn delete_entry(&self, path: &VirtualPath) -> VfsResult<bool> {
        self.owns(path)?;
        self.writer()?.delete_entry(path).await
    }

    pub async fn move_entry(&self, source: &VirtualPath, dest_dir: &VirtualPath) -> VfsResult<Entry> {
        self.owns(source)?;
        if !source.same_scheme(dest_dir) {
            return Err(VfsError::CrossVolume {
                from: source.clone(),
                to: dest_dir.clone(),
            });
        }
        let moved = self.writer()?.move_entry(source, dest_dir).await?;
        Ok(self.entry(moved))
    }

    pub async fn rename_entry(&self, path: &VirtualPath, new_name: &str) -> VfsResult<Entry> {
        self.owns(path)?;
        let renamed = self.writer()?.rename_entry(path, new_name).await?;
        Ok(self.entry(renamed))
    }

    pub async fn duplicate_entry(&self, path: &VirtualPath) -> VfsResult<Entry> {
        self.owns(path)?;
        let copy = self.writer()?.duplicate_entry(path).await?;
        Ok(self.entry(copy))
    }

    pub async fn write_bytes(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()> {
        self.owns(path)?;
        self.writer()?.write_bytes(path, data).await
    }

    pub async fn open_write(&self, path: &VirtualPath) -> VfsResult<WriteStream> {
        self.owns(path)?;
        self.writer()?.open_write(path).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Watch
    // ═══════════════════════════════════════════════════════════════════

    /// Register a change handler. Dropping the guard unsubscribes.
    pub fn subscribe(
        &self,
        handler: impl Fn(&svfs_types::ChangeEvent) + Send + Sync + 'static,
    ) -> VfsResult<Subscription> {
        Ok(self.watcher()?.subscribe(Arc::new(handler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageVolume;
    use crate::memory::MemoryVolume;

    #[test]
    fn test_access_derived_from_traits() {
        let memory = Volume::new(MemoryVolume::new("mem"));
        assert_eq!(memory.access(), VolumeAccess::all());

        let image = Volume::new(ImageVolume::builder("rom").build());
        assert_eq!(image.access(), VolumeAccess::FETCH | VolumeAccess::READ);
        assert!(image.require(VolumeAccess::WRITE).is_err());
    }

    #[tokio::test]
    async fn test_write_denied_on_read_only_volume() {
        let image = Volume::new(ImageVolume::builder("rom").file("a.bin", b"x".to_vec()).build());
        let err = image
            .create_file(&VirtualPath::parse("rom://b.bin").unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VfsError::AccessDenied { access, .. } if access == VolumeAccess::WRITE
        ));
    }

    #[tokio::test]
    async fn test_foreign_scheme_rejected() {
        let memory = Volume::new(MemoryVolume::new("mem"));
        let err = memory
            .exists(&VirtualPath::parse("other://x").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_entries_return_handles() {
        let memory = Volume::new(MemoryVolume::new("mem"));
        memory
            .create_file(&VirtualPath::parse("mem://docs/a.txt").unwrap(), false)
            .await
            .unwrap();

        let entries = memory.entries(&VirtualPath::root("mem")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path().to_string(), "mem://docs/");
        assert!(entries[0].is_directory());
    }
}
