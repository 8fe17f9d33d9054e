//! Stateless file and directory handles.
//!
//! An [`Entry`] is just a path plus a weak reference to the volume it came
//! from. It caches nothing: every call goes to the volume, so two handles for
//! the same path are interchangeable and compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use svfs_types::{EntryKind, Metadata, VfsError, VfsResult, VirtualPath};

use crate::traits::{ReadStream, WriteStream};
use crate::volume::Volume;
use crate::walk::EntryStream;

#[derive(Clone)]
pub struct Entry {
    path: VirtualPath,
    volume: Weak<Volume>,
}

impl Entry {
    pub(crate) fn new(path: VirtualPath, volume: Weak<Volume>) -> Self {
        Self { path, volume }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn kind(&self) -> EntryKind {
        self.path.kind()
    }

    pub fn is_directory(&self) -> bool {
        self.path.is_directory()
    }

    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }

    /// The owning volume, if it is still alive.
    pub fn volume(&self) -> VfsResult<Arc<Volume>> {
        self.volume
            .upgrade()
            .ok_or_else(|| VfsError::VolumeReleased(self.path.scheme().to_string()))
    }

    /// False when the entry is gone or its volume has been released.
    pub async fn exists(&self) -> bool {
        match self.volume() {
            Ok(volume) => volume.exists(&self.path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn metadata(&self) -> VfsResult<Metadata> {
        self.volume()?.metadata(&self.path).await
    }

    /// Handle for the containing directory.
    pub fn parent(&self) -> VfsResult<Entry> {
        Ok(Entry::new(self.path.parent()?, self.volume.clone()))
    }

    pub async fn delete(&self) -> VfsResult<bool> {
        self.volume()?.delete_entry(&self.path).await
    }

    pub async fn rename(&self, new_name: &str) -> VfsResult<Entry> {
        self.volume()?.rename_entry(&self.path, new_name).await
    }

    pub async fn duplicate(&self) -> VfsResult<Entry> {
        self.volume()?.duplicate_entry(&self.path).await
    }

    pub async fn move_to(&self, dest_dir: &VirtualPath) -> VfsResult<Entry> {
        self.volume()?.move_entry(&self.path, dest_dir).await
    }

    // Files

    pub async fn read_bytes(&self) -> VfsResult<Vec<u8>> {
        self.volume()?.read_bytes(&self.path).await
    }

    pub async fn read_to_string(&self) -> VfsResult<String> {
        self.volume()?.read_to_string(&self.path).await
    }

    pub async fn open_read(&self) -> VfsResult<ReadStream> {
        self.volume()?.open_read(&self.path).await
    }

    pub async fn write_bytes(&self, data: &[u8]) -> VfsResult<()> {
        self.volume()?.write_bytes(&self.path, data).await
    }

    pub async fn open_write(&self) -> VfsResult<WriteStream> {
        self.volume()?.open_write(&self.path).await
    }

    // Directories

    pub async fn entries(&self) -> VfsResult<Vec<Entry>> {
        self.volume()?.entries(&self.path).await
    }

    pub async fn files(&self) -> VfsResult<Vec<Entry>> {
        self.volume()?.files(&self.path).await
    }

    pub async fn directories(&self) -> VfsResult<Vec<Entry>> {
        self.volume()?.directories(&self.path).await
    }

    pub fn files_recursive(&self) -> VfsResult<EntryStream> {
        self.volume()?.files_recursive(&self.path)
    }

    /// Create a file named `name` inside this directory.
    pub async fn create_file(&self, name: &str, overwrite: bool) -> VfsResult<Entry> {
        let path = self.path.combine(name)?;
        self.volume()?.create_file(&path, overwrite).await
    }

    /// Create a subdirectory named `name` inside this directory.
    pub async fn create_directory(&self, name: &str, overwrite: bool) -> VfsResult<Entry> {
        let path = self.path.combine(name)?.to_directory();
        self.volume()?.create_directory(&path, overwrite).await
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entry").field(&self.path).finish()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryVolume;

    #[tokio::test]
    async fn test_handles_are_interchangeable() {
        let volume = Volume::new(MemoryVolume::new("mem"));
        let path = VirtualPath::parse("mem://notes.txt").unwrap();

        let first = volume.create_file(&path, false).await.unwrap();
        let second = volume.entry(path.clone());
        assert_eq!(first, second);

        first.write_bytes(b"hello").await.unwrap();
        assert_eq!(second.read_bytes().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_directory_handle_creates_children() {
        let volume = Volume::new(MemoryVolume::new("mem"));
        let root = volume.root();

        let dir = root.create_directory("levels", false).await.unwrap();
        assert_eq!(dir.path().to_string(), "mem://levels/");

        let file = dir.create_file("l1.map", false).await.unwrap();
        assert_eq!(file.parent().unwrap(), dir);
        assert_eq!(dir.files().await.unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn test_released_volume() {
        let volume = Volume::new(MemoryVolume::new("mem"));
        let entry = volume.root();
        drop(volume);

        assert!(!entry.exists().await);
        assert!(matches!(
            entry.entries().await,
            Err(VfsError::VolumeReleased(_))
        ));
    }
}
