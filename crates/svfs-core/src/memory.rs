//! In-memory volume.
//!
//! Used for scratch content and testing. All data is ephemeral. Every mutation
//! publishes a change event, so a `MemoryVolume` is fully capable:
//! fetch, read, write and watch.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use svfs_types::{
    ChangeEvent, ChangeKind, EntryKind, Metadata, VfsError, VfsResult, VirtualPath,
};
use tokio::io::AsyncWrite;

use crate::events::{EventHub, Subscription};
use crate::image::ImageVolume;
use crate::naming;
use crate::traits::{
    ChangeHandler, ReadStream, VolumeFetch, VolumeInfo, VolumeRead, VolumeWatch, VolumeWrite,
    WriteStream,
};
use crate::tree::{self, key_of};

/// Entry in the memory volume.
#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Node {
    fn directory() -> Self {
        Node::Directory {
            modified: SystemTime::now(),
        }
    }

    fn empty_file() -> Self {
        Node::File {
            data: Vec::new(),
            modified: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    fn kind(&self) -> EntryKind {
        EntryKind::from_is_dir(self.is_dir())
    }
}

type Tree = BTreeMap<String, Node>;

/// In-memory volume.
///
/// Thread-safe via internal `RwLock`. Events are published after the lock is
/// released, so handlers may call back into the volume.
pub struct MemoryVolume {
    info: VolumeInfo,
    tree: Arc<RwLock<Tree>>,
    events: EventHub<ChangeEvent>,
}

impl std::fmt::Debug for MemoryVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVolume")
            .field("scheme", &self.info.scheme)
            .field("entries", &self.read_tree().len())
            .finish()
    }
}

impl MemoryVolume {
    /// Create an empty volume for `scheme`.
    pub fn new(scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        Self::with_info(VolumeInfo::new(
            VolumeInfo::generate_id(),
            scheme.clone(),
            scheme,
            "memory",
        ))
    }

    /// Create an empty volume with explicit identity.
    pub fn with_info(info: VolumeInfo) -> Self {
        let mut entries = Tree::new();
        // Root directory always exists
        entries.insert(String::new(), Node::directory());
        Self {
            info,
            tree: Arc::new(RwLock::new(entries)),
            events: EventHub::new(),
        }
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheme(&self) -> &str {
        &self.info.scheme
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in &events {
            self.events.publish(event);
        }
    }

    /// Freeze the current contents into a read-only [`ImageVolume`].
    pub fn snapshot(&self, scheme: impl Into<String>) -> ImageVolume {
        let tree = self.read_tree();
        let mut builder = ImageVolume::builder(scheme);
        for (key, node) in tree.iter() {
            match node {
                Node::File { data, .. } => builder = builder.file(key, data.clone()),
                Node::Directory { .. } if !key.is_empty() => builder = builder.directory(key),
                Node::Directory { .. } => {}
            }
        }
        builder.build()
    }
}

/// Create every missing ancestor of `key` as a directory.
fn ensure_parents(
    tree: &mut Tree,
    scheme: &str,
    key: &str,
    events: &mut Vec<ChangeEvent>,
) -> VfsResult<()> {
    let Some(parent) = tree::parent_key(key) else {
        return Ok(());
    };

    let mut current = String::new();
    for segment in parent.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);

        match tree.get(&current) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(VfsError::TypeMismatch {
                    path: tree::path_for(scheme, &current, false),
                    expected: EntryKind::Directory,
                });
            }
            None => {
                tree.insert(current.clone(), Node::directory());
                events.push(ChangeEvent::new(
                    ChangeKind::Created,
                    tree::path_for(scheme, &current, true),
                    EntryKind::Directory,
                ));
            }
        }
    }
    Ok(())
}

/// Move `from` and everything below it to `to`.
fn relocate(tree: &mut Tree, from: &str, to: &str) {
    let moved: Vec<(String, Node)> = tree::subtree_keys(tree, from)
        .into_iter()
        .filter_map(|key| tree.remove(&key).map(|node| (key, node)))
        .collect();
    for (key, node) in moved {
        tree.insert(tree::rebase(&key, from, to), node);
    }
}

/// Look up `path`, checking it has the kind its shape declares.
fn existing<'a>(tree: &'a Tree, path: &VirtualPath) -> VfsResult<&'a Node> {
    let node = tree
        .get(&key_of(path))
        .ok_or_else(|| VfsError::NotFound(path.clone()))?;
    naming::require_kind(path, node.is_dir())?;
    Ok(node)
}

#[async_trait]
impl VolumeFetch for MemoryVolume {
    fn info(&self) -> &VolumeInfo {
        &self.info
    }

    async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata> {
        let tree = self.read_tree();
        match tree.get(&key_of(path)) {
            Some(Node::File { data, modified }) => {
                Ok(Metadata::file(data.len() as u64, Some(*modified)))
            }
            Some(Node::Directory { modified }) => Ok(Metadata::directory(Some(*modified))),
            None => Err(VfsError::NotFound(path.clone())),
        }
    }

    async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        naming::require_directory(dir)?;
        let tree = self.read_tree();
        let key = key_of(dir);
        existing(&tree, dir)?;

        Ok(tree::children(&tree, &key)
            .map(|(child, node)| tree::path_for(self.scheme(), child, node.is_dir()))
            .collect())
    }

    fn as_read(&self) -> Option<&dyn VolumeRead> {
        Some(self)
    }

    fn as_write(&self) -> Option<&dyn VolumeWrite> {
        Some(self)
    }

    fn as_watch(&self) -> Option<&dyn VolumeWatch> {
        Some(self)
    }
}

#[async_trait]
impl VolumeRead for MemoryVolume {
    async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream> {
        let data = self.read_bytes(path).await?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        naming::require_file(path)?;
        let tree = self.read_tree();
        match existing(&tree, path)? {
            Node::File { data, .. } => Ok(data.clone()),
            Node::Directory { .. } => Err(VfsError::TypeMismatch {
                path: path.clone(),
                expected: EntryKind::File,
            }),
        }
    }
}

#[async_trait]
impl VolumeWrite for MemoryVolume {
    async fn create_file(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<VirtualPath> {
        naming::require_file(path)?;
        let key = key_of(path);
        let mut events = Vec::new();
        {
            let mut tree = self.write_tree();
            let existed = match tree.get(&key) {
                Some(Node::Directory { .. }) => {
                    return Err(VfsError::TypeMismatch {
                        path: path.clone(),
                        expected: EntryKind::File,
                    });
                }
                Some(Node::File { .. }) if !overwrite => {
                    return Err(VfsError::AlreadyExists(path.clone()));
                }
                Some(Node::File { .. }) => true,
                None => false,
            };

            ensure_parents(&mut tree, self.scheme(), &key, &mut events)?;
            tree.insert(key, Node::empty_file());
            let kind = if existed {
                ChangeKind::Modified
            } else {
                ChangeKind::Created
            };
            events.push(ChangeEvent::new(kind, path.clone(), EntryKind::File));
        }
        self.publish(events);
        Ok(path.clone())
    }

    async fn create_directory(
        &self,
        path: &VirtualPath,
        overwrite: bool,
    ) -> VfsResult<VirtualPath> {
        naming::require_directory(path)?;
        let key = key_of(path);
        let mut events = Vec::new();
        {
            let mut tree = self.write_tree();
            match tree.get(&key) {
                Some(Node::File { .. }) => {
                    return Err(VfsError::TypeMismatch {
                        path: path.clone(),
                        expected: EntryKind::Directory,
                    });
                }
                Some(Node::Directory { .. }) if !overwrite => {
                    return Err(VfsError::AlreadyExists(path.clone()));
                }
                Some(Node::Directory { .. }) => return Ok(path.clone()),
                None => {}
            }

            ensure_parents(&mut tree, self.scheme(), &key, &mut events)?;
            tree.insert(key, Node::directory());
            events.push(ChangeEvent::new(
                ChangeKind::Created,
                path.clone(),
                EntryKind::Directory,
            ));
        }
        self.publish(events);
        Ok(path.clone())
    }

    async fn delete_entry(&self, path: &VirtualPath) -> VfsResult<bool> {
        if path.is_root() {
            return Err(VfsError::InvalidOperation(format!(
                "cannot delete the root of {}",
                path.scheme()
            )));
        }

        let key = key_of(path);
        let kind = {
            let mut tree = self.write_tree();
            let Some(node) = tree.get(&key) else {
                return Ok(false);
            };
            naming::require_kind(path, node.is_dir())?;
            let kind = node.kind();
            for doomed in tree::subtree_keys(&tree, &key) {
                tree.remove(&doomed);
            }
            kind
        };

        self.publish(vec![ChangeEvent::new(ChangeKind::Deleted, path.clone(), kind)]);
        Ok(true)
    }

    async fn move_entry(
        &self,
        source: &VirtualPath,
        dest_dir: &VirtualPath,
    ) -> VfsResult<VirtualPath> {
        let target = naming::moved_path(source, dest_dir)?;
        let kind = {
            let mut tree = self.write_tree();
            let kind = existing(&tree, source)?.kind();
            existing(&tree, dest_dir)?;

            if target == *source {
                return Ok(target);
            }
            if tree.contains_key(&key_of(&target)) {
                return Err(VfsError::AlreadyExists(target));
            }
            relocate(&mut tree, &key_of(source), &key_of(&target));
            kind
        };

        self.publish(vec![ChangeEvent::new(ChangeKind::Renamed, target.clone(), kind)]);
        Ok(target)
    }

    async fn rename_entry(&self, path: &VirtualPath, new_name: &str) -> VfsResult<VirtualPath> {
        let target = naming::renamed_path(path, new_name)?;
        let kind = {
            let mut tree = self.write_tree();
            let kind = existing(&tree, path)?.kind();

            if target == *path {
                return Ok(target);
            }
            if tree.contains_key(&key_of(&target)) {
                return Err(VfsError::AlreadyExists(target));
            }
            relocate(&mut tree, &key_of(path), &key_of(&target));
            kind
        };

        self.publish(vec![ChangeEvent::new(ChangeKind::Renamed, target.clone(), kind)]);
        Ok(target)
    }

    async fn duplicate_entry(&self, path: &VirtualPath) -> VfsResult<VirtualPath> {
        let (target, kind) = {
            let mut tree = self.write_tree();
            let kind = existing(&tree, path)?.kind();

            let mut n = 1;
            let target = loop {
                let candidate = naming::duplicate_path(path, n)?;
                if !tree.contains_key(&key_of(&candidate)) {
                    break candidate;
                }
                n += 1;
            };

            let from = key_of(path);
            let to = key_of(&target);
            let copies: Vec<(String, Node)> = tree::subtree_keys(&tree, &from)
                .into_iter()
                .filter_map(|key| {
                    tree.get(&key)
                        .map(|node| (tree::rebase(&key, &from, &to), node.clone()))
                })
                .collect();
            tree.extend(copies);
            (target, kind)
        };

        self.publish(vec![ChangeEvent::new(ChangeKind::Created, target.clone(), kind)]);
        Ok(target)
    }

    async fn write_bytes(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()> {
        naming::require_file(path)?;
        {
            let mut tree = self.write_tree();
            match tree.get_mut(&key_of(path)) {
                Some(Node::File {
                    data: contents,
                    modified,
                }) => {
                    *contents = data.to_vec();
                    *modified = SystemTime::now();
                }
                Some(Node::Directory { .. }) => {
                    return Err(VfsError::TypeMismatch {
                        path: path.clone(),
                        expected: EntryKind::File,
                    });
                }
                None => return Err(VfsError::NotFound(path.clone())),
            }
        }

        self.publish(vec![ChangeEvent::new(
            ChangeKind::Modified,
            path.clone(),
            EntryKind::File,
        )]);
        Ok(())
    }

    async fn open_write(&self, path: &VirtualPath) -> VfsResult<WriteStream> {
        naming::require_file(path)?;
        let key = key_of(path);
        {
            let mut tree = self.write_tree();
            match tree.get_mut(&key) {
                Some(Node::File { data, modified }) => {
                    data.clear();
                    *modified = SystemTime::now();
                }
                Some(Node::Directory { .. }) => {
                    return Err(VfsError::TypeMismatch {
                        path: path.clone(),
                        expected: EntryKind::File,
                    });
                }
                None => return Err(VfsError::NotFound(path.clone())),
            }
        }

        Ok(Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            key,
            path: path.clone(),
            events: self.events.clone(),
            closed: false,
        }))
    }
}

impl VolumeWatch for MemoryVolume {
    fn subscribe(&self, handler: ChangeHandler) -> Subscription {
        self.events.subscribe_arc(handler)
    }
}

/// Appends straight into the stored file; publishes `Modified` on shutdown.
struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    key: String,
    path: VirtualPath,
    events: EventHub<ChangeEvent>,
    closed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        match tree.get_mut(&self.key) {
            Some(Node::File { data, modified }) => {
                data.extend_from_slice(buf);
                *modified = SystemTime::now();
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file removed while open: {}", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if !self.closed {
            self.closed = true;
            self.events.publish(&ChangeEvent::new(
                ChangeKind::Modified,
                self.path.clone(),
                EntryKind::File,
            ));
        }
        Poll::Ready(Ok(()))
    }
}
