//! Physical volume: a watched directory on the local filesystem.
//!
//! All operations are relative to the volume root. For example, if the root is
//! `/home/amy/game/assets`, then `assets://textures/hero.png` maps to
//! `/home/amy/game/assets/textures/hero.png`.
//!
//! The volume keeps a path → kind cache, seeded by a full scan when the volume
//! opens. While a watcher runs, OS notifications are reconciled against that
//! cache (see [`reconcile`]) so delete events still report whether a file or a
//! directory vanished.

mod cache;
mod reconcile;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use svfs_types::{
    ChangeEvent, EntryKind, Metadata, VfsError, VfsResult, VirtualPath, validate_scheme,
};
use tokio::fs;

use self::cache::KindCache;
use self::reconcile::Reconciler;
use crate::events::{EventHub, Subscription};
use crate::naming;
use crate::traits::{
    ChangeHandler, ReadStream, VolumeFetch, VolumeInfo, VolumeRead, VolumeWatch, VolumeWrite,
    WriteStream,
};

/// How to open a [`PhysicalVolume`].
#[derive(Debug, Clone)]
pub struct PhysicalOptions {
    /// Stable identifier; a random one is generated when absent.
    pub id: Option<String>,
    /// Defaults to the scheme.
    pub display_name: Option<String>,
    /// Start an OS watcher. Without one the volume has no watch capability.
    pub watch: bool,
}

impl Default for PhysicalOptions {
    fn default() -> Self {
        Self {
            id: None,
            display_name: None,
            watch: true,
        }
    }
}

pub struct PhysicalVolume {
    info: VolumeInfo,
    root: PathBuf,
    cache: Arc<KindCache>,
    events: EventHub<ChangeEvent>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watching: bool,
}

impl std::fmt::Debug for PhysicalVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalVolume")
            .field("scheme", &self.info.scheme)
            .field("root", &self.root)
            .field("watching", &self.watching)
            .finish()
    }
}

impl PhysicalVolume {
    /// Open `root` as the volume for `scheme`.
    ///
    /// The root must exist and be a directory. Opening scans the whole tree
    /// and, with `options.watch`, starts a recursive watcher.
    pub async fn open(
        scheme: impl Into<String>,
        root: impl AsRef<Path>,
        options: PhysicalOptions,
    ) -> VfsResult<Self> {
        let scheme = scheme.into();
        validate_scheme(&scheme)?;
        let requested = root.as_ref();
        let invalid_root = |_: std::io::Error| VfsError::InvalidRoot(requested.to_path_buf());

        let root = fs::canonicalize(requested).await.map_err(invalid_root)?;
        if !fs::metadata(&root).await.map_err(invalid_root)?.is_dir() {
            return Err(VfsError::InvalidRoot(requested.to_path_buf()));
        }

        let cache = Arc::new(KindCache::scan(&root).await.map_err(|source| VfsError::Io {
            path: root.display().to_string(),
            source,
        })?);
        let events = EventHub::new();

        let watcher = if options.watch {
            let reconciler = Reconciler::new(
                root.clone(),
                scheme.clone(),
                Arc::clone(&cache),
                events.clone(),
            );
            Some(start_watcher(&root, reconciler)?)
        } else {
            None
        };

        tracing::info!(
            scheme = %scheme,
            root = %root.display(),
            entries = cache.len(),
            watching = options.watch,
            "opened physical volume"
        );

        let info = VolumeInfo::new(
            options.id.unwrap_or_else(VolumeInfo::generate_id),
            scheme.clone(),
            options.display_name.unwrap_or(scheme),
            root.display().to_string(),
        );
        Ok(Self {
            info,
            root,
            cache,
            events,
            watching: watcher.is_some(),
            watcher: Mutex::new(watcher),
        })
    }

    /// The canonical OS root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// What the kind cache believes `path` is.
    pub fn cached_kind(&self, path: &VirtualPath) -> Option<EntryKind> {
        self.cache
            .get(&self.to_physical(path))
            .map(EntryKind::from_is_dir)
    }

    /// OS path for a virtual path of this volume.
    pub fn to_physical(&self, path: &VirtualPath) -> PathBuf {
        let local = path.local_path().trim_end_matches('/');
        if local.is_empty() {
            return self.root.clone();
        }
        self.root
            .join(local.replace('/', std::path::MAIN_SEPARATOR_STR))
    }

    /// Actual kind on disk, `None` if nothing is there.
    async fn probe(&self, physical: &Path, path: &VirtualPath) -> VfsResult<Option<bool>> {
        match fs::metadata(physical).await {
            Ok(meta) => Ok(Some(meta.is_dir())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(VfsError::from_io(path, err)),
        }
    }

    /// Probe `path`, requiring it to exist with the kind its shape declares.
    async fn require_existing(&self, path: &VirtualPath) -> VfsResult<PathBuf> {
        let physical = self.to_physical(path);
        match self.probe(&physical, path).await? {
            Some(is_dir) => naming::require_kind(path, is_dir)?,
            None => return Err(VfsError::NotFound(path.clone())),
        }
        Ok(physical)
    }

    /// Move or rename `source` to `target`, keeping the cache in step.
    async fn relocate(&self, source: &VirtualPath, target: VirtualPath) -> VfsResult<VirtualPath> {
        let from = self.require_existing(source).await?;
        if target == *source {
            return Ok(target);
        }

        let to = self.to_physical(&target);
        if self.probe(&to, &target).await?.is_some() {
            return Err(VfsError::AlreadyExists(target));
        }

        fs::rename(&from, &to).await.map_err(VfsError::io_at(source))?;

        self.cache.copy_tree(&from, &to);
        self.cache
            .insert_with_ancestors(&self.root, &to, target.is_directory());
        // The watcher's delete event still needs the old kinds
        if !self.watching {
            self.cache.take(&from);
        }

        tracing::debug!(%source, %target, "relocated entry");
        Ok(target)
    }

    async fn ensure_parent(&self, physical: &Path, path: &VirtualPath) -> VfsResult<()> {
        let Some(parent) = physical.parent() else {
            return Ok(());
        };
        fs::create_dir_all(parent).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists | std::io::ErrorKind::NotADirectory => {
                VfsError::TypeMismatch {
                    path: path.parent().unwrap_or_else(|_| path.clone()),
                    expected: EntryKind::Directory,
                }
            }
            _ => VfsError::from_io(path, err),
        })
    }
}

fn start_watcher(root: &Path, reconciler: Reconciler) -> VfsResult<RecommendedWatcher> {
    let handler = move |result: notify::Result<notify::Event>| reconciler.handle(result);
    let mut watcher =
        notify::recommended_watcher(handler).map_err(|err| VfsError::Watcher(err.to_string()))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| VfsError::Watcher(err.to_string()))?;
    Ok(watcher)
}

/// Recursively copy a directory, recording every copied entry.
fn copy_dir_recursive<'a>(
    cache: &'a KindCache,
    src: &'a Path,
    dst: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir(dst).await?;
        cache.insert(dst.to_path_buf(), true);

        let mut entries = fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let src_child = entry.path();
            let dst_child = dst.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                copy_dir_recursive(cache, &src_child, &dst_child).await?;
            } else {
                fs::copy(&src_child, &dst_child).await?;
                cache.insert(dst_child, false);
            }
        }

        Ok(())
    })
}

#[async_trait]
impl VolumeFetch for PhysicalVolume {
    fn info(&self) -> &VolumeInfo {
        &self.info
    }

    async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata> {
        let meta = fs::metadata(self.to_physical(path))
            .await
            .map_err(VfsError::io_at(path))?;
        Ok(if meta.is_dir() {
            Metadata::directory(meta.modified().ok())
        } else {
            Metadata::file(meta.len(), meta.modified().ok())
        })
    }

    async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        naming::require_directory(dir)?;
        let physical = self.require_existing(dir).await?;

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&physical).await.map_err(VfsError::io_at(dir))?;
        while let Some(entry) = reader.next_entry().await.map_err(VfsError::io_at(dir))? {
            let is_dir = entry
                .file_type()
                .await
                .map_err(VfsError::io_at(dir))?
                .is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = dir.combine(&name)?;
            entries.push(if is_dir { child.to_directory() } else { child });
        }

        entries.sort_by(|a, b| a.local_path().cmp(b.local_path()));
        Ok(entries)
    }

    fn as_read(&self) -> Option<&dyn VolumeRead> {
        Some(self)
    }

    fn as_write(&self) -> Option<&dyn VolumeWrite> {
        Some(self)
    }

    fn as_watch(&self) -> Option<&dyn VolumeWatch> {
        if self.watching { Some(self) } else { None }
    }
}

#[async_trait]
impl VolumeRead for PhysicalVolume {
    async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream> {
        naming::require_file(path)?;
        let physical = self.require_existing(path).await?;
        let file = fs::File::open(&physical)
            .await
            .map_err(VfsError::io_at(path))?;
        Ok(Box::new(file))
    }

    async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        naming::require_file(path)?;
        let physical = self.require_existing(path).await?;
        fs::read(&physical).await.map_err(VfsError::io_at(path))
    }
}

#[async_trait]
impl VolumeWrite for PhysicalVolume {
    async fn create_file(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<VirtualPath> {
        naming::require_file(path)?;
        let physical = self.to_physical(path);
        match self.probe(&physical, path).await? {
            Some(true) => {
                return Err(VfsError::TypeMismatch {
                    path: path.clone(),
                    expected: EntryKind::File,
                });
            }
            Some(false) if !overwrite => return Err(VfsError::AlreadyExists(path.clone())),
            _ => {}
        }

        self.ensure_parent(&physical, path).await?;
        fs::File::create(&physical)
            .await
            .map_err(VfsError::io_at(path))?;
        self.cache.insert_with_ancestors(&self.root, &physical, false);
        Ok(path.clone())
    }

    async fn create_directory(
        &self,
        path: &VirtualPath,
        overwrite: bool,
    ) -> VfsResult<VirtualPath> {
        naming::require_directory(path)?;
        let physical = self.to_physical(path);
        match self.probe(&physical, path).await? {
            Some(false) => {
                return Err(VfsError::TypeMismatch {
                    path: path.clone(),
                    expected: EntryKind::Directory,
                });
            }
            Some(true) if !overwrite => return Err(VfsError::AlreadyExists(path.clone())),
            Some(true) => return Ok(path.clone()),
            None => {}
        }

        self.ensure_parent(&physical, path).await?;
        fs::create_dir(&physical)
            .await
            .map_err(VfsError::io_at(path))?;
        self.cache.insert_with_ancestors(&self.root, &physical, true);
        Ok(path.clone())
    }

    async fn delete_entry(&self, path: &VirtualPath) -> VfsResult<bool> {
        if path.is_root() {
            return Err(VfsError::InvalidOperation(format!(
                "cannot delete the root of {}",
                path.scheme()
            )));
        }

        let physical = self.to_physical(path);
        let Some(is_dir) = self.probe(&physical, path).await? else {
            return Ok(false);
        };
        naming::require_kind(path, is_dir)?;

        if is_dir {
            fs::remove_dir_all(&physical).await
        } else {
            fs::remove_file(&physical).await
        }
        .map_err(VfsError::io_at(path))?;

        // With a watcher, the delete notification clears the cache
        if !self.watching {
            self.cache.take(&physical);
        }
        Ok(true)
    }

    async fn move_entry(
        &self,
        source: &VirtualPath,
        dest_dir: &VirtualPath,
    ) -> VfsResult<VirtualPath> {
        let target = naming::moved_path(source, dest_dir)?;
        self.require_existing(dest_dir).await?;
        self.relocate(source, target).await
    }

    async fn rename_entry(&self, path: &VirtualPath, new_name: &str) -> VfsResult<VirtualPath> {
        let target = naming::renamed_path(path, new_name)?;
        self.relocate(path, target).await
    }

    async fn duplicate_entry(&self, path: &VirtualPath) -> VfsResult<VirtualPath> {
        let source = self.require_existing(path).await?;

        let mut n = 1;
        let (target, physical) = loop {
            let candidate = naming::duplicate_path(path, n)?;
            let physical = self.to_physical(&candidate);
            if self.probe(&physical, &candidate).await?.is_none() {
                break (candidate, physical);
            }
            n += 1;
        };

        if path.is_directory() {
            copy_dir_recursive(&self.cache, &source, &physical)
                .await
                .map_err(VfsError::io_at(&target))?;
        } else {
            fs::copy(&source, &physical)
                .await
                .map_err(VfsError::io_at(&target))?;
            self.cache.insert(physical, false);
        }

        tracing::debug!(%path, copy = %target, "duplicated entry");
        Ok(target)
    }

    async fn write_bytes(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()> {
        naming::require_file(path)?;
        let physical = self.require_existing(path).await?;
        fs::write(&physical, data)
            .await
            .map_err(VfsError::io_at(path))
    }

    async fn open_write(&self, path: &VirtualPath) -> VfsResult<WriteStream> {
        naming::require_file(path)?;
        let physical = self.require_existing(path).await?;
        let file = fs::File::create(&physical)
            .await
            .map_err(VfsError::io_at(path))?;
        Ok(Box::new(file))
    }
}

impl VolumeWatch for PhysicalVolume {
    fn subscribe(&self, handler: ChangeHandler) -> Subscription {
        self.events.subscribe_arc(handler)
    }
}

impl Drop for PhysicalVolume {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if watcher.is_some() {
            tracing::debug!(scheme = %self.info.scheme, "stopping watcher");
        }
    }
}
