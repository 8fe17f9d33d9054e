//! The scheme → volume dispatcher.
//!
//! [`VirtualFileSystem`] owns the mount table. Every routed operation resolves
//! the path's scheme to a mounted volume, checks that the volume grants the
//! capability the operation needs, and forwards the call unchanged:
//!
//! ```text
//! read_bytes("assets://a.txt")
//!   → mounts["assets"]           NoVolumeMounted if absent
//!   → require(READ)              AccessDenied if not granted
//!   → volume.read_bytes(path)
//! ```
//!
//! Change events from every watchable volume are republished on the
//! dispatcher's own hub as [`VfsEvent::Changed`], next to mount lifecycle
//! events.
//!
//! There is no global instance; callers share an `Arc<VirtualFileSystem>`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use svfs_types::{
    ChangeEvent, Metadata, VfsError, VfsResult, VirtualPath, VolumeAccess, validate_scheme,
};
use tokio::sync::mpsc;

use crate::config::{VfsConfig, VolumeConfig};
use crate::entry::Entry;
use crate::events::{EventHub, Subscription};
use crate::provider::ProviderRegistry;
use crate::traits::{ReadStream, WriteStream};
use crate::volume::Volume;
use crate::walk::EntryStream;

/// Events published by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsEvent {
    VolumeMounted { scheme: String, volume_id: String },
    VolumeUnmounted { scheme: String, volume_id: String },
    /// A change observed by a mounted volume.
    Changed(ChangeEvent),
}

/// What a project file records about a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub scheme: String,
    pub id: String,
    pub provider: String,
    pub display_name: String,
    pub root: String,
}

struct Mount {
    volume: Arc<Volume>,
    provider: String,
    /// Forwards the volume's changes; dropped before the mount is removed.
    subscription: Option<Subscription>,
    /// Cleared on unmount. Gates deliveries already in flight when the
    /// subscription is dropped.
    forwarding: Arc<AtomicBool>,
}

impl Mount {
    fn detach(&mut self) {
        self.forwarding.store(false, Ordering::SeqCst);
        self.subscription.take();
    }
}

/// Routes virtual paths to mounted volumes.
///
/// Scheme lookup is ASCII-case-insensitive, matching [`VirtualPath`] equality.
#[derive(Default)]
pub struct VirtualFileSystem {
    mounts: RwLock<HashMap<String, Mount>>,
    events: EventHub<VfsEvent>,
}

impl fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<String> = self.read_mounts().keys().cloned().collect();
        schemes.sort();
        f.debug_struct("VirtualFileSystem")
            .field("mounts", &schemes)
            .finish()
    }
}

fn scheme_key(scheme: &str) -> String {
    scheme.to_ascii_lowercase()
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_mounts(&self) -> RwLockReadGuard<'_, HashMap<String, Mount>> {
        self.mounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_mounts(&self) -> RwLockWriteGuard<'_, HashMap<String, Mount>> {
        self.mounts.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mount lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Mount `volume` under its scheme.
    ///
    /// Fails with `Format` if the scheme cannot be written in a URI, and with
    /// `AlreadyMounted` if the scheme is taken; the existing mount is left
    /// untouched.
    #[tracing::instrument(skip(self, volume), fields(scheme = %volume.scheme(), volume_id = %volume.id()))]
    pub fn mount_volume(&self, volume: Arc<Volume>, provider: &str) -> VfsResult<()> {
        let scheme = volume.scheme().to_string();
        validate_scheme(&scheme)?;

        {
            let mut mounts = self.write_mounts();
            let key = scheme_key(&scheme);
            if mounts.contains_key(&key) {
                return Err(VfsError::AlreadyMounted(scheme));
            }

            let forwarding = Arc::new(AtomicBool::new(true));
            let subscription = if volume.has_access(VolumeAccess::WATCH) {
                let events = self.events.clone();
                let live = Arc::clone(&forwarding);
                Some(volume.subscribe(move |change: &ChangeEvent| {
                    if live.load(Ordering::SeqCst) {
                        events.publish(&VfsEvent::Changed(change.clone()));
                    }
                })?)
            } else {
                None
            };

            mounts.insert(
                key,
                Mount {
                    volume: Arc::clone(&volume),
                    provider: provider.to_string(),
                    subscription,
                    forwarding,
                },
            );
        }

        tracing::debug!(access = %volume.access(), "mounted volume");
        self.events.publish(&VfsEvent::VolumeMounted {
            scheme,
            volume_id: volume.id().to_string(),
        });
        Ok(())
    }

    /// Create a volume through its provider and mount it.
    pub async fn mount_config(
        &self,
        registry: &ProviderRegistry,
        config: &VolumeConfig,
    ) -> VfsResult<Arc<Volume>> {
        // Check early so a bad or taken scheme never starts a scan or a watcher
        validate_scheme(&config.scheme)?;
        if self.is_mounted(&config.scheme) {
            return Err(VfsError::AlreadyMounted(config.scheme.clone()));
        }

        let provider = registry.get(&config.provider)?;
        let volume = provider.create(config).await?;
        self.mount_volume(Arc::clone(&volume), provider.name())?;
        Ok(volume)
    }

    /// Mount every configured volume in order, stopping at the first failure.
    pub async fn mount_all(
        &self,
        registry: &ProviderRegistry,
        config: &VfsConfig,
    ) -> VfsResult<Vec<Arc<Volume>>> {
        let mut mounted = Vec::with_capacity(config.volumes.len());
        for volume in &config.volumes {
            mounted.push(self.mount_config(registry, volume).await?);
        }
        Ok(mounted)
    }

    /// Unmount whatever is mounted under `scheme`.
    pub fn unmount_scheme(&self, scheme: &str) -> Option<Arc<Volume>> {
        self.unmount_where(scheme, |_| true)
    }

    /// Unmount `volume`, if it is the one mounted under its scheme.
    pub fn unmount_volume(&self, volume: &Arc<Volume>) -> Option<Arc<Volume>> {
        self.unmount_where(volume.scheme(), |mounted| Arc::ptr_eq(mounted, volume))
    }

    /// Forwarding stops before `VolumeUnmounted` is published. A change whose
    /// forwarding check already passed on another thread can still be
    /// delivered after it, so ordering across threads is best effort.
    fn unmount_where(
        &self,
        scheme: &str,
        matches: impl FnOnce(&Arc<Volume>) -> bool,
    ) -> Option<Arc<Volume>> {
        let key = scheme_key(scheme);
        let removed = {
            let mut mounts = self.write_mounts();
            let matched = mounts
                .get(&key)
                .is_some_and(|mount| matches(&mount.volume));
            if matched && let Some(mount) = mounts.get_mut(&key) {
                mount.detach();
            }
            if matched { mounts.remove(&key) } else { None }
        };

        let Some(mount) = removed else {
            tracing::warn!(scheme, "cannot unmount: no such volume mounted");
            return None;
        };
        self.announce_unmount(&mount.volume);
        Some(mount.volume)
    }

    /// Unmount everything, in scheme order.
    pub fn unmount_all(&self) -> Vec<Arc<Volume>> {
        let mut removed: Vec<(String, Arc<Volume>)> = {
            let mut mounts = self.write_mounts();
            mounts
                .drain()
                .map(|(key, mut mount)| {
                    mount.detach();
                    (key, mount.volume)
                })
                .collect()
        };
        removed.sort_by(|a, b| a.0.cmp(&b.0));

        removed
            .into_iter()
            .map(|(_, volume)| {
                self.announce_unmount(&volume);
                volume
            })
            .collect()
    }

    fn announce_unmount(&self, volume: &Volume) {
        tracing::debug!(scheme = volume.scheme(), volume_id = volume.id(), "unmounted volume");
        self.events.publish(&VfsEvent::VolumeUnmounted {
            scheme: volume.scheme().to_string(),
            volume_id: volume.id().to_string(),
        });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════

    pub fn get_volume(&self, scheme: &str) -> Option<Arc<Volume>> {
        self.read_mounts()
            .get(&scheme_key(scheme))
            .map(|mount| Arc::clone(&mount.volume))
    }

    pub fn is_mounted(&self, scheme: &str) -> bool {
        self.read_mounts().contains_key(&scheme_key(scheme))
    }

    /// Mounted volumes, in scheme order.
    pub fn volumes(&self) -> Vec<Arc<Volume>> {
        let mut volumes: Vec<Arc<Volume>> = self
            .read_mounts()
            .values()
            .map(|mount| Arc::clone(&mount.volume))
            .collect();
        volumes.sort_by(|a, b| a.scheme().cmp(b.scheme()));
        volumes
    }

    /// One record per mounted volume, in scheme order.
    pub fn mount_records(&self) -> Vec<MountRecord> {
        let mut records: Vec<MountRecord> = self
            .read_mounts()
            .values()
            .map(|mount| {
                let info = mount.volume.info();
                MountRecord {
                    scheme: info.scheme.clone(),
                    id: info.id.clone(),
                    provider: mount.provider.clone(),
                    display_name: info.display_name.clone(),
                    root: info.root.clone(),
                }
            })
            .collect();
        records.sort_by(|a, b| a.scheme.cmp(&b.scheme));
        records
    }

    /// The volume for `path`, provided it grants `access`.
    pub fn resolve(&self, path: &VirtualPath, access: VolumeAccess) -> VfsResult<Arc<Volume>> {
        let volume = self
            .get_volume(path.scheme())
            .ok_or_else(|| VfsError::NoVolumeMounted(path.scheme().to_string()))?;
        volume.require(access)?;
        Ok(volume)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════

    /// Observe mounts, unmounts and changes on every watchable volume.
    pub fn subscribe(&self, handler: impl Fn(&VfsEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(handler)
    }

    pub fn channel(&self) -> (Subscription, mpsc::UnboundedReceiver<VfsEvent>) {
        self.events.channel()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Fetch
    // ═══════════════════════════════════════════════════════════════════

    /// A handle for `path` without probing storage.
    pub fn entry(&self, path: &VirtualPath) -> VfsResult<Entry> {
        Ok(self.resolve(path, VolumeAccess::FETCH)?.entry(path.clone()))
    }

    pub async fn exists(&self, path: &VirtualPath) -> VfsResult<bool> {
        self.resolve(path, VolumeAccess::FETCH)?.exists(path).await
    }

    pub async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata> {
        self.resolve(path, VolumeAccess::FETCH)?.metadata(path).await
    }

    pub async fn get_entry(&self, path: &VirtualPath) -> VfsResult<Entry> {
        self.resolve(path, VolumeAccess::FETCH)?.get_entry(path).await
    }

    pub async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.resolve(dir, VolumeAccess::FETCH)?.entries(dir).await
    }

    pub async fn files(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.resolve(dir, VolumeAccess::FETCH)?.files(dir).await
    }

    pub async fn directories(&self, dir: &VirtualPath) -> VfsResult<Vec<Entry>> {
        self.resolve(dir, VolumeAccess::FETCH)?.directories(dir).await
    }

    pub fn files_recursive(&self, dir: &VirtualPath) -> VfsResult<EntryStream> {
        self.resolve(dir, VolumeAccess::FETCH)?.files_recursive(dir)
    }

    pub fn entries_recursive(&self, dir: &VirtualPath) -> VfsResult<EntryStream> {
        self.resolve(dir, VolumeAccess::FETCH)?.entries_recursive(dir)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Read
    // ═══════════════════════════════════════════════════════════════════

    pub async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream> {
        self.resolve(path, VolumeAccess::READ)?.open_read(path).await
    }

    pub async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        self.resolve(path, VolumeAccess::READ)?.read_bytes(path).await
    }

    pub async fn read_to_string(&self, path: &VirtualPath) -> VfsResult<String> {
        self.resolve(path, VolumeAccess::READ)?
            .read_to_string(path)
            .await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Write
    // ═══════════════════════════════════════════════════════════════════

    pub async fn create_file(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<Entry> {
        self.resolve(path, VolumeAccess::WRITE)?
            .create_file(path, overwrite)
            .await
    }

    pub async fn create_directory(&self, path: &VirtualPath, overwrite: bool) -> VfsResult<Entry> {
        self.resolve(path, VolumeAccess::WRITE)?
            .create_directory(path, overwrite)
            .await
    }

    pub async fn delete_entry(&self, path: &VirtualPath) -> VfsResult<bool> {
        self.resolve(path, VolumeAccess::WRITE)?
            .delete_entry(path)
            .await
    }

    /// Move `source` into `dest_dir`. Both must be on the same volume.
    pub async fn move_entry(&self, source: &VirtualPath, dest_dir: &VirtualPath) -> VfsResult<Entry> {
        if !source.same_scheme(dest_dir) {
            return Err(VfsError::CrossVolume {
                from: source.clone(),
                to: dest_dir.clone(),
            });
        }
        self.resolve(source, VolumeAccess::WRITE)?
            .move_entry(source, dest_dir)
            .await
    }

    pub async fn rename_entry(&self, path: &VirtualPath, new_name: &str) -> VfsResult<Entry> {
        self.resolve(path, VolumeAccess::WRITE)?
            .rename_entry(path, new_name)
            .await
    }

    pub async fn duplicate_entry(&self, path: &VirtualPath) -> VfsResult<Entry> {
        self.resolve(path, VolumeAccess::WRITE)?
            .duplicate_entry(path)
            .await
    }

    pub async fn write_bytes(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<()> {
        self.resolve(path, VolumeAccess::WRITE)?
            .write_bytes(path, data)
            .await
    }

    pub async fn open_write(&self, path: &VirtualPath) -> VfsResult<WriteStream> {
        self.resolve(path, VolumeAccess::WRITE)?
            .open_write(path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageVolume;
    use crate::memory::MemoryVolume;
    use std::sync::Mutex;

    fn p(uri: &str) -> VirtualPath {
        VirtualPath::parse(uri).unwrap()
    }

    fn recorder(vfs: &VirtualFileSystem) -> (Subscription, Arc<Mutex<Vec<VfsEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = vfs.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (sub, seen)
    }

    #[tokio::test]
    async fn test_routes_by_scheme() {
        let vfs = VirtualFileSystem::new();
        vfs.mount_volume(Volume::new(MemoryVolume::new("a")), "memory").unwrap();
        vfs.mount_volume(Volume::new(MemoryVolume::new("b")), "memory").unwrap();

        let file = vfs.create_file(&p("a://x.txt"), false).await.unwrap();
        file.write_bytes(b"from a").await.unwrap();

        assert!(vfs.exists(&p("A://x.txt")).await.unwrap());
        assert!(!vfs.exists(&p("b://x.txt")).await.unwrap());
        assert_eq!(vfs.read_to_string(&p("a://x.txt")).await.unwrap(), "from a");
    }

    #[test]
    fn test_unaddressable_scheme_is_not_mounted() {
        let vfs = VirtualFileSystem::new();
        for scheme in ["", "a://b", "a/b"] {
            let err = vfs
                .mount_volume(Volume::new(MemoryVolume::new(scheme)), "memory")
                .unwrap_err();
            assert!(matches!(err, VfsError::Format { .. }), "{scheme:?}: {err}");
        }
        assert!(vfs.volumes().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_scheme_keeps_first() {
        let vfs = VirtualFileSystem::new();
        let first = Volume::new(MemoryVolume::new("vol"));
        let second = Volume::new(MemoryVolume::new("vol"));

        vfs.mount_volume(Arc::clone(&first), "memory").unwrap();
        let err = vfs.mount_volume(second, "memory").unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(ref scheme) if scheme == "vol"));
        assert!(Arc::ptr_eq(&vfs.get_volume("vol").unwrap(), &first));
    }

    #[tokio::test]
    async fn test_unmounted_scheme() {
        let vfs = VirtualFileSystem::new();
        let err = vfs.read_bytes(&p("nowhere://a.txt")).await.unwrap_err();
        assert!(matches!(err, VfsError::NoVolumeMounted(ref scheme) if scheme == "nowhere"));
        assert!(vfs.unmount_scheme("nowhere").is_none());
    }

    #[tokio::test]
    async fn test_capability_checked_before_routing() {
        let vfs = VirtualFileSystem::new();
        let rom = ImageVolume::builder("rom")
            .display_name("Cartridge")
            .file("a.bin", b"x".to_vec())
            .build();
        vfs.mount_volume(Volume::new(rom), "image").unwrap();

        assert_eq!(vfs.read_bytes(&p("rom://a.bin")).await.unwrap(), b"x");
        let err = vfs.delete_entry(&p("rom://a.bin")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "access denied: volume 'Cartridge' (rom://) does not grant write"
        );
    }

    #[tokio::test]
    async fn test_cross_volume_move() {
        let vfs = VirtualFileSystem::new();
        vfs.mount_volume(Volume::new(MemoryVolume::new("a")), "memory").unwrap();
        vfs.mount_volume(Volume::new(MemoryVolume::new("b")), "memory").unwrap();
        vfs.create_file(&p("a://x.txt"), false).await.unwrap();

        let err = vfs.move_entry(&p("a://x.txt"), &p("b://")).await.unwrap_err();
        assert!(matches!(err, VfsError::CrossVolume { .. }));
        assert!(vfs.exists(&p("a://x.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_changes_forwarded_until_unmount() {
        let vfs = VirtualFileSystem::new();
        let volume = Volume::new(MemoryVolume::new("mem"));
        vfs.mount_volume(Arc::clone(&volume), "memory").unwrap();
        let (_sub, seen) = recorder(&vfs);

        vfs.create_file(&p("mem://a.txt"), false).await.unwrap();
        assert!(vfs.unmount_volume(&volume).is_some());
        // Still reachable directly, but no longer forwarded
        volume.create_file(&p("mem://b.txt"), false).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], VfsEvent::Changed(change) if change.path == p("mem://a.txt")));
        assert!(matches!(&seen[1], VfsEvent::VolumeUnmounted { scheme, .. } if scheme == "mem"));
    }

    #[tokio::test]
    async fn test_no_change_forwarded_after_unmount_mid_publish() {
        let vfs = Arc::new(VirtualFileSystem::new());
        let volume = Volume::new(MemoryVolume::new("mem"));

        // Registered ahead of the dispatcher, so it runs first in each publish
        let dispatcher = Arc::clone(&vfs);
        let _unmounter = volume
            .subscribe(move |_| {
                dispatcher.unmount_scheme("mem");
            })
            .unwrap();
        vfs.mount_volume(Arc::clone(&volume), "memory").unwrap();
        let (_sub, seen) = recorder(&vfs);

        volume.create_file(&p("mem://a.txt"), false).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1, "{seen:?}");
        assert!(matches!(&seen[0], VfsEvent::VolumeUnmounted { scheme, .. } if scheme == "mem"));
    }

    #[test]
    fn test_unmount_volume_requires_same_instance() {
        let vfs = VirtualFileSystem::new();
        let mounted = Volume::new(MemoryVolume::new("mem"));
        let other = Volume::new(MemoryVolume::new("mem"));
        vfs.mount_volume(Arc::clone(&mounted), "memory").unwrap();

        assert!(vfs.unmount_volume(&other).is_none());
        assert!(vfs.is_mounted("mem"));
    }

    #[test]
    fn test_unmount_all() {
        let vfs = VirtualFileSystem::new();
        for scheme in ["b", "a"] {
            vfs.mount_volume(Volume::new(MemoryVolume::new(scheme)), "memory")
                .unwrap();
        }
        let (_sub, seen) = recorder(&vfs);

        let removed: Vec<String> = vfs
            .unmount_all()
            .iter()
            .map(|volume| volume.scheme().to_string())
            .collect();
        assert_eq!(removed, vec!["a", "b"]);
        assert!(vfs.volumes().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mount_config_and_records() {
        let vfs = VirtualFileSystem::new();
        let registry = ProviderRegistry::with_defaults();
        let mut config = VolumeConfig::memory("scratch");
        config.id = Some("scratch-1".to_string());

        vfs.mount_config(&registry, &config).await.unwrap();
        assert!(matches!(
            vfs.mount_config(&registry, &config).await,
            Err(VfsError::AlreadyMounted(_))
        ));

        let records = vfs.mount_records();
        assert_eq!(
            records,
            vec![MountRecord {
                scheme: "scratch".to_string(),
                id: "scratch-1".to_string(),
                provider: "memory".to_string(),
                display_name: "scratch".to_string(),
                root: "memory".to_string(),
            }]
        );
    }
}
