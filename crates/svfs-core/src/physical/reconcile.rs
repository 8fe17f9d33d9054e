//! Turn native watcher notifications into [`ChangeEvent`]s.
//!
//! Native events arrive on the watcher thread. Each one is mapped to a change
//! kind, the kind cache is updated, and the resulting event is published to
//! the volume's subscribers on that same thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use svfs_types::{ChangeEvent, ChangeKind, EntryKind, VirtualPath};

use super::cache::KindCache;
use crate::events::EventHub;
use crate::tree;

pub(crate) struct Reconciler {
    root: PathBuf,
    scheme: String,
    cache: Arc<KindCache>,
    events: EventHub<ChangeEvent>,
}

impl Reconciler {
    pub(crate) fn new(
        root: PathBuf,
        scheme: String,
        cache: Arc<KindCache>,
        events: EventHub<ChangeEvent>,
    ) -> Self {
        Self {
            root,
            scheme,
            cache,
            events,
        }
    }

    /// Watcher callback.
    pub(crate) fn handle(&self, result: notify::Result<Event>) {
        match result {
            Ok(event) => {
                if let Some(change) = self.reconcile(&event) {
                    tracing::debug!(%change, "volume change");
                    self.events.publish(&change);
                }
            }
            Err(err) => {
                tracing::error!(scheme = %self.scheme, %err, "file watcher error");
            }
        }
    }

    /// Map one native event, updating the cache. `None` means "ignore".
    pub(crate) fn reconcile(&self, event: &Event) -> Option<ChangeEvent> {
        let first = event.paths.first();
        let (kind, path) = match &event.kind {
            EventKind::Create(_) => (ChangeKind::Created, first?),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::To => (ChangeKind::Renamed, event.paths.last()?),
                RenameMode::From => (ChangeKind::Deleted, first?),
                // Backends that report both halves also report each half on its own
                RenameMode::Both => return None,
                RenameMode::Any | RenameMode::Other => {
                    let path = event.paths.last()?;
                    if std::fs::symlink_metadata(path).is_ok() {
                        (ChangeKind::Renamed, path)
                    } else {
                        (ChangeKind::Deleted, path)
                    }
                }
            },
            EventKind::Modify(_) => (ChangeKind::Modified, first?),
            EventKind::Remove(_) => (ChangeKind::Deleted, first?),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
        };

        if path == &self.root || !path.starts_with(&self.root) {
            return None;
        }

        let entry = match kind {
            ChangeKind::Deleted => self.forget(path),
            _ => self.record(kind, path),
        };
        let virtual_path = virtual_path(&self.root, &self.scheme, path, entry == EntryKind::Directory)?;
        Some(ChangeEvent::new(kind, virtual_path, entry))
    }

    fn forget(&self, path: &Path) -> EntryKind {
        match self.cache.take(path) {
            Some(is_dir) => EntryKind::from_is_dir(is_dir),
            None => {
                tracing::warn!(
                    scheme = %self.scheme,
                    path = %path.display(),
                    "deleted path was never seen; kind unknown"
                );
                EntryKind::Unknown
            }
        }
    }

    fn record(&self, kind: ChangeKind, path: &Path) -> EntryKind {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let is_dir = meta.is_dir();
                self.cache.insert_with_ancestors(&self.root, path, is_dir);
                if is_dir && kind != ChangeKind::Modified {
                    self.record_below(path);
                }
                EntryKind::from_is_dir(is_dir)
            }
            // Gone again before we looked
            Err(_) => self
                .cache
                .get(path)
                .map_or(EntryKind::Unknown, EntryKind::from_is_dir),
        }
    }

    /// A directory that appears by rename arrives with its contents, and no
    /// per-child events follow.
    fn record_below(&self, dir: &Path) {
        let mut pending = vec![dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(reader) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in reader.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path.clone());
                }
                self.cache.insert(path, file_type.is_dir());
            }
        }
    }
}

/// The virtual path for an OS path under `root`. `None` for the root itself.
pub(crate) fn virtual_path(
    root: &Path,
    scheme: &str,
    physical: &Path,
    is_dir: bool,
) -> Option<VirtualPath> {
    let relative = physical.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let local = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(tree::path_for(scheme, &local, is_dir))
}
