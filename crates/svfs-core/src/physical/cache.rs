//! Path → kind cache for a physical volume.
//!
//! Once an entry is gone from disk nothing can tell whether it was a file or a
//! directory, so every known path's kind is recorded here. Keys are absolute
//! OS paths under the volume root; the root itself is never stored.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::fs;

#[derive(Debug, Default)]
pub(crate) struct KindCache {
    kinds: RwLock<HashMap<PathBuf, bool>>,
}

impl KindCache {
    /// Record every entry below `root`. Symlinks are recorded but not followed.
    pub(crate) async fn scan(root: &Path) -> io::Result<Self> {
        let mut kinds = HashMap::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(err) if dir == root => return Err(err),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), %err, "skipping unreadable directory");
                    continue;
                }
            };

            while let Some(entry) = reader.next_entry().await? {
                let is_dir = entry.file_type().await?.is_dir();
                let path = entry.path();
                if is_dir {
                    pending.push(path.clone());
                }
                kinds.insert(path, is_dir);
            }
        }

        Ok(Self {
            kinds: RwLock::new(kinds),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, bool>> {
        self.kinds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, bool>> {
        self.kinds.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Some(true)` for a directory, `Some(false)` for a file.
    pub(crate) fn get(&self, path: &Path) -> Option<bool> {
        self.read().get(path).copied()
    }

    pub(crate) fn insert(&self, path: PathBuf, is_dir: bool) {
        self.write().insert(path, is_dir);
    }

    /// Record `path` and mark every ancestor below `root` as a directory.
    pub(crate) fn insert_with_ancestors(&self, root: &Path, path: &Path, is_dir: bool) {
        let mut kinds = self.write();
        for ancestor in path.ancestors().skip(1) {
            if ancestor == root || !ancestor.starts_with(root) {
                break;
            }
            kinds.insert(ancestor.to_path_buf(), true);
        }
        kinds.insert(path.to_path_buf(), is_dir);
    }

    /// Forget `path` and everything below it, returning the kind of `path`.
    pub(crate) fn take(&self, path: &Path) -> Option<bool> {
        let mut kinds = self.write();
        let kind = kinds.remove(path);
        if kind == Some(true) {
            kinds.retain(|key, _| !key.starts_with(path));
        }
        kind
    }

    /// Duplicate the records for `from` and its descendants under `to`.
    pub(crate) fn copy_tree(&self, from: &Path, to: &Path) {
        let mut kinds = self.write();
        let copies: Vec<(PathBuf, bool)> = kinds
            .iter()
            .filter_map(|(key, is_dir)| {
                key.strip_prefix(from)
                    .ok()
                    .map(|rest| (join_rest(to, rest), *is_dir))
            })
            .collect();
        kinds.extend(copies);
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }
}

fn join_rest(base: &Path, rest: &Path) -> PathBuf {
    if rest.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rest)
    }
}
