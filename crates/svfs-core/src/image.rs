//! Read-only in-memory volume.
//!
//! An `ImageVolume` is built once, either from a builder or by freezing a
//! [`MemoryVolume`](crate::memory::MemoryVolume), and never changes. It only
//! implements fetch and read, so it mounts with `fetch|read` access and every
//! write through the dispatcher fails with `AccessDenied`.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use svfs_types::{normalize, EntryKind, Metadata, VfsError, VfsResult, VirtualPath};

use crate::naming;
use crate::traits::{ReadStream, VolumeFetch, VolumeInfo, VolumeRead};
use crate::tree::{self, key_of};

#[derive(Debug, Clone)]
enum ImageNode {
    File(Arc<[u8]>),
    Directory,
}

impl ImageNode {
    fn is_dir(&self) -> bool {
        matches!(self, ImageNode::Directory)
    }
}

pub struct ImageVolume {
    info: VolumeInfo,
    nodes: BTreeMap<String, ImageNode>,
}

impl std::fmt::Debug for ImageVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageVolume")
            .field("scheme", &self.info.scheme)
            .field("entries", &self.nodes.len())
            .finish()
    }
}

impl ImageVolume {
    pub fn builder(scheme: impl Into<String>) -> ImageVolumeBuilder {
        ImageVolumeBuilder::new(scheme)
    }

    fn node(&self, path: &VirtualPath) -> VfsResult<&ImageNode> {
        let node = self
            .nodes
            .get(&key_of(path))
            .ok_or_else(|| VfsError::NotFound(path.clone()))?;
        naming::require_kind(path, node.is_dir())?;
        Ok(node)
    }
}

/// Collects files and directories for an [`ImageVolume`].
///
/// Paths are local paths (`"maps/m1.bin"`); missing parents are added.
#[derive(Debug)]
pub struct ImageVolumeBuilder {
    scheme: String,
    id: Option<String>,
    display_name: Option<String>,
    nodes: BTreeMap<String, ImageNode>,
}

impl ImageVolumeBuilder {
    fn new(scheme: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), ImageNode::Directory);
        Self {
            scheme: scheme.into(),
            id: None,
            display_name: None,
            nodes,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        let key = normalize(path).trim_matches('/').to_string();
        self.add_parents(&key);
        self.nodes.entry(key).or_insert(ImageNode::Directory);
        self
    }

    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        let key = normalize(path).trim_matches('/').to_string();
        if key.is_empty() || matches!(self.nodes.get(&key), Some(ImageNode::Directory)) {
            tracing::warn!(path, "skipping image file that collides with a directory");
            return self;
        }
        self.add_parents(&key);
        let data: Vec<u8> = data.into();
        self.nodes.insert(key, ImageNode::File(data.into()));
        self
    }

    /// Add every `(path, data)` pair.
    pub fn files<P, D>(self, files: impl IntoIterator<Item = (P, D)>) -> Self
    where
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        files
            .into_iter()
            .fold(self, |builder, (path, data)| builder.file(path.as_ref(), data))
    }

    fn add_parents(&mut self, key: &str) {
        let mut current = tree::parent_key(key);
        while let Some(parent) = current {
            if parent.is_empty() {
                break;
            }
            // A file in the way becomes a directory; the later layout wins.
            self.nodes.insert(parent.to_string(), ImageNode::Directory);
            current = tree::parent_key(parent);
        }
    }

    pub fn build(self) -> ImageVolume {
        let display_name = self.display_name.unwrap_or_else(|| self.scheme.clone());
        let id = self.id.unwrap_or_else(VolumeInfo::generate_id);
        ImageVolume {
            info: VolumeInfo::new(id, self.scheme, display_name, "image"),
            nodes: self.nodes,
        }
    }
}

#[async_trait]
impl VolumeFetch for ImageVolume {
    fn info(&self) -> &VolumeInfo {
        &self.info
    }

    async fn metadata(&self, path: &VirtualPath) -> VfsResult<Metadata> {
        match self.nodes.get(&key_of(path)) {
            Some(ImageNode::File(data)) => Ok(Metadata::file(data.len() as u64, None)),
            Some(ImageNode::Directory) => Ok(Metadata::directory(None)),
            None => Err(VfsError::NotFound(path.clone())),
        }
    }

    async fn entries(&self, dir: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        naming::require_directory(dir)?;
        self.node(dir)?;
        let key = key_of(dir);
        Ok(tree::children(&self.nodes, &key)
            .map(|(child, node)| tree::path_for(&self.info.scheme, child, node.is_dir()))
            .collect())
    }

    fn as_read(&self) -> Option<&dyn VolumeRead> {
        Some(self)
    }
}

#[async_trait]
impl VolumeRead for ImageVolume {
    async fn open_read(&self, path: &VirtualPath) -> VfsResult<ReadStream> {
        let data = self.read_bytes(path).await?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    async fn read_bytes(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        naming::require_file(path)?;
        match self.node(path)? {
            ImageNode::File(data) => Ok(data.to_vec()),
            ImageNode::Directory => Err(VfsError::TypeMismatch {
                path: path.clone(),
                expected: EntryKind::File,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(uri: &str) -> VirtualPath {
        VirtualPath::parse(uri).unwrap()
    }

    fn sample() -> ImageVolume {
        ImageVolume::builder("rom")
            .display_name("Game ROM")
            .file("maps/overworld.bin", b"map".to_vec())
            .file("title.txt", "Quest")
            .directory("empty")
            .build()
    }

    #[tokio::test]
    async fn test_builder_layout() {
        let rom = sample();
        assert_eq!(rom.info().display_name, "Game ROM");

        let root: Vec<String> = rom
            .entries(&VirtualPath::root("rom"))
            .await
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(root, vec!["rom://empty/", "rom://maps/", "rom://title.txt"]);
    }

    #[tokio::test]
    async fn test_read_and_metadata() {
        let rom = sample();
        assert_eq!(rom.read_to_string(&p("rom://title.txt")).await.unwrap(), "Quest");
        assert_eq!(rom.metadata(&p("rom://maps/overworld.bin")).await.unwrap().size, 3);
        assert!(rom.exists(&p("rom://maps/")).await);
        assert!(!rom.exists(&p("rom://maps")).await);
    }

    #[tokio::test]
    async fn test_missing_and_mismatched() {
        let rom = sample();
        assert!(matches!(
            rom.read_bytes(&p("rom://nope.bin")).await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            rom.entries(&p("rom://title.txt/")).await,
            Err(VfsError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_files_from_iterator() {
        let rom = ImageVolume::builder("rom")
            .files([("a/1.bin", vec![1u8]), ("a/2.bin", vec![2u8])])
            .build();
        let files = rom.files(&p("rom://a/")).await.unwrap();
        assert_eq!(files, vec![p("rom://a/1.bin"), p("rom://a/2.bin")]);
    }

    #[test]
    fn test_only_fetch_and_read() {
        let rom = sample();
        assert!(rom.as_read().is_some());
        assert!(rom.as_write().is_none());
        assert!(rom.as_watch().is_none());
    }
}
