//! Error type shared by every svfs layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::access::VolumeAccess;
use crate::metadata::EntryKind;
use crate::path::VirtualPath;

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS operation errors.
///
/// Environmental conditions (missing entries, collisions, denied access,
/// unmounted schemes) are recoverable and meant to be shown to users.
/// Structural misuse (a file operation on a directory-shaped path, `combine`
/// on a file, the parent of a root) is reported before any storage is touched.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(VirtualPath),

    #[error("already exists: {0}")]
    AlreadyExists(VirtualPath),

    #[error("type mismatch: {path} is not a {expected}")]
    TypeMismatch {
        path: VirtualPath,
        expected: EntryKind,
    },

    #[error("access denied: volume '{volume}' ({scheme}://) does not grant {access}")]
    AccessDenied {
        volume: String,
        scheme: String,
        access: VolumeAccess,
    },

    #[error("no volume mounted for scheme '{0}'")]
    NoVolumeMounted(String),

    #[error("scheme '{0}' is already mounted")]
    AlreadyMounted(String),

    #[error("malformed virtual path '{input}': {reason}")]
    Format { input: String, reason: &'static str },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot operate across volumes: {from} -> {to}")]
    CrossVolume { from: VirtualPath, to: VirtualPath },

    #[error("volume root {} does not exist or is not a directory", .0.display())]
    InvalidRoot(PathBuf),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("volume '{0}' has been released")]
    VolumeReleased(String),

    #[error("unknown volume provider '{0}'")]
    UnknownProvider(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    /// Map an `io::Error` raised while operating on `path` onto the taxonomy.
    pub fn from_io(path: &VirtualPath, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.clone()),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(path.clone()),
            io::ErrorKind::IsADirectory => VfsError::TypeMismatch {
                path: path.clone(),
                expected: EntryKind::File,
            },
            io::ErrorKind::NotADirectory => VfsError::TypeMismatch {
                path: path.clone(),
                expected: EntryKind::Directory,
            },
            _ => VfsError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }

    /// Closure form of [`VfsError::from_io`] for `map_err`.
    pub fn io_at(path: &VirtualPath) -> impl FnOnce(io::Error) -> VfsError + '_ {
        move |err| VfsError::from_io(path, err)
    }

    /// True for errors that report a missing entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let path = VirtualPath::parse("vol://a.txt").unwrap();
        let err = VfsError::from_io(&path, io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err = VfsError::from_io(&path, io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(err, VfsError::AlreadyExists(_)));

        let err = VfsError::from_io(&path, io::Error::other("boom"));
        assert!(matches!(err, VfsError::Io { .. }));
    }

    #[test]
    fn test_access_denied_message_names_everything() {
        let err = VfsError::AccessDenied {
            volume: "Cartridge".to_string(),
            scheme: "rom".to_string(),
            access: VolumeAccess::WRITE,
        };
        assert_eq!(
            err.to_string(),
            "access denied: volume 'Cartridge' (rom://) does not grant write"
        );
    }
}
