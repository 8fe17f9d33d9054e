//! Shape checks and target-name rules shared by writable volumes.

use svfs_types::{EntryKind, VfsError, VfsResult, VirtualPath};

pub(crate) fn require_file(path: &VirtualPath) -> VfsResult<()> {
    if path.is_directory() {
        return Err(VfsError::TypeMismatch {
            path: path.clone(),
            expected: EntryKind::File,
        });
    }
    Ok(())
}

pub(crate) fn require_directory(path: &VirtualPath) -> VfsResult<()> {
    if !path.is_directory() {
        return Err(VfsError::TypeMismatch {
            path: path.clone(),
            expected: EntryKind::Directory,
        });
    }
    Ok(())
}

/// The actual kind must match the shape the path declares.
pub(crate) fn require_kind(path: &VirtualPath, is_dir: bool) -> VfsResult<()> {
    if path.is_directory() != is_dir {
        return Err(VfsError::TypeMismatch {
            path: path.clone(),
            expected: path.kind(),
        });
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> VfsResult<()> {
    let reason = if name.trim().is_empty() {
        "name is blank"
    } else if name.contains('/') || name.contains('\\') {
        "name contains a path separator"
    } else if name == "." || name == ".." {
        "name is a relative path segment"
    } else {
        return Ok(());
    };

    Err(VfsError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// `path` renamed to `new_name` inside its parent, keeping its shape.
pub(crate) fn renamed_path(path: &VirtualPath, new_name: &str) -> VfsResult<VirtualPath> {
    validate_name(new_name)?;
    if path.is_root() {
        return Err(VfsError::InvalidOperation(format!(
            "cannot rename the root of {}",
            path.scheme()
        )));
    }

    let parent = path.parent()?;
    let target = parent.combine(new_name)?;
    Ok(target.with_kind(path.kind()))
}

/// Where `source` ends up when moved into `dest_dir`.
pub(crate) fn moved_path(source: &VirtualPath, dest_dir: &VirtualPath) -> VfsResult<VirtualPath> {
    require_directory(dest_dir)?;
    if source.is_root() {
        return Err(VfsError::InvalidOperation(format!(
            "cannot move the root of {}",
            source.scheme()
        )));
    }
    if !source.same_scheme(dest_dir) {
        return Err(VfsError::CrossVolume {
            from: source.clone(),
            to: dest_dir.clone(),
        });
    }
    if source.is_directory() && (source == dest_dir || source.is_parent_of(dest_dir)) {
        return Err(VfsError::InvalidOperation(format!(
            "cannot move {source} into itself"
        )));
    }

    let target = dest_dir.combine(source.name())?;
    Ok(target.with_kind(source.kind()))
}

/// Sibling of `path` named `"{stem} ({n}){ext}"`.
pub(crate) fn duplicate_path(path: &VirtualPath, n: u64) -> VfsResult<VirtualPath> {
    let name = format!("{} ({n}){}", path.stem(), path.extension().unwrap_or(""));
    renamed_path(path, &name)
}
