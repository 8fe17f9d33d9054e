//! Scheme-qualified virtual paths.
//!
//! A [`VirtualPath`] is `scheme://local/path`. The local part is always stored
//! normalized: `/`-separated, no empty or `.` segments, and `..` resolved against
//! the segments before it. A trailing `/` is the only thing that marks a path as
//! a directory; the root of a scheme (empty local part) is always a directory.
//!
//! Everything in this module is syntactic. Nothing here touches storage.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{VfsError, VfsResult};
use crate::metadata::EntryKind;

/// Separator between scheme and local path in the URI form.
pub const SCHEME_SEPARATOR: &str = "://";

/// Normalize a local path.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment (and is a
/// no-op when there is nothing left to pop). The result keeps a trailing `/`
/// when the input was directory-shaped, i.e. it ended in `/`, `.` or `..`.
///
/// ```
/// use svfs_types::normalize;
///
/// assert_eq!(normalize("a//b/./c/../"), "a/b/");
/// assert_eq!(normalize("../x"), "x");
/// assert_eq!(normalize("a/.."), "");
/// ```
pub fn normalize(local: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in local.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        return String::new();
    }

    let last = local.rsplit('/').next().unwrap_or("");
    let directory_shaped = matches!(last, "" | "." | "..");

    let mut out = stack.join("/");
    if directory_shaped {
        out.push('/');
    }
    out
}

/// Check that `scheme` can appear in a URI.
///
/// A scheme must be non-empty and must not contain `/` or `:`, otherwise the
/// displayed path would not parse back to the same value.
pub fn validate_scheme(scheme: &str) -> VfsResult<()> {
    let reason = if scheme.is_empty() {
        "scheme is empty"
    } else if scheme.contains(['/', ':']) {
        "scheme must not contain '/' or ':'"
    } else {
        return Ok(());
    };
    Err(VfsError::Format {
        input: scheme.to_string(),
        reason,
    })
}

/// An immutable, normalized, scheme-qualified path.
///
/// Equality compares the scheme ASCII-case-insensitively and the local path
/// exactly. Hashing agrees with that.
#[derive(Clone)]
pub struct VirtualPath {
    scheme: String,
    local_path: String,
}

impl VirtualPath {
    /// Build a path from a scheme and a raw local path, normalizing the latter.
    ///
    /// The scheme is taken as is. Only schemes accepted by [`validate_scheme`]
    /// display as a URI that parses back to the same path; volumes are checked
    /// when they are mounted.
    pub fn new(scheme: impl Into<String>, local_path: &str) -> Self {
        Self {
            scheme: scheme.into(),
            local_path: normalize(local_path),
        }
    }

    /// The root directory of `scheme`.
    pub fn root(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            local_path: String::new(),
        }
    }

    /// Parse `scheme://local/path`.
    ///
    /// Fails with [`VfsError::Format`] unless the input contains exactly one
    /// `://` and a scheme accepted by [`validate_scheme`].
    pub fn parse(uri: &str) -> VfsResult<Self> {
        let mut parts = uri.split(SCHEME_SEPARATOR);
        let (Some(scheme), Some(local), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(VfsError::Format {
                input: uri.to_string(),
                reason: "expected exactly one '://' separator",
            });
        };

        validate_scheme(scheme).map_err(|err| match err {
            VfsError::Format { reason, .. } => VfsError::Format {
                input: uri.to_string(),
                reason,
            },
            other => other,
        })?;

        Ok(Self::new(scheme, local))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The normalized local part, including the trailing `/` of directories.
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn is_root(&self) -> bool {
        self.local_path.is_empty()
    }

    pub fn is_directory(&self) -> bool {
        self.is_root() || self.local_path.ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// The shape this path declares.
    pub fn kind(&self) -> EntryKind {
        if self.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Iterate over the path segments, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.local_path.split('/').filter(|s| !s.is_empty())
    }

    /// Final segment without the trailing `/`. Empty for the root.
    pub fn name(&self) -> &str {
        self.local_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    /// Extension of a file name including the leading dot, e.g. `.png`.
    ///
    /// Directories have no extension, and neither do names whose only dot is
    /// the first character (`.gitignore`).
    pub fn extension(&self) -> Option<&str> {
        if self.is_directory() {
            return None;
        }
        let name = self.name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => Some(&name[idx..]),
            _ => None,
        }
    }

    /// Name without its extension.
    pub fn stem(&self) -> &str {
        let name = self.name();
        match self.extension() {
            Some(ext) => &name[..name.len() - ext.len()],
            None => name,
        }
    }

    /// Resolve `sub` relative to this directory.
    ///
    /// An empty `sub` returns `self`. A trailing `/` on `sub` produces a
    /// directory path, anything else a file path.
    pub fn combine(&self, sub: &str) -> VfsResult<Self> {
        if !self.is_directory() {
            return Err(VfsError::TypeMismatch {
                path: self.clone(),
                expected: EntryKind::Directory,
            });
        }
        if sub.is_empty() {
            return Ok(self.clone());
        }

        let sub = sub.trim_start_matches('/');
        Ok(Self::new(
            self.scheme.clone(),
            &format!("{}{}", self.local_path, sub),
        ))
    }

    /// The containing directory. Fails on the root.
    pub fn parent(&self) -> VfsResult<Self> {
        if self.is_root() {
            return Err(VfsError::InvalidPath {
                path: self.to_string(),
                reason: "the root has no parent",
            });
        }

        let trimmed = self.local_path.trim_end_matches('/');
        let parent = match trimmed.rfind('/') {
            Some(idx) => &trimmed[..=idx],
            None => "",
        };

        Ok(Self {
            scheme: self.scheme.clone(),
            local_path: parent.to_string(),
        })
    }

    /// True when `other` lies anywhere below this directory.
    pub fn is_parent_of(&self, other: &VirtualPath) -> bool {
        self.prefix_depth(other).is_some_and(|extra| extra >= 1)
    }

    /// True when `other` is an immediate child of this directory.
    pub fn is_direct_parent_of(&self, other: &VirtualPath) -> bool {
        self.prefix_depth(other) == Some(1)
    }

    /// Number of segments `other` has beyond this path, if this path is a
    /// directory whose segments prefix `other`'s.
    fn prefix_depth(&self, other: &VirtualPath) -> Option<usize> {
        if !self.is_directory() || !self.same_scheme(other) {
            return None;
        }

        let mut theirs = other.segments();
        for mine in self.segments() {
            if theirs.next() != Some(mine) {
                return None;
            }
        }
        Some(theirs.count())
    }

    /// Scheme comparison used for equality and routing.
    pub fn same_scheme(&self, other: &VirtualPath) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme)
    }

    /// This path with a trailing `/`.
    pub fn to_directory(&self) -> Self {
        if self.is_directory() {
            return self.clone();
        }
        Self {
            scheme: self.scheme.clone(),
            local_path: format!("{}/", self.local_path),
        }
    }

    /// This path without a trailing `/`. The root stays the root.
    pub fn to_file(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            local_path: self.local_path.trim_end_matches('/').to_string(),
        }
    }

    /// Same location, shaped as `kind` (unknown kinds render as files).
    pub fn with_kind(&self, kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => self.to_directory(),
            EntryKind::File | EntryKind::Unknown => self.to_file(),
        }
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.same_scheme(other) && self.local_path == other.local_path
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.scheme.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
        self.local_path.hash(state);
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.local_path)
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({self})")
    }
}

impl FromStr for VirtualPath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VirtualPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
