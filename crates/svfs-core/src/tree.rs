//! Key helpers for volumes that keep a flat `BTreeMap` of entries.
//!
//! Keys are local paths without the trailing `/`; the root is `""`.

use std::collections::BTreeMap;

use svfs_types::VirtualPath;

pub(crate) fn key_of(path: &VirtualPath) -> String {
    path.local_path().trim_end_matches('/').to_string()
}

pub(crate) fn parent_key(key: &str) -> Option<&str> {
    if key.is_empty() {
        return None;
    }
    Some(key.rfind('/').map_or("", |idx| &key[..idx]))
}

/// True if `key` lies strictly below `ancestor`.
pub(crate) fn is_descendant(key: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !key.is_empty();
    }
    key.len() > ancestor.len()
        && key.starts_with(ancestor)
        && key.as_bytes()[ancestor.len()] == b'/'
}

/// Direct children of `dir_key`, in name order.
pub(crate) fn children<'a, V>(
    tree: &'a BTreeMap<String, V>,
    dir_key: &'a str,
) -> impl Iterator<Item = (&'a str, &'a V)> + 'a {
    tree.iter()
        .filter(move |(key, _)| parent_key(key) == Some(dir_key))
        .map(|(key, value)| (key.as_str(), value))
}

/// Keys of `key` and everything below it.
pub(crate) fn subtree_keys<V>(tree: &BTreeMap<String, V>, key: &str) -> Vec<String> {
    tree.keys()
        .filter(|k| k.as_str() == key || is_descendant(k, key))
        .cloned()
        .collect()
}

/// `key` with its `from` prefix swapped for `to`.
pub(crate) fn rebase(key: &str, from: &str, to: &str) -> String {
    if key == from {
        return to.to_string();
    }
    let rest = &key[from.len()..];
    if from.is_empty() {
        format!("{to}/{rest}")
    } else {
        format!("{to}{rest}")
    }
}

/// The virtual path for a stored key.
pub(crate) fn path_for(scheme: &str, key: &str, is_dir: bool) -> VirtualPath {
    if is_dir {
        VirtualPath::new(scheme, &format!("{key}/"))
    } else {
        VirtualPath::new(scheme, key)
    }
}
