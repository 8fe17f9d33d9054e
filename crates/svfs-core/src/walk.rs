//! Lazy recursive traversal built only on `VolumeFetch`.
//!
//! Order: depth-first. Directories are visited in pre-order, and a
//! directory's own files are yielded once all of its subdirectories have been
//! exhausted. For
//!
//! ```text
//! a.txt
//! sub1/x.txt
//! sub1/deep/y.txt
//! sub2/z.txt
//! ```
//!
//! files come out as `sub1/deep/y.txt, sub1/x.txt, sub2/z.txt, a.txt`.
//!
//! Nothing is fetched until the stream is polled, and each call starts a fresh
//! walk. The walk terminates as long as the store has no directory cycles.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use svfs_types::{VfsResult, VirtualPath};

use crate::entry::Entry;
use crate::traits::VolumeFetch;

/// Stream of paths produced by a walk.
pub type PathStream = BoxStream<'static, VfsResult<VirtualPath>>;

/// Stream of entry handles produced by a walk.
pub type EntryStream = BoxStream<'static, VfsResult<Entry>>;

struct Frame {
    files: Vec<VirtualPath>,
    subdirs: VecDeque<VirtualPath>,
}

struct WalkState {
    fetch: Arc<dyn VolumeFetch>,
    start: Option<VirtualPath>,
    stack: Vec<Frame>,
    ready: VecDeque<VirtualPath>,
    include_directories: bool,
}

async fn expand(fetch: &dyn VolumeFetch, dir: &VirtualPath) -> VfsResult<Frame> {
    let mut files = Vec::new();
    let mut subdirs = VecDeque::new();
    for child in fetch.entries(dir).await? {
        if child.is_directory() {
            subdirs.push_back(child);
        } else {
            files.push(child);
        }
    }
    Ok(Frame { files, subdirs })
}

/// Walk everything below `dir`.
///
/// With `include_directories` each subdirectory is yielded when it is
/// entered; `dir` itself is never yielded. An error ends the stream after it
/// has been yielded.
pub fn walk(fetch: Arc<dyn VolumeFetch>, dir: VirtualPath, include_directories: bool) -> PathStream {
    let state = WalkState {
        fetch,
        start: Some(dir),
        stack: Vec::new(),
        ready: VecDeque::new(),
        include_directories,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(next) = state.ready.pop_front() {
                return Ok(Some((next, state)));
            }

            if let Some(dir) = state.start.take() {
                let frame = expand(state.fetch.as_ref(), &dir).await?;
                state.stack.push(frame);
                continue;
            }

            let Some(top) = state.stack.last_mut() else {
                return Ok(None);
            };

            if let Some(subdir) = top.subdirs.pop_front() {
                let frame = expand(state.fetch.as_ref(), &subdir).await?;
                if state.include_directories {
                    state.ready.push_back(subdir);
                }
                state.stack.push(frame);
            } else if let Some(done) = state.stack.pop() {
                state.ready.extend(done.files);
            }
        }
    })
    .boxed()
}

/// Every file below `dir`.
pub fn files_recursive(fetch: Arc<dyn VolumeFetch>, dir: VirtualPath) -> PathStream {
    walk(fetch, dir, false)
}

/// Every file and directory below `dir`.
pub fn entries_recursive(fetch: Arc<dyn VolumeFetch>, dir: VirtualPath) -> PathStream {
    walk(fetch, dir, true)
}
