//! Pure data types for svfs: virtual paths, capability flags, change events.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists so
//! that collaborators (content browsers, asset pipelines, project files) can name
//! virtual paths and react to change events without pulling in svfs-core.

pub mod access;
pub mod error;
pub mod event;
pub mod metadata;
pub mod path;

// Flat re-exports for convenience
pub use access::*;
pub use error::*;
pub use event::*;
pub use metadata::*;
pub use path::*;
