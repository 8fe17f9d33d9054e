//! svfs-core: the scheme-routed virtual file system.
//!
//! This crate provides:
//!
//! - **Capability traits**: `VolumeFetch`, `VolumeRead`, `VolumeWrite`, `VolumeWatch`
//! - **Volume**: a backend plus the access flags derived from the traits it implements
//! - **Entries**: stateless file/directory handles that delegate to their volume
//! - **Walk**: lazy depth-first traversal shared by every volume
//! - **Volumes**: `PhysicalVolume` (watched OS directory), `MemoryVolume`, `ImageVolume`
//! - **Providers**: create volumes from `VolumeConfig`
//! - **VirtualFileSystem**: the scheme → volume dispatcher
//!
//! # Design
//!
//! Every virtual path carries a scheme, and every scheme maps to at most one
//! mounted volume:
//!
//! ```text
//! assets://Textures/hero.png   → PhysicalVolume(/home/amy/game/assets)
//! scratch://import/tmp.bin     → MemoryVolume
//! rom://maps/overworld.bin     → ImageVolume (read-only)
//! ```
//!
//! The dispatcher resolves the scheme, checks the volume grants the access the
//! operation needs, and forwards the call unchanged.

pub mod config;
pub mod entry;
pub mod events;
pub mod image;
pub mod memory;
mod naming;
pub mod physical;
pub mod provider;
pub mod router;
pub mod traits;
mod tree;
pub mod volume;
pub mod walk;

pub use config::{VfsConfig, VolumeConfig};
pub use entry::Entry;
pub use events::{EventHub, Subscription};
pub use image::{ImageVolume, ImageVolumeBuilder};
pub use memory::MemoryVolume;
pub use physical::{PhysicalOptions, PhysicalVolume};
pub use provider::{MemoryProvider, PhysicalProvider, ProviderRegistry, VolumeProvider};
pub use router::{MountRecord, VfsEvent, VirtualFileSystem};
pub use traits::{
    ChangeHandler, ReadStream, VolumeFetch, VolumeInfo, VolumeRead, VolumeWatch, VolumeWrite,
    WriteStream,
};
pub use volume::Volume;
pub use walk::{EntryStream, PathStream};

// Data types live in svfs-types; re-export them so most callers need one crate.
pub use svfs_types::{
    normalize, ChangeEvent, ChangeKind, EntryKind, Metadata, VfsError, VfsResult, VirtualPath,
    VolumeAccess,
};
