//! Volume providers: named factories that turn a [`VolumeConfig`] into a
//! mounted-ready [`Volume`].
//!
//! The registry is how configuration files refer to volume kinds. Built-in
//! providers cover physical directories and in-memory scratch space; hosts
//! register their own for anything else.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use svfs_types::{VfsError, VfsResult};

use crate::config::VolumeConfig;
use crate::memory::MemoryVolume;
use crate::physical::{PhysicalOptions, PhysicalVolume};
use crate::traits::VolumeInfo;
use crate::volume::Volume;

#[async_trait]
pub trait VolumeProvider: Send + Sync {
    /// Name used in configuration (`provider = "..."`).
    fn name(&self) -> &str;

    async fn create(&self, config: &VolumeConfig) -> VfsResult<Arc<Volume>>;
}

/// Watched OS directories. Requires `root`.
#[derive(Debug, Default)]
pub struct PhysicalProvider;

#[async_trait]
impl VolumeProvider for PhysicalProvider {
    fn name(&self) -> &str {
        "physical"
    }

    async fn create(&self, config: &VolumeConfig) -> VfsResult<Arc<Volume>> {
        let root = config.root.as_ref().ok_or_else(|| {
            VfsError::InvalidOperation(format!(
                "physical volume '{}' needs a root directory",
                config.scheme
            ))
        })?;
        let options = PhysicalOptions {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            watch: config.watch,
        };
        let volume = PhysicalVolume::open(&config.scheme, root, options).await?;
        Ok(Volume::new(volume))
    }
}

/// Empty in-memory volumes.
#[derive(Debug, Default)]
pub struct MemoryProvider;

#[async_trait]
impl VolumeProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, config: &VolumeConfig) -> VfsResult<Arc<Volume>> {
        let info = VolumeInfo::new(
            config.id.clone().unwrap_or_else(VolumeInfo::generate_id),
            config.scheme.clone(),
            config
                .display_name
                .clone()
                .unwrap_or_else(|| config.scheme.clone()),
            "memory",
        );
        Ok(Volume::new(MemoryVolume::with_info(info)))
    }
}

/// Providers by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn VolumeProvider>>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `physical` and `memory` providers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(PhysicalProvider));
        registry.register(Arc::new(MemoryProvider));
        registry
    }

    /// Register `provider`, replacing any provider with the same name.
    pub fn register(&self, provider: Arc<dyn VolumeProvider>) {
        let name = provider.name().to_ascii_lowercase();
        let replaced = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), provider);
        if replaced.is_some() {
            tracing::debug!(provider = %name, "replaced volume provider");
        }
    }

    pub fn get(&self, name: &str) -> VfsResult<Arc<dyn VolumeProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| VfsError::UnknownProvider(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
