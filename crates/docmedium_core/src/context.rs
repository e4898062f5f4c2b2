//! Collaborators shared by media.

use crate::config::Config;
use crate::filter::FilterRegistry;
use crate::interaction::InteractionHandler;
use crate::temp::TempFileAllocator;
use docmedium_storage::{ContentBroker, PackageStorageFactory, StorageFactory};
use std::fmt;
use std::sync::Arc;

/// Everything a medium needs besides its own arguments.
///
/// Cloning is cheap; media created from clones share providers.
#[derive(Clone)]
pub struct MediumContext {
    /// Configuration.
    pub config: Arc<Config>,
    /// Content providers.
    pub content: ContentBroker,
    /// Storage factory.
    pub storages: Arc<dyn StorageFactory>,
    /// Temp file allocation.
    pub temp: TempFileAllocator,
    /// Known filters.
    pub filters: FilterRegistry,
    /// Handler used when the caller supplies none.
    pub default_interaction: Option<Arc<dyn InteractionHandler>>,
}

impl MediumContext {
    /// Creates a context for local files and package storages.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let temp = TempFileAllocator::new(config.temp_dir.clone());
        let storages = match &config.temp_dir {
            Some(dir) => PackageStorageFactory::new().with_spill_dir(dir.clone()),
            None => PackageStorageFactory::new(),
        };
        Self {
            config: Arc::new(config),
            content: ContentBroker::with_local_files(),
            storages: Arc::new(storages),
            temp,
            filters: FilterRegistry::new(),
            default_interaction: None,
        }
    }

    /// Replaces the content broker.
    #[must_use]
    pub fn with_content(mut self, content: ContentBroker) -> Self {
        self.content = content;
        self
    }

    /// Replaces the storage factory.
    #[must_use]
    pub fn with_storages(mut self, storages: Arc<dyn StorageFactory>) -> Self {
        self.storages = storages;
        self
    }

    /// Replaces the filter registry.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the default interaction handler.
    #[must_use]
    pub fn with_default_interaction(mut self, handler: Arc<dyn InteractionHandler>) -> Self {
        self.default_interaction = Some(handler);
        self
    }
}

impl Default for MediumContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for MediumContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediumContext")
            .field("config", &self.config)
            .field("content", &self.content)
            .field("storages", &self.storages)
            .field("temp", &self.temp)
            .field("default_interaction", &self.default_interaction.is_some())
            .finish_non_exhaustive()
    }
}
