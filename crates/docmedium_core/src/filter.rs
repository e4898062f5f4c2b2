//! Document filters known to the medium.

use std::collections::BTreeMap;
use std::sync::Arc;

/// A document format the medium can be opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Unique filter name.
    pub name: String,
    /// Media type recorded on transfers.
    pub media_type: Option<String>,
    /// Documents of this filter are always opened read-only.
    pub open_read_only: bool,
}

impl Filter {
    /// Creates a writable filter.
    #[must_use]
    pub fn new(name: &str, media_type: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            media_type: media_type.map(str::to_string),
            open_read_only: false,
        }
    }

    /// Marks the filter read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.open_read_only = true;
        self
    }
}

/// Filters by name.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Arc<Filter>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter, replacing one of the same name.
    #[must_use]
    pub fn with(mut self, filter: Filter) -> Self {
        self.filters.insert(filter.name.clone(), Arc::new(filter));
        self
    }

    /// Looks up a filter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Filter>> {
        self.filters.get(name).cloned()
    }
}
