use quorum_core::{Provider, QuorumResult};
use std::path::Path;
use tracing::info;

/// A source of provider descriptions.
///
/// Implementations return a full snapshot; the index is rebuilt from the
/// snapshot and swapped atomically on refresh, so sources never see
/// partial updates.
pub trait CatalogSource: Send + Sync {
    /// Return the current full set of providers.
    fn snapshot(&self) -> QuorumResult<Vec<Provider>>;
}

/// An in-memory catalog, optionally loaded from a JSON array of providers.
pub struct StaticCatalog {
    providers: Vec<Provider>,
}

impl StaticCatalog {
    /// Create a catalog from an in-memory provider list.
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    /// Parse a catalog from a JSON array of provider objects.
    pub fn from_json(json: &str) -> QuorumResult<Self> {
        let providers: Vec<Provider> = serde_json::from_str(json)?;
        info!(providers = providers.len(), "Loaded catalog from JSON");
        Ok(Self { providers })
    }

    /// Load a catalog from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> QuorumResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

impl CatalogSource for StaticCatalog {
    fn snapshot(&self) -> QuorumResult<Vec<Provider>> {
        Ok(self.providers.clone())
    }
}
