use crate::source::CatalogSource;
use parking_lot::RwLock;
use quorum_core::{Category, Provider, QuorumError, QuorumResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Validated, read-only index over one catalog snapshot.
///
/// Built once per snapshot and shared as an `Arc`; orchestration never
/// mutates it. Validation rejects duplicate ids, dangling or
/// cross-category failover references, and dependency cycles.
#[derive(Debug)]
pub struct ProviderIndex {
    providers: HashMap<String, Provider>,
    by_category: HashMap<Category, Vec<String>>,
}

impl ProviderIndex {
    /// Build and validate an index from a provider snapshot.
    pub fn build(snapshot: Vec<Provider>) -> QuorumResult<Self> {
        let mut providers: HashMap<String, Provider> = HashMap::new();
        for provider in snapshot {
            if providers.contains_key(&provider.id) {
                return Err(QuorumError::Catalog(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
            providers.insert(provider.id.clone(), provider);
        }

        for provider in providers.values() {
            for alt_id in &provider.failover_chain {
                if *alt_id == provider.id {
                    return Err(QuorumError::Catalog(format!(
                        "provider {} lists itself in its failover chain",
                        provider.id
                    )));
                }
                match providers.get(alt_id) {
                    None => {
                        return Err(QuorumError::Catalog(format!(
                            "provider {} has unknown failover entry {}",
                            provider.id, alt_id
                        )));
                    }
                    Some(alt) if alt.category != provider.category => {
                        return Err(QuorumError::Catalog(format!(
                            "failover entry {} is not in category {}",
                            alt_id, provider.category
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        detect_cycles(&providers)?;

        let mut by_category: HashMap<Category, Vec<String>> = HashMap::new();
        for provider in providers.values() {
            by_category
                .entry(provider.category)
                .or_default()
                .push(provider.id.clone());
        }
        // Deterministic lookup order regardless of snapshot order.
        for ids in by_category.values_mut() {
            ids.sort();
        }

        info!(providers = providers.len(), "Provider index built");

        Ok(Self {
            providers,
            by_category,
        })
    }

    /// All providers in the given category.
    ///
    /// Returns `UnknownCategory` when no provider matches; callers that can
    /// degrade gracefully treat that as an empty candidate set.
    pub fn find_by_category(&self, category: Category) -> QuorumResult<Vec<Provider>> {
        let ids = self
            .by_category
            .get(&category)
            .ok_or_else(|| QuorumError::UnknownCategory(category.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| self.providers.get(id).cloned())
            .collect())
    }

    /// Look up one provider by id.
    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.get(id)
    }

    /// Number of providers in the index.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the index holds no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Reject dependency cycles with a tri-color depth-first search.
/// Dependencies on ids absent from the catalog are external inputs and skipped.
fn detect_cycles(providers: &HashMap<String, Provider>) -> QuorumResult<()> {
    let mut visited: HashMap<&str, u8> = HashMap::new();
    for id in providers.keys() {
        if dfs_cycle(id, providers, &mut visited) {
            return Err(QuorumError::DependencyCycle(format!(
                "cycle reachable from provider {id}"
            )));
        }
    }
    Ok(())
}

fn dfs_cycle<'a>(
    id: &'a str,
    providers: &'a HashMap<String, Provider>,
    visited: &mut HashMap<&'a str, u8>,
) -> bool {
    match visited.get(id) {
        Some(1) => return true,  // back edge = cycle
        Some(2) => return false, // already processed
        _ => {}
    }
    visited.insert(id, 1);
    if let Some(provider) = providers.get(id) {
        for dep in &provider.dependencies {
            if providers.contains_key(dep.as_str()) && dfs_cycle(dep, providers, visited) {
                return true;
            }
        }
    }
    visited.insert(id, 2);
    false
}

/// Handle for administrative whole-index replacement.
///
/// Orchestration calls `load()` once and work against that snapshot for
/// their whole lifetime; `replace()` swaps the index without partial-update
/// races.
pub struct SharedIndex {
    inner: RwLock<Arc<ProviderIndex>>,
}

impl SharedIndex {
    /// Wrap an initial index.
    pub fn new(index: ProviderIndex) -> Self {
        Self {
            inner: RwLock::new(Arc::new(index)),
        }
    }

    /// Get the current index snapshot.
    pub fn load(&self) -> Arc<ProviderIndex> {
        Arc::clone(&self.inner.read())
    }

    /// Swap in a replacement index.
    pub fn replace(&self, index: ProviderIndex) {
        *self.inner.write() = Arc::new(index);
    }

    /// Rebuild the index from a catalog source and swap it in.
    pub fn refresh_from(&self, source: &dyn CatalogSource) -> QuorumResult<()> {
        let index = ProviderIndex::build(source.snapshot()?)?;
        self.replace(index);
        Ok(())
    }
}
