use serde::{Deserialize, Serialize};

/// The category of work a capability provider performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Probes hosts, ports, and services over the network.
    NetworkScan,
    /// Searches text corpora or document stores.
    TextSearch,
    /// Analyzes source code without executing it.
    StaticAnalysis,
    /// Detects leaked credentials and secrets.
    SecretScan,
    /// Audits third-party dependencies for known issues.
    DependencyAudit,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::NetworkScan => write!(f, "network-scan"),
            Category::TextSearch => write!(f, "text-search"),
            Category::StaticAnalysis => write!(f, "static-analysis"),
            Category::SecretScan => write!(f, "secret-scan"),
            Category::DependencyAudit => write!(f, "dependency-audit"),
        }
    }
}

/// Immutable description of a capability provider, as published by the catalog.
///
/// The orchestrator never mutates providers; catalog changes happen by
/// rebuilding and swapping the whole index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Unique identifier, referenced by dependencies and failover chains.
    pub id: String,
    /// The kind of work this provider performs.
    pub category: Category,
    /// Provider ids whose output must be available before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Ordered substitutes (same category) tried when this provider fails.
    #[serde(default)]
    pub failover_chain: Vec<String>,
    /// Relative cost prior, consulted only before empirical data exists.
    #[serde(default)]
    pub cost_estimate: f64,
    /// Latency prior in milliseconds, consulted only before empirical data exists.
    #[serde(default)]
    pub expected_latency_ms: u64,
}

impl Provider {
    /// Create a provider with no dependencies, no failover chain, and zero priors.
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            dependencies: Vec::new(),
            failover_chain: Vec::new(),
            cost_estimate: 0.0,
            expected_latency_ms: 0,
        }
    }

    /// Set the provider ids this one depends on.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the ordered failover chain for this provider.
    pub fn with_failover<I, S>(mut self, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failover_chain = chain.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cost prior.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_estimate = cost;
        self
    }

    /// Set the expected latency prior in milliseconds.
    pub fn with_expected_latency(mut self, ms: u64) -> Self {
        self.expected_latency_ms = ms;
        self
    }

    /// Whether this provider can run without upstream input.
    pub fn is_independent(&self) -> bool {
        self.dependencies.is_empty()
    }
}
