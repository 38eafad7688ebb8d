use crate::plan::ExecutionPlan;
use quorum_core::{Category, Provider, ProviderResult};
use serde::{Deserialize, Serialize};

/// How the selector ranks and bounds candidate providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Maximize coverage: prefer diverse providers over top individual scores.
    Comprehensive,
    /// Minimize expected latency: prefer fewer, faster providers.
    Efficient,
    /// Sort purely by success rate, tie-broken by quality.
    Reliable,
    /// Sort by quality per unit cost, preferring zero/low-cost providers.
    CostOptimized,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Comprehensive => write!(f, "comprehensive"),
            Strategy::Efficient => write!(f, "efficient"),
            Strategy::Reliable => write!(f, "reliable"),
            Strategy::CostOptimized => write!(f, "cost_optimized"),
        }
    }
}

/// A request for the selector: what to do and under which constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    /// Category of capability required.
    pub category: Category,
    /// Human-readable task description, passed to providers and the reasoner.
    pub description: String,
    /// Ranking strategy.
    pub strategy: Strategy,
    /// Hard upper bound on selected providers.
    pub max_providers: usize,
}

impl SelectionRequest {
    /// Create a request.
    pub fn new(
        category: Category,
        description: impl Into<String>,
        strategy: Strategy,
        max_providers: usize,
    ) -> Self {
        Self {
            category,
            description: description.into(),
            strategy,
            max_providers,
        }
    }
}

/// The selector's output: a bounded candidate set and its execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    /// Selected providers, dependency chains included.
    pub candidates: Vec<Provider>,
    /// Topologically layered execution plan over `candidates`.
    pub plan: ExecutionPlan,
    /// Selector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether a dependency chain had to be cut to fit `max_providers`.
    pub truncated: bool,
}

/// Lifecycle of one plan stage during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not yet reached.
    Pending,
    /// Providers in flight.
    Running,
    /// All providers reached a terminal state.
    Completed,
    /// Skipped because the overall deadline passed first.
    Cancelled,
}

/// Overall shape of an aggregated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStatus {
    /// Every attempted provider contributed.
    Complete,
    /// Some providers failed or were cancelled, but output was produced.
    Partial,
    /// Execution ran but nothing succeeded.
    NoResults,
    /// No provider was available for the requested category.
    NoCapability,
}

/// Two providers made mutually exclusive claims about the same subject.
///
/// The losing claim is retained here rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// What the claims are about.
    pub subject: String,
    /// The claim kept in the synthesis.
    pub accepted_claim: String,
    /// Provider whose claim was kept.
    pub accepted_provider: String,
    /// The claim excluded from the synthesis.
    pub rejected_claim: String,
    /// Provider whose claim was rejected.
    pub rejected_provider: String,
}

/// A near-duplicate output discarded during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateNote {
    /// Provider whose (higher-confidence) output was kept.
    pub kept_provider: String,
    /// Provider whose output was discarded.
    pub discarded_provider: String,
    /// Measured similarity between the two outputs.
    pub similarity: f64,
}

/// The orchestrator's final answer for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Overall shape of the answer.
    pub status: AggregationStatus,
    /// Merged, conflict-resolved output text.
    pub synthesized_output: String,
    /// Every invocation attempt, for provenance.
    pub per_provider_results: Vec<ProviderResult>,
    /// Contradictions detected between providers, with their resolutions.
    pub conflicts: Vec<Conflict>,
    /// Near-duplicate outputs discarded during merging.
    pub duplicates: Vec<DuplicateNote>,
    /// Deduplicated insights, ranked by source confidence.
    pub insights: Vec<String>,
    /// Deduplicated recommendations, ranked by source confidence.
    pub recommendations: Vec<String>,
    /// Combined confidence in `[0, 1]`; zero when nothing succeeded.
    pub overall_confidence: f64,
}

impl AggregatedResult {
    /// The degraded answer returned when no provider covers a category.
    pub fn no_capability(category: Category) -> Self {
        Self {
            status: AggregationStatus::NoCapability,
            synthesized_output: format!("No capability provider available for category {category}"),
            per_provider_results: Vec::new(),
            conflicts: Vec::new(),
            duplicates: Vec::new(),
            insights: Vec::new(),
            recommendations: Vec::new(),
            overall_confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serialization() {
        let json = serde_json::to_string(&Strategy::CostOptimized).unwrap();
        assert_eq!(json, "\"cost_optimized\"");
        let parsed: Strategy = serde_json::from_str("\"reliable\"").unwrap();
        assert_eq!(parsed, Strategy::Reliable);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::Comprehensive.to_string(), "comprehensive");
        assert_eq!(Strategy::CostOptimized.to_string(), "cost_optimized");
    }

    #[test]
    fn test_no_capability_result() {
        let result = AggregatedResult::no_capability(Category::SecretScan);
        assert_eq!(result.status, AggregationStatus::NoCapability);
        assert_eq!(result.overall_confidence, 0.0);
        assert!(result.synthesized_output.contains("secret-scan"));
        assert!(result.per_provider_results.is_empty());
    }

    #[test]
    fn test_aggregated_result_serialization() {
        let result = AggregatedResult {
            status: AggregationStatus::Partial,
            synthesized_output: "merged".to_string(),
            per_provider_results: Vec::new(),
            conflicts: vec![Conflict {
                subject: "tls".to_string(),
                accepted_claim: "enabled".to_string(),
                accepted_provider: "a".to_string(),
                rejected_claim: "disabled".to_string(),
                rejected_provider: "b".to_string(),
            }],
            duplicates: Vec::new(),
            insights: vec!["one insight".to_string()],
            recommendations: Vec::new(),
            overall_confidence: 0.4,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"partial\""));
        let parsed: AggregatedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.conflicts.len(), 1);
        assert_eq!(parsed.conflicts[0].rejected_provider, "b");
    }
}
