use async_trait::async_trait;
use quorum_core::{Provider, ProviderResult, QuorumResult};
use serde::{Deserialize, Serialize};

/// One advisory ranking entry for a candidate provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The candidate being ranked.
    pub provider_id: String,
    /// Advisory score in `[0, 1]`; entries outside that range are discarded.
    pub score: f64,
    /// Free-form explanation of the ranking.
    pub rationale: String,
}

/// Optional external recommender and synthesizer.
///
/// Purely advisory: callers wrap every call in a timeout and fall back to
/// rule-based behavior when the reasoner is absent, slow, erroring, or
/// returns malformed output. Nothing in the orchestrator hard-depends on an
/// implementation existing.
#[async_trait]
pub trait AdvisoryReasoner: Send + Sync {
    /// Re-rank candidate providers for the given task.
    async fn rank(
        &self,
        candidates: &[Provider],
        task_description: &str,
    ) -> QuorumResult<Vec<RankedCandidate>>;

    /// Produce a prose synthesis of successful results, weighted toward
    /// higher-confidence inputs.
    async fn synthesize(
        &self,
        results: &[ProviderResult],
        task_description: &str,
    ) -> QuorumResult<String>;
}
