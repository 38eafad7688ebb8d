use crate::plan::ExecutionPlan;
use crate::reasoner::AdvisoryReasoner;
use crate::types::{Selection, SelectionRequest, Strategy};
use quorum_catalog::{PerformanceLedger, ProviderIndex};
use quorum_core::{Provider, QuorumError, QuorumResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Floor applied to cost estimates so zero-cost providers rank first
/// without dividing by zero.
const COST_FLOOR: f64 = 0.05;

/// Tuning knobs for the selector.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Budget for one advisory reasoner call.
    pub reasoner_timeout: Duration,
    /// How many top candidates are offered to the reasoner for re-ranking.
    pub advisory_top_k: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            reasoner_timeout: Duration::from_secs(3),
            advisory_top_k: 8,
        }
    }
}

struct ScoredCandidate {
    provider: Provider,
    score: f64,
}

/// Produces a ranked, bounded candidate set and its execution plan.
///
/// Ranking follows the requested [`Strategy`] over ledger statistics (or
/// catalog priors for cold providers). An advisory reasoner, when present,
/// may adjust the ranking but never the `max_providers` bound, and its
/// failure always falls back to pure scoring.
pub struct CapabilitySelector {
    index: Arc<ProviderIndex>,
    ledger: Arc<PerformanceLedger>,
    reasoner: Option<Arc<dyn AdvisoryReasoner>>,
    config: SelectorConfig,
}

impl CapabilitySelector {
    /// Create a selector with no reasoner and default config.
    pub fn new(index: Arc<ProviderIndex>, ledger: Arc<PerformanceLedger>) -> Self {
        Self {
            index,
            ledger,
            reasoner: None,
            config: SelectorConfig::default(),
        }
    }

    /// Attach an advisory reasoner.
    pub fn with_reasoner(mut self, reasoner: Arc<dyn AdvisoryReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Override the default config.
    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Select providers for the request and lay them out as an execution plan.
    ///
    /// An unsupported category yields an empty selection, not an error; the
    /// caller decides whether that is fatal.
    pub async fn select(&self, request: &SelectionRequest) -> QuorumResult<Selection> {
        let candidates = match self.index.find_by_category(request.category) {
            Ok(providers) => providers,
            Err(QuorumError::UnknownCategory(category)) => {
                info!(category = %category, "Category unsupported by catalog");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if candidates.is_empty() || request.max_providers == 0 {
            return Ok(Selection {
                candidates: Vec::new(),
                plan: ExecutionPlan::empty(),
                confidence: 0.0,
                truncated: false,
            });
        }

        let mut scored = self.score(&candidates, request.strategy);
        sort_scored(&mut scored);
        self.apply_advisory(&mut scored, &request.description).await;
        sort_scored(&mut scored);

        let picked: Vec<Provider> = match request.strategy {
            Strategy::Comprehensive => diversity_pick(&scored, request.max_providers),
            _ => scored
                .iter()
                .take(request.max_providers)
                .map(|s| s.provider.clone())
                .collect(),
        };

        let (selected, truncated) = self.complete_chains(&picked, request.max_providers)?;
        let confidence = self.selection_confidence(&selected, truncated);
        let plan = ExecutionPlan::layered(selected.clone())?;

        info!(
            category = %request.category,
            strategy = %request.strategy,
            selected = selected.len(),
            stages = plan.stage_count(),
            confidence,
            "Selection complete"
        );

        Ok(Selection {
            candidates: selected,
            plan,
            confidence,
            truncated,
        })
    }

    fn score(&self, candidates: &[Provider], strategy: Strategy) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|provider| {
                let snap = self.ledger.snapshot(provider);
                let score = match strategy {
                    Strategy::Reliable => snap.success_rate + snap.quality_score / 1_000.0,
                    Strategy::Efficient => 1.0 / (1.0 + snap.avg_latency_ms / 1_000.0),
                    Strategy::CostOptimized => {
                        snap.quality_score / provider.cost_estimate.max(COST_FLOOR)
                    }
                    Strategy::Comprehensive => {
                        0.5 * snap.success_rate + 0.5 * snap.quality_score
                    }
                };
                ScoredCandidate {
                    provider: provider.clone(),
                    score,
                }
            })
            .collect();

        // Cost ratios are unbounded; normalize so advisory scores blend on
        // the same scale.
        if strategy == Strategy::CostOptimized {
            let max = scored.iter().map(|s| s.score).fold(0.0_f64, f64::max);
            if max > 0.0 {
                for entry in &mut scored {
                    entry.score /= max;
                }
            }
        }

        scored
    }

    /// Blend advisory scores into the ranking. Advisory only: unknown ids
    /// and out-of-range scores are discarded, and any reasoner failure
    /// leaves the rule-based scores untouched.
    async fn apply_advisory(&self, scored: &mut [ScoredCandidate], task: &str) {
        let reasoner = match &self.reasoner {
            Some(reasoner) => Arc::clone(reasoner),
            None => return,
        };

        let k = scored.len().min(self.config.advisory_top_k);
        let top: Vec<Provider> = scored[..k].iter().map(|s| s.provider.clone()).collect();

        match tokio::time::timeout(self.config.reasoner_timeout, reasoner.rank(&top, task)).await
        {
            Ok(Ok(rankings)) => {
                let mut applied = 0usize;
                for ranking in rankings {
                    if !ranking.score.is_finite() || !(0.0..=1.0).contains(&ranking.score) {
                        warn!(
                            provider = %ranking.provider_id,
                            score = ranking.score,
                            "Discarding out-of-range advisory score"
                        );
                        continue;
                    }
                    match scored
                        .iter_mut()
                        .find(|s| s.provider.id == ranking.provider_id)
                    {
                        Some(entry) => {
                            entry.score = 0.5 * entry.score + 0.5 * ranking.score;
                            applied += 1;
                        }
                        None => {
                            warn!(
                                provider = %ranking.provider_id,
                                "Advisory ranking references unknown provider"
                            );
                        }
                    }
                }
                debug!(applied, "Advisory rankings applied");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Advisory reasoner failed; using rule-based scoring");
            }
            Err(_) => {
                warn!("Advisory reasoner timed out; using rule-based scoring");
            }
        }
    }

    /// Grow each picked provider into its full upstream dependency chain,
    /// in rank order, without exceeding `max` total providers.
    ///
    /// A candidate whose chain does not fit is skipped in favor of later,
    /// smaller candidates. If not even the top candidate's chain fits, its
    /// upstream-first prefix is returned instead, flagged as truncated — a
    /// mid-chain dependency is never dropped while a downstream provider is
    /// kept.
    fn complete_chains(
        &self,
        picked: &[Provider],
        max: usize,
    ) -> QuorumResult<(Vec<Provider>, bool)> {
        let mut selected: Vec<Provider> = Vec::new();
        let mut selected_ids: HashSet<String> = HashSet::new();

        for candidate in picked {
            let chain = self.dependency_chain(candidate);
            let additions: Vec<Provider> = chain
                .into_iter()
                .filter(|p| !selected_ids.contains(&p.id))
                .collect();
            if selected.len() + additions.len() <= max {
                for provider in additions {
                    selected_ids.insert(provider.id.clone());
                    selected.push(provider);
                }
            } else {
                debug!(
                    provider = %candidate.id,
                    "Skipping candidate: dependency chain exceeds provider budget"
                );
            }
        }

        if selected.is_empty() {
            if let Some(top) = picked.first() {
                let layered = ExecutionPlan::layered(self.dependency_chain(top))?;
                let mut capped: Vec<Provider> = layered
                    .stages
                    .into_iter()
                    .flat_map(|stage| stage.providers)
                    .collect();
                capped.truncate(max);
                warn!(
                    provider = %top.id,
                    kept = capped.len(),
                    "Dependency chain truncated to provider budget"
                );
                return Ok((capped, true));
            }
        }

        Ok((selected, false))
    }

    /// The provider plus its transitive in-catalog dependencies, upstream
    /// first.
    fn dependency_chain(&self, provider: &Provider) -> Vec<Provider> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        self.collect_chain(provider, &mut seen, &mut chain);
        chain
    }

    fn collect_chain(
        &self,
        provider: &Provider,
        seen: &mut HashSet<String>,
        out: &mut Vec<Provider>,
    ) {
        if !seen.insert(provider.id.clone()) {
            return;
        }
        for dep in &provider.dependencies {
            if let Some(dep_provider) = self.index.get(dep) {
                self.collect_chain(dep_provider, seen, out);
            }
        }
        out.push(provider.clone());
    }

    fn selection_confidence(&self, selected: &[Provider], truncated: bool) -> f64 {
        if selected.is_empty() {
            return 0.0;
        }
        let mean: f64 = selected
            .iter()
            .map(|p| self.ledger.snapshot(p).success_rate)
            .sum::<f64>()
            / selected.len() as f64;
        if truncated {
            mean * 0.5
        } else {
            mean
        }
    }
}

fn sort_scored(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.provider.id.cmp(&b.provider.id))
    });
}

/// Greedy pick that treats failover siblings as the same sub-capability:
/// a candidate in an already-picked provider's chain (or vice versa) is
/// passed over while better-diversified options remain, then used to fill
/// leftover slots.
fn diversity_pick(scored: &[ScoredCandidate], max: usize) -> Vec<Provider> {
    let mut picked: Vec<Provider> = Vec::new();
    let mut passed_over: Vec<&Provider> = Vec::new();

    for entry in scored {
        if picked.len() == max {
            break;
        }
        let sibling = picked.iter().any(|p| {
            p.failover_chain.contains(&entry.provider.id)
                || entry.provider.failover_chain.contains(&p.id)
        });
        if sibling {
            passed_over.push(&entry.provider);
        } else {
            picked.push(entry.provider.clone());
        }
    }

    for provider in passed_over {
        if picked.len() == max {
            break;
        }
        picked.push(provider.clone());
    }

    picked
}
