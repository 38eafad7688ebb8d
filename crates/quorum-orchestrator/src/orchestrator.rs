use crate::engine::{EngineConfig, ExecutionEngine};
use crate::invoker::CapabilityInvoker;
use crate::reasoner::AdvisoryReasoner;
use crate::reconcile::{Reconciler, ReconcilerConfig};
use crate::selector::{CapabilitySelector, SelectorConfig};
use crate::types::{AggregatedResult, SelectionRequest, Strategy};
use quorum_catalog::{CatalogSource, PerformanceLedger, ProviderIndex, SharedIndex};
use quorum_core::{Category, QuorumResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// One orchestration call: what to do, how to rank providers, and the
/// bounds to respect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    /// Category of capability required.
    pub category: Category,
    /// Human-readable task description.
    pub description: String,
    /// Ranking strategy.
    pub strategy: Strategy,
    /// Hard upper bound on selected providers.
    pub max_providers: usize,
    /// Overall wall-clock budget for the whole call.
    pub deadline: Duration,
}

/// The single entry point: selection, staged execution, and reconciliation
/// wired together with shared catalog and ledger state.
///
/// The performance ledger lives as long as the orchestrator and is shared
/// by every concurrent `run` call; everything else is per-call state.
pub struct Orchestrator {
    catalog: Arc<SharedIndex>,
    ledger: Arc<PerformanceLedger>,
    invoker: Arc<dyn CapabilityInvoker>,
    reasoner: Option<Arc<dyn AdvisoryReasoner>>,
    selector_config: SelectorConfig,
    engine_config: EngineConfig,
    reconciler_config: ReconcilerConfig,
}

impl Orchestrator {
    /// Build an orchestrator over a catalog source and an invoker, with
    /// default configs and no advisory reasoner.
    pub fn new(
        source: &dyn CatalogSource,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> QuorumResult<Self> {
        let index = ProviderIndex::build(source.snapshot()?)?;
        Ok(Self {
            catalog: Arc::new(SharedIndex::new(index)),
            ledger: Arc::new(PerformanceLedger::new()),
            invoker,
            reasoner: None,
            selector_config: SelectorConfig::default(),
            engine_config: EngineConfig::default(),
            reconciler_config: ReconcilerConfig::default(),
        })
    }

    /// Attach an advisory reasoner used for candidate re-ranking and prose
    /// synthesis. The orchestrator works without one.
    pub fn with_reasoner(mut self, reasoner: Arc<dyn AdvisoryReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Override the selector config.
    pub fn with_selector_config(mut self, config: SelectorConfig) -> Self {
        self.selector_config = config;
        self
    }

    /// Override the engine config.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Override the reconciler config.
    pub fn with_reconciler_config(mut self, config: ReconcilerConfig) -> Self {
        self.reconciler_config = config;
        self
    }

    /// The shared performance ledger.
    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        &self.ledger
    }

    /// The swap handle for administrative catalog replacement.
    pub fn catalog(&self) -> &Arc<SharedIndex> {
        &self.catalog
    }

    /// Run one orchestration: select providers, execute the plan, and
    /// reconcile the results.
    ///
    /// Always returns a structured [`AggregatedResult`]; degraded outcomes
    /// (no capability, nothing succeeded, deadline expiry) are encoded in
    /// its status and confidence rather than surfaced as errors.
    pub async fn run(&self, request: OrchestrationRequest) -> QuorumResult<AggregatedResult> {
        let run_id = Uuid::new_v4();
        let index = self.catalog.load();

        info!(
            run = %run_id,
            category = %request.category,
            strategy = %request.strategy,
            max_providers = request.max_providers,
            "Orchestration started"
        );

        let mut selector =
            CapabilitySelector::new(Arc::clone(&index), Arc::clone(&self.ledger))
                .with_config(self.selector_config.clone());
        if let Some(reasoner) = &self.reasoner {
            selector = selector.with_reasoner(Arc::clone(reasoner));
        }

        let selection_request = SelectionRequest::new(
            request.category,
            request.description.clone(),
            request.strategy,
            request.max_providers,
        );
        let selection = selector.select(&selection_request).await?;

        if selection.candidates.is_empty() {
            warn!(run = %run_id, category = %request.category, "No capability available");
            return Ok(AggregatedResult::no_capability(request.category));
        }

        info!(
            run = %run_id,
            providers = selection.candidates.len(),
            stages = selection.plan.stage_count(),
            confidence = selection.confidence,
            "Plan ready"
        );

        let engine = ExecutionEngine::new(
            Arc::clone(&self.invoker),
            Arc::clone(&index),
            Arc::clone(&self.ledger),
        )
        .with_config(self.engine_config.clone());

        let deadline = Instant::now() + request.deadline;
        let report = engine
            .execute(
                &selection.plan,
                Value::String(request.description.clone()),
                deadline,
            )
            .await;

        let mut reconciler = Reconciler::new(index, Arc::clone(&self.ledger))
            .with_config(self.reconciler_config.clone());
        if let Some(reasoner) = &self.reasoner {
            reconciler = reconciler.with_reasoner(Arc::clone(reasoner));
        }

        let aggregated = reconciler
            .aggregate(report.results, &request.description)
            .await;

        info!(
            run = %run_id,
            status = ?aggregated.status,
            conflicts = aggregated.conflicts.len(),
            confidence = aggregated.overall_confidence,
            "Orchestration complete"
        );

        Ok(aggregated)
    }
}
