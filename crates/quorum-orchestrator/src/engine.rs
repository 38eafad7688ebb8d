use crate::invoker::CapabilityInvoker;
use crate::plan::ExecutionPlan;
use crate::types::StageState;
use futures_util::future::join_all;
use quorum_catalog::{InvocationOutcome, PerformanceLedger, ProviderIndex};
use quorum_core::{FailureKind, Provider, ProviderResult, QuorumError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Tuning knobs for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-attempt timeout used when a provider has no override.
    pub default_timeout: Duration,
    /// Per-provider timeout overrides.
    pub timeout_overrides: HashMap<String, Duration>,
    /// Maximum concurrently running invocations within one execution.
    pub max_in_flight: usize,
    /// Extra window granted to in-flight attempts once the overall deadline
    /// passes, so cancellation stays cooperative.
    pub grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            timeout_overrides: HashMap::new(),
            max_in_flight: 8,
            grace: Duration::from_millis(250),
        }
    }
}

/// Everything one execution produced: every invocation attempt plus the
/// terminal state each stage reached.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Every attempt, including failed attempts recovered through failover.
    pub results: Vec<ProviderResult>,
    /// Terminal state per plan stage, in plan order.
    pub stage_states: Vec<StageState>,
}

/// Runs an execution plan: stages strictly in order, providers within a
/// stage concurrently, with per-attempt timeouts, automatic failover, and
/// cooperative deadline cancellation.
///
/// Stage outputs are merged by value into the next stage's input; no
/// mutable state is shared across invocations.
pub struct ExecutionEngine {
    invoker: Arc<dyn CapabilityInvoker>,
    index: Arc<ProviderIndex>,
    ledger: Arc<PerformanceLedger>,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine with the default config.
    pub fn new(
        invoker: Arc<dyn CapabilityInvoker>,
        index: Arc<ProviderIndex>,
        ledger: Arc<PerformanceLedger>,
    ) -> Self {
        Self {
            invoker,
            index,
            ledger,
            config: EngineConfig::default(),
        }
    }

    /// Override the default config.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute the plan against `input`, finishing by `deadline`.
    ///
    /// Never fails as a whole: each provider's outcome (including failover
    /// attempts and cancellations) is reported individually, and results
    /// completed before a deadline expiry are retained.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        input: Value,
        deadline: Instant,
    ) -> ExecutionReport {
        let mut results: Vec<ProviderResult> = Vec::new();
        let mut stage_states = vec![StageState::Pending; plan.stage_count()];
        // Logical slots that produced no output; their dependents cascade
        // to cancelled.
        let mut failed_slots: HashSet<String> = HashSet::new();
        let mut upstream = serde_json::Map::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));

        for (stage_idx, stage) in plan.stages.iter().enumerate() {
            if Instant::now() >= deadline {
                warn!(stage = stage_idx, "Deadline exceeded; cancelling remaining stages");
                for (later_idx, later) in plan.stages.iter().enumerate().skip(stage_idx) {
                    stage_states[later_idx] = StageState::Cancelled;
                    for provider in &later.providers {
                        results.push(ProviderResult::cancelled(
                            &provider.id,
                            FailureKind::DeadlineExceeded,
                        ));
                    }
                }
                break;
            }

            stage_states[stage_idx] = StageState::Running;
            debug!(
                stage = stage_idx,
                providers = stage.providers.len(),
                "Stage started"
            );

            // Each slot gets its own copy of the stage input.
            let stage_input = Value::Object(
                [
                    ("task".to_string(), input.clone()),
                    ("upstream".to_string(), Value::Object(upstream.clone())),
                ]
                .into_iter()
                .collect(),
            );

            let mut handles = Vec::new();
            for provider in &stage.providers {
                if provider
                    .dependencies
                    .iter()
                    .any(|dep| failed_slots.contains(dep))
                {
                    warn!(provider = %provider.id, "Upstream dependency failed; cancelling");
                    results.push(ProviderResult::cancelled(
                        &provider.id,
                        FailureKind::UpstreamFailed,
                    ));
                    failed_slots.insert(provider.id.clone());
                    continue;
                }

                let ctx = SlotContext {
                    chain: self.resolve_chain(provider),
                    input: stage_input.clone(),
                    deadline,
                    grace: self.config.grace,
                    invoker: Arc::clone(&self.invoker),
                    ledger: Arc::clone(&self.ledger),
                    semaphore: Arc::clone(&semaphore),
                };
                handles.push((provider.id.clone(), tokio::spawn(run_slot(ctx))));
            }

            let joined = join_all(
                handles
                    .into_iter()
                    .map(|(slot_id, handle)| async move { (slot_id, handle.await) }),
            )
            .await;

            for (slot_id, joined_result) in joined {
                match joined_result {
                    Ok(outcome) => {
                        results.extend(outcome.attempts);
                        match outcome.fulfilled {
                            Some((fulfilled_by, payload)) => {
                                let entry = Value::Object(
                                    [
                                        ("provider".to_string(), Value::String(fulfilled_by)),
                                        ("payload".to_string(), payload),
                                    ]
                                    .into_iter()
                                    .collect(),
                                );
                                upstream.insert(slot_id, entry);
                            }
                            None => {
                                failed_slots.insert(slot_id);
                            }
                        }
                    }
                    Err(e) => {
                        error!(provider = %slot_id, error = %e, "Slot task panicked");
                        results.push(ProviderResult::failure(&slot_id, FailureKind::Execution, 0));
                        failed_slots.insert(slot_id);
                    }
                }
            }

            stage_states[stage_idx] = StageState::Completed;
            debug!(stage = stage_idx, "Stage completed");
        }

        info!(
            attempts = results.len(),
            successes = results.iter().filter(|r| r.is_success()).count(),
            "Execution finished"
        );

        ExecutionReport {
            results,
            stage_states,
        }
    }

    /// The primary provider plus its resolved failover chain, each with its
    /// per-attempt timeout.
    fn resolve_chain(&self, provider: &Provider) -> Vec<(Provider, Duration)> {
        let mut chain = vec![(provider.clone(), self.attempt_timeout(provider))];
        for alt_id in &provider.failover_chain {
            match self.index.get(alt_id) {
                Some(alt) => chain.push((alt.clone(), self.attempt_timeout(alt))),
                None => {
                    warn!(
                        provider = %provider.id,
                        alternate = %alt_id,
                        "Failover entry missing from index"
                    );
                }
            }
        }
        chain
    }

    fn attempt_timeout(&self, provider: &Provider) -> Duration {
        self.config
            .timeout_overrides
            .get(&provider.id)
            .copied()
            .unwrap_or(self.config.default_timeout)
    }
}

struct SlotContext {
    chain: Vec<(Provider, Duration)>,
    input: Value,
    deadline: Instant,
    grace: Duration,
    invoker: Arc<dyn CapabilityInvoker>,
    ledger: Arc<PerformanceLedger>,
    semaphore: Arc<Semaphore>,
}

struct SlotOutcome {
    attempts: Vec<ProviderResult>,
    /// `(provider_id, payload)` of the chain entry that succeeded, if any.
    fulfilled: Option<(String, Value)>,
}

/// Run one logical slot: try the primary, then each failover entry in
/// order with the same input, until one succeeds or the chain is
/// exhausted. Every attempt is recorded in the ledger under its own id.
async fn run_slot(ctx: SlotContext) -> SlotOutcome {
    let _permit = match Arc::clone(&ctx.semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return SlotOutcome {
                attempts: Vec::new(),
                fulfilled: None,
            }
        }
    };

    let mut attempts = Vec::new();
    for (candidate, base_timeout) in &ctx.chain {
        let now = Instant::now();
        if now >= ctx.deadline {
            attempts.push(ProviderResult::cancelled(
                &candidate.id,
                FailureKind::DeadlineExceeded,
            ));
            break;
        }
        let remaining = ctx.deadline.saturating_duration_since(now) + ctx.grace;
        let budget = (*base_timeout).min(remaining);

        let start = Instant::now();
        let attempt = tokio::time::timeout(
            budget,
            ctx.invoker.invoke(&candidate.id, ctx.input.clone(), budget),
        )
        .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match attempt {
            Ok(Ok(invocation)) => {
                ctx.ledger.record(
                    &candidate.id,
                    InvocationOutcome::success(latency_ms).with_quality(invocation.confidence),
                );
                info!(provider = %candidate.id, latency_ms, "Invocation succeeded");
                attempts.push(ProviderResult::success(
                    &candidate.id,
                    invocation.payload.clone(),
                    latency_ms,
                    invocation.confidence,
                ));
                return SlotOutcome {
                    attempts,
                    fulfilled: Some((candidate.id.clone(), invocation.payload)),
                };
            }
            Ok(Err(e)) => {
                let kind = match &e {
                    QuorumError::ProviderTimeout(_) => FailureKind::Timeout,
                    _ => FailureKind::Execution,
                };
                ctx.ledger
                    .record(&candidate.id, InvocationOutcome::failure(latency_ms));
                warn!(
                    provider = %candidate.id,
                    error = %e,
                    "Invocation failed; consulting failover chain"
                );
                attempts.push(ProviderResult::failure(&candidate.id, kind, latency_ms));
            }
            Err(_) => {
                ctx.ledger
                    .record(&candidate.id, InvocationOutcome::failure(latency_ms));
                warn!(
                    provider = %candidate.id,
                    budget_ms = budget.as_millis() as u64,
                    "Invocation timed out; consulting failover chain"
                );
                attempts.push(ProviderResult::failure(
                    &candidate.id,
                    FailureKind::Timeout,
                    latency_ms,
                ));
            }
        }
    }

    SlotOutcome {
        attempts,
        fulfilled: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::Invocation;
    use crate::plan::Stage;
    use async_trait::async_trait;
    use quorum_core::{Category, InvocationStatus, QuorumResult};
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted invoker: fails listed providers, sleeps where told, and
    /// records every invocation it receives.
    struct ScriptedInvoker {
        failing: HashSet<String>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedInvoker {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
                delays: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, ids: &[&str]) -> Self {
            self.failing = ids.iter().map(|s| (*s).to_string()).collect();
            self
        }

        fn delay(mut self, id: &str, delay: Duration) -> Self {
            self.delays.insert(id.to_string(), delay);
            self
        }

        fn invoked_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| id.clone())
                .collect()
        }

        fn input_for(&self, id: &str) -> Option<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(call_id, _)| call_id == id)
                .map(|(_, input)| input.clone())
        }
    }

    #[async_trait]
    impl CapabilityInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            provider_id: &str,
            input: Value,
            _timeout: Duration,
        ) -> QuorumResult<Invocation> {
            self.calls
                .lock()
                .unwrap()
                .push((provider_id.to_string(), input));
            if let Some(delay) = self.delays.get(provider_id) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.contains(provider_id) {
                return Err(QuorumError::ProviderExecution(format!(
                    "{provider_id} exploded"
                )));
            }
            Ok(Invocation::new(json!({"summary": format!("{provider_id} output")}))
                .with_confidence(0.8))
        }
    }

    fn engine_for(
        providers: Vec<Provider>,
        invoker: Arc<ScriptedInvoker>,
    ) -> (ExecutionEngine, Arc<PerformanceLedger>) {
        let index = Arc::new(ProviderIndex::build(providers).unwrap());
        let ledger = Arc::new(PerformanceLedger::new());
        (
            ExecutionEngine::new(invoker, index, Arc::clone(&ledger)),
            ledger,
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn test_single_stage_all_succeed() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let providers = vec![
            Provider::new("a", Category::NetworkScan),
            Provider::new("b", Category::NetworkScan),
        ];
        let (engine, _) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan = ExecutionPlan::layered(providers).unwrap();

        let report = engine.execute(&plan, json!("scan"), far_deadline()).await;

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.is_success()));
        assert_eq!(report.stage_states, vec![StageState::Completed]);
    }

    #[tokio::test]
    async fn test_failover_recovers_and_records_both_attempts() {
        let invoker = Arc::new(ScriptedInvoker::new().failing(&["primary"]));
        let providers = vec![
            Provider::new("primary", Category::NetworkScan).with_failover(["backup"]),
            Provider::new("backup", Category::NetworkScan),
        ];
        let (engine, ledger) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan = ExecutionPlan::layered(vec![providers[0].clone()]).unwrap();

        let report = engine.execute(&plan, json!("scan"), far_deadline()).await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].provider_id, "primary");
        assert_eq!(report.results[0].status, InvocationStatus::Failure);
        assert_eq!(report.results[1].provider_id, "backup");
        assert!(report.results[1].is_success());

        // Each attempt lands on its own ledger record.
        assert_eq!(ledger.raw("primary").unwrap().failure_count, 1);
        assert_eq!(ledger.raw("backup").unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_attempts_each_entry_once() {
        let invoker = Arc::new(ScriptedInvoker::new().failing(&["p", "alt1", "alt2"]));
        let providers = vec![
            Provider::new("p", Category::NetworkScan).with_failover(["alt1", "alt2"]),
            Provider::new("alt1", Category::NetworkScan),
            Provider::new("alt2", Category::NetworkScan),
        ];
        let (engine, _) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan = ExecutionPlan::layered(vec![providers[0].clone()]).unwrap();

        let report = engine.execute(&plan, json!("scan"), far_deadline()).await;

        assert_eq!(invoker.invoked_ids(), vec!["p", "alt1", "alt2"]);
        assert_eq!(report.results.len(), 3);
        assert!(report.results.iter().all(|r| !r.is_success()));
    }

    #[tokio::test]
    async fn test_upstream_failure_cascades_to_dependents_only() {
        let invoker = Arc::new(ScriptedInvoker::new().failing(&["feeder"]));
        let providers = vec![
            Provider::new("feeder", Category::NetworkScan),
            Provider::new("dependent", Category::StaticAnalysis).with_dependencies(["feeder"]),
            Provider::new("independent", Category::TextSearch),
        ];
        let (engine, _) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan = ExecutionPlan::layered(providers).unwrap();

        let report = engine.execute(&plan, json!("task"), far_deadline()).await;

        let dependent = report
            .results
            .iter()
            .find(|r| r.provider_id == "dependent")
            .unwrap();
        assert_eq!(dependent.status, InvocationStatus::Cancelled);
        assert_eq!(dependent.error_kind, Some(FailureKind::UpstreamFailed));
        // The dependent was never actually invoked.
        assert!(!invoker.invoked_ids().contains(&"dependent".to_string()));

        let independent = report
            .results
            .iter()
            .find(|r| r.provider_id == "independent")
            .unwrap();
        assert!(independent.is_success());
    }

    #[tokio::test]
    async fn test_failover_output_feeds_dependent_stage() {
        let invoker = Arc::new(ScriptedInvoker::new().failing(&["a"]));
        let providers = vec![
            Provider::new("a", Category::NetworkScan).with_failover(["a2"]),
            Provider::new("a2", Category::NetworkScan),
            Provider::new("b", Category::StaticAnalysis).with_dependencies(["a"]),
        ];
        let (engine, _) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan =
            ExecutionPlan::layered(vec![providers[0].clone(), providers[2].clone()]).unwrap();

        let report = engine.execute(&plan, json!("task"), far_deadline()).await;

        // a failed, a2 recovered the slot, b ran with a2's output.
        let statuses: HashMap<&str, InvocationStatus> = report
            .results
            .iter()
            .map(|r| (r.provider_id.as_str(), r.status))
            .collect();
        assert_eq!(statuses["a"], InvocationStatus::Failure);
        assert_eq!(statuses["a2"], InvocationStatus::Success);
        assert_eq!(statuses["b"], InvocationStatus::Success);
        assert!(!report
            .results
            .iter()
            .any(|r| r.error_kind == Some(FailureKind::UpstreamFailed)));

        let b_input = invoker.input_for("b").unwrap();
        assert_eq!(b_input["upstream"]["a"]["provider"], "a2");
        assert_eq!(b_input["upstream"]["a"]["payload"]["summary"], "a2 output");
    }

    #[tokio::test]
    async fn test_deadline_cancels_unstarted_stages() {
        let invoker = Arc::new(ScriptedInvoker::new().delay("slow", Duration::from_secs(1)));
        let slow = Provider::new("slow", Category::NetworkScan);
        let later = Provider::new("later", Category::StaticAnalysis);
        let (engine, _) = engine_for(vec![slow.clone(), later.clone()], Arc::clone(&invoker));
        // Two sequential stages with no dependency between them, so the
        // second stage's fate is decided by the deadline alone.
        let plan = ExecutionPlan {
            stages: vec![
                Stage {
                    providers: vec![slow],
                },
                Stage {
                    providers: vec![later],
                },
            ],
        };

        let deadline = Instant::now() + Duration::from_millis(100);
        let report = engine.execute(&plan, json!("task"), deadline).await;

        // The second stage never starts and its provider is never invoked.
        assert!(!invoker.invoked_ids().contains(&"later".to_string()));
        let later = report
            .results
            .iter()
            .find(|r| r.provider_id == "later")
            .unwrap();
        assert_eq!(later.status, InvocationStatus::Cancelled);
        assert_eq!(later.error_kind, Some(FailureKind::DeadlineExceeded));
        assert_eq!(
            report.stage_states,
            vec![StageState::Completed, StageState::Cancelled]
        );

        // The in-flight first stage was capped at the remaining budget plus
        // the grace window and reported as a timeout.
        let slow = report
            .results
            .iter()
            .find(|r| r.provider_id == "slow")
            .unwrap();
        assert_eq!(slow.error_kind, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_timeout_override_classified_as_timeout() {
        let invoker =
            Arc::new(ScriptedInvoker::new().delay("laggard", Duration::from_millis(200)));
        let providers = vec![Provider::new("laggard", Category::TextSearch)];
        let (engine, ledger) = engine_for(providers.clone(), Arc::clone(&invoker));
        let engine = engine.with_config(EngineConfig {
            timeout_overrides: [("laggard".to_string(), Duration::from_millis(20))]
                .into_iter()
                .collect(),
            ..EngineConfig::default()
        });
        let plan = ExecutionPlan::layered(providers).unwrap();

        let report = engine.execute(&plan, json!("task"), far_deadline()).await;

        assert_eq!(report.results[0].status, InvocationStatus::Timeout);
        assert_eq!(ledger.raw("laggard").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_completed_results_retained_after_deadline_expiry() {
        // Stage one finishes inside its grace-extended budget but past the
        // overall deadline; its success is retained while stage two is
        // cancelled rather than the whole execution being discarded.
        let invoker =
            Arc::new(ScriptedInvoker::new().delay("quick", Duration::from_millis(150)));
        let providers = vec![
            Provider::new("quick", Category::NetworkScan),
            Provider::new("after", Category::StaticAnalysis).with_dependencies(["quick"]),
        ];
        let (engine, _) = engine_for(providers.clone(), Arc::clone(&invoker));
        let plan = ExecutionPlan::layered(providers).unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let report = engine.execute(&plan, json!("task"), deadline).await;

        let quick = report
            .results
            .iter()
            .find(|r| r.provider_id == "quick")
            .unwrap();
        assert!(quick.is_success());

        let after = report
            .results
            .iter()
            .find(|r| r.provider_id == "after")
            .unwrap();
        assert_eq!(after.status, InvocationStatus::Cancelled);
        assert_eq!(after.error_kind, Some(FailureKind::DeadlineExceeded));
    }
}
