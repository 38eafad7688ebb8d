//! Multi-capability execution orchestration for Quorum.
//!
//! Given a task description, this crate selects a bounded set of capability
//! providers, plans their execution as a sequence of mutually independent
//! stages, runs each stage concurrently with per-attempt timeouts and
//! automatic failover, and reconciles the heterogeneous outputs into one
//! conflict-resolved answer.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Single entry point wiring selection, execution, and
//!   reconciliation.
//! - [`CapabilitySelector`] — Ranks candidates per strategy and builds the
//!   execution plan.
//! - [`ExecutionEngine`] — Runs plan stages with bounded concurrency,
//!   failover, and deadline handling.
//! - [`Reconciler`] — Deduplicates, resolves conflicts, and synthesizes the
//!   final result.
//! - [`CapabilityInvoker`] — Seam through which providers actually run.
//! - [`AdvisoryReasoner`] — Optional ranking/synthesis collaborator with a
//!   mandatory rule-based fallback.

/// Staged concurrent execution with failover and deadlines.
pub mod engine;
/// The provider invocation seam.
pub mod invoker;
/// The orchestration facade.
pub mod orchestrator;
/// Execution plans and topological layering.
pub mod plan;
/// The optional advisory reasoner seam.
pub mod reasoner;
/// Result deduplication, conflict resolution, and synthesis.
pub mod reconcile;
/// Strategy-driven candidate selection.
pub mod selector;
/// Shared orchestration types.
pub mod types;

pub use engine::{EngineConfig, ExecutionEngine, ExecutionReport};
pub use invoker::{CapabilityInvoker, Invocation};
pub use orchestrator::{OrchestrationRequest, Orchestrator};
pub use plan::{ExecutionPlan, Stage};
pub use reasoner::{AdvisoryReasoner, RankedCandidate};
pub use reconcile::{Reconciler, ReconcilerConfig};
pub use selector::{CapabilitySelector, SelectorConfig};
pub use types::{
    AggregatedResult, AggregationStatus, Conflict, DuplicateNote, Selection, SelectionRequest,
    StageState, Strategy,
};
