//! Core types and error definitions for the Quorum capability orchestrator.
//!
//! This crate provides the foundational types shared across all Quorum crates:
//! error handling, provider descriptions, and per-invocation result types.
//!
//! # Main types
//!
//! - [`QuorumError`] — Unified error enum for all Quorum subsystems.
//! - [`QuorumResult`] — Convenience alias for `Result<T, QuorumError>`.
//! - [`Provider`] — Immutable description of one capability provider.
//! - [`Category`] — The kind of work a provider performs.
//! - [`ProviderResult`] — The outcome of a single provider invocation attempt.

/// Provider and category descriptions published by the capability catalog.
pub mod provider;
/// Per-invocation result and failure classification types.
pub mod result;
/// Tracing subscriber setup helper.
pub mod telemetry;

pub use provider::{Category, Provider};
pub use result::{FailureKind, InvocationStatus, ProviderResult};

// --- Error types ---

/// Top-level error type for the Quorum orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    /// No provider in the catalog matches the requested category.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Selection produced no viable candidates for the request.
    #[error("no capability available: {0}")]
    NoCapabilityAvailable(String),

    /// Catalog metadata describes a dependency cycle between providers.
    #[error("dependency cycle in catalog: {0}")]
    DependencyCycle(String),

    /// Catalog metadata failed validation (duplicate ids, bad failover references).
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A provider invocation exceeded its timeout.
    #[error("provider timeout: {0}")]
    ProviderTimeout(String),

    /// A provider invocation failed while executing.
    #[error("provider execution error: {0}")]
    ProviderExecution(String),

    /// The advisory reasoner was unavailable or returned unusable output.
    ///
    /// Recovered locally by the selector and reconciler; never surfaced to
    /// callers of the orchestrator facade.
    #[error("reasoner unavailable: {0}")]
    ReasonerUnavailable(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`QuorumError`].
pub type QuorumResult<T> = Result<T, QuorumError>;
