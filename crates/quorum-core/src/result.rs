use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a single provider invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The provider returned a result (possibly empty).
    Success,
    /// The provider failed while executing.
    Failure,
    /// The provider exceeded its timeout.
    Timeout,
    /// The invocation never ran (upstream failure or deadline).
    Cancelled,
}

/// Classification attached to non-success invocation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt exceeded its per-invocation timeout.
    Timeout,
    /// The provider raised an execution error.
    Execution,
    /// A required upstream provider failed after exhausting its failover chain.
    UpstreamFailed,
    /// The overall deadline passed before the invocation could start.
    DeadlineExceeded,
}

/// The outcome of one provider invocation attempt.
///
/// Every attempt produces a result, including failed attempts that were
/// later recovered through failover; the full list is retained for
/// provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    /// The provider that was (or would have been) invoked.
    pub provider_id: String,
    /// Terminal status of the attempt.
    pub status: InvocationStatus,
    /// Opaque structured output; `Null` for non-success attempts.
    pub payload: serde_json::Value,
    /// Wall-clock latency of the attempt in milliseconds.
    pub latency_ms: u64,
    /// Failure classification when `status` is not `Success`.
    pub error_kind: Option<FailureKind>,
    /// Provider-reported confidence in `[0, 1]`, defaulted when absent.
    pub confidence: f64,
    /// UTC timestamp of when the attempt reached its terminal state.
    pub completed_at: DateTime<Utc>,
}

impl ProviderResult {
    /// A successful invocation carrying a payload and confidence.
    pub fn success(
        provider_id: impl Into<String>,
        payload: serde_json::Value,
        latency_ms: u64,
        confidence: f64,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: InvocationStatus::Success,
            payload,
            latency_ms,
            error_kind: None,
            confidence: confidence.clamp(0.0, 1.0),
            completed_at: Utc::now(),
        }
    }

    /// A failed invocation attempt.
    pub fn failure(provider_id: impl Into<String>, kind: FailureKind, latency_ms: u64) -> Self {
        let status = match kind {
            FailureKind::Timeout => InvocationStatus::Timeout,
            _ => InvocationStatus::Failure,
        };
        Self {
            provider_id: provider_id.into(),
            status,
            payload: serde_json::Value::Null,
            latency_ms,
            error_kind: Some(kind),
            confidence: 0.0,
            completed_at: Utc::now(),
        }
    }

    /// An invocation that never ran.
    pub fn cancelled(provider_id: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: InvocationStatus::Cancelled,
            payload: serde_json::Value::Null,
            latency_ms: 0,
            error_kind: Some(kind),
            confidence: 0.0,
            completed_at: Utc::now(),
        }
    }

    /// Whether this attempt produced usable output.
    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }
}
