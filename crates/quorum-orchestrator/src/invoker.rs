use async_trait::async_trait;
use quorum_core::QuorumResult;
use serde_json::Value;
use std::time::Duration;

/// Output of one provider invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Opaque structured output. An empty payload is an ordinary success,
    /// not a failure.
    pub payload: Value,
    /// Provider-reported confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Invocation {
    /// An invocation output with the default confidence of 0.5.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            confidence: 0.5,
        }
    }

    /// Attach an explicit confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Performs one provider's unit of work.
///
/// The execution engine treats this as an opaque function per provider id:
/// all provider-specific logic lives behind this seam, never branched on
/// inside the orchestrator. Implementations must return within `timeout`
/// or fail with a timeout-classified error; the engine additionally
/// enforces the budget from the outside.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    /// Run the provider against `input` within `timeout`.
    async fn invoke(
        &self,
        provider_id: &str,
        input: Value,
        timeout: Duration,
    ) -> QuorumResult<Invocation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_confidence() {
        let invocation = Invocation::new(json!({"hits": []}));
        assert_eq!(invocation.confidence, 0.5);
    }

    #[test]
    fn test_confidence_clamped() {
        let invocation = Invocation::new(json!(null)).with_confidence(2.0);
        assert_eq!(invocation.confidence, 1.0);
    }
}
