use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use quorum_core::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Blend factor for the exponentially-weighted quality score.
const QUALITY_ALPHA: f64 = 0.3;
/// Quality signal assumed for a success that reported none.
const DEFAULT_SUCCESS_QUALITY: f64 = 0.7;
/// Success rate assumed for a provider with no history.
const COLD_SUCCESS_RATE: f64 = 0.5;
/// Quality score assumed for a provider with no history.
const COLD_QUALITY: f64 = 0.5;

/// One invocation's contribution to a provider's statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Optional quality signal in `[0, 1]`.
    pub quality: Option<f64>,
}

impl InvocationOutcome {
    /// A successful invocation with no explicit quality signal.
    pub fn success(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            quality: None,
        }
    }

    /// A failed invocation.
    pub fn failure(latency_ms: u64) -> Self {
        Self {
            success: false,
            latency_ms,
            quality: None,
        }
    }

    /// Attach an explicit quality signal.
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality.clamp(0.0, 1.0));
        self
    }
}

/// Rolling statistics for one provider. Append-only; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Count of successful invocations.
    pub success_count: u64,
    /// Count of failed invocations.
    pub failure_count: u64,
    /// Sum of invocation latencies in milliseconds.
    pub total_latency_ms: u64,
    /// Exponentially-weighted quality accumulator in `[0, 1]`.
    pub quality: f64,
    /// When this record was last updated.
    pub last_updated: DateTime<Utc>,
}

impl PerformanceRecord {
    fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_latency_ms: 0,
            quality: COLD_QUALITY,
            last_updated: Utc::now(),
        }
    }

    fn apply(&mut self, outcome: InvocationOutcome) {
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_latency_ms += outcome.latency_ms;
        let signal = outcome.quality.unwrap_or(if outcome.success {
            DEFAULT_SUCCESS_QUALITY
        } else {
            0.0
        });
        self.quality = QUALITY_ALPHA * signal + (1.0 - QUALITY_ALPHA) * self.quality;
        self.last_updated = Utc::now();
    }

    /// Total invocations recorded.
    pub fn samples(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Fraction of invocations that succeeded.
    pub fn success_rate(&self) -> f64 {
        let total = self.samples();
        if total == 0 {
            COLD_SUCCESS_RATE
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// Mean latency across all invocations, in milliseconds.
    pub fn avg_latency_ms(&self) -> f64 {
        let total = self.samples();
        if total == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / total as f64
        }
    }

    /// Exponentially-weighted quality score in `[0, 1]`.
    pub fn quality_score(&self) -> f64 {
        self.quality
    }
}

/// Read-side view of one provider's statistics.
///
/// For a never-invoked provider the view falls back to catalog priors so
/// cold-start providers are not permanently excluded from selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Fraction of invocations that succeeded (0.5 when no history).
    pub success_rate: f64,
    /// Mean latency in milliseconds (catalog prior when no history).
    pub avg_latency_ms: f64,
    /// Exponentially-weighted quality score (0.5 when no history).
    pub quality_score: f64,
    /// Number of invocations the view is based on.
    pub samples: u64,
}

impl LedgerSnapshot {
    fn cold(provider: &Provider) -> Self {
        Self {
            success_rate: COLD_SUCCESS_RATE,
            avg_latency_ms: provider.expected_latency_ms as f64,
            quality_score: COLD_QUALITY,
            samples: 0,
        }
    }
}

/// Process-wide rolling performance statistics, shared by every concurrent
/// orchestration call.
///
/// Each provider id gets its own lock; the outer map lock is held only long
/// enough to find or insert an entry, so updates for unrelated providers
/// never serialize against each other.
pub struct PerformanceLedger {
    records: RwLock<HashMap<String, Arc<Mutex<PerformanceRecord>>>>,
}

impl PerformanceLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, provider_id: &str) -> Arc<Mutex<PerformanceRecord>> {
        if let Some(record) = self.records.read().get(provider_id) {
            return Arc::clone(record);
        }
        let mut records = self.records.write();
        Arc::clone(
            records
                .entry(provider_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(PerformanceRecord::new()))),
        )
    }

    /// Record one invocation outcome for a provider.
    pub fn record(&self, provider_id: &str, outcome: InvocationOutcome) {
        let entry = self.entry(provider_id);
        let mut record = entry.lock();
        record.apply(outcome);
        debug!(
            provider = provider_id,
            success = outcome.success,
            latency_ms = outcome.latency_ms,
            success_rate = record.success_rate(),
            "Ledger updated"
        );
    }

    /// Read a provider's statistics, falling back to catalog priors when the
    /// provider has never been invoked.
    pub fn snapshot(&self, provider: &Provider) -> LedgerSnapshot {
        match self.records.read().get(&provider.id) {
            Some(record) => {
                let record = record.lock();
                if record.samples() == 0 {
                    LedgerSnapshot::cold(provider)
                } else {
                    LedgerSnapshot {
                        success_rate: record.success_rate(),
                        avg_latency_ms: record.avg_latency_ms(),
                        quality_score: record.quality_score(),
                        samples: record.samples(),
                    }
                }
            }
            None => LedgerSnapshot::cold(provider),
        }
    }

    /// Raw record for a provider, if one exists.
    pub fn raw(&self, provider_id: &str) -> Option<PerformanceRecord> {
        self.records
            .read()
            .get(provider_id)
            .map(|record| record.lock().clone())
    }

    /// Number of providers with at least one recorded invocation.
    pub fn provider_count(&self) -> usize {
        self.records.read().len()
    }
}

impl Default for PerformanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::Category;

    fn provider(id: &str) -> Provider {
        Provider::new(id, Category::NetworkScan).with_expected_latency(2_500)
    }

    #[test]
    fn test_cold_start_defaults() {
        let ledger = PerformanceLedger::new();
        let snap = ledger.snapshot(&provider("never-ran"));
        assert_eq!(snap.success_rate, 0.5);
        assert_eq!(snap.avg_latency_ms, 2_500.0);
        assert_eq!(snap.quality_score, 0.5);
        assert_eq!(snap.samples, 0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let ledger = PerformanceLedger::new();
        ledger.record("scan", InvocationOutcome::success(100));
        ledger.record("scan", InvocationOutcome::success(300));
        ledger.record("scan", InvocationOutcome::failure(200));

        let snap = ledger.snapshot(&provider("scan"));
        assert_eq!(snap.samples, 3);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snap.avg_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_exponential_weighting() {
        let ledger = PerformanceLedger::new();
        ledger.record("p", InvocationOutcome::success(10).with_quality(1.0));
        let after_one = ledger.raw("p").unwrap().quality_score();
        // 0.3 * 1.0 + 0.7 * 0.5
        assert!((after_one - 0.65).abs() < 1e-9);

        ledger.record("p", InvocationOutcome::failure(10));
        let after_two = ledger.raw("p").unwrap().quality_score();
        // Failure without a signal pulls quality toward zero.
        assert!(after_two < after_one);
    }

    #[test]
    fn test_records_never_deleted() {
        let ledger = PerformanceLedger::new();
        ledger.record("a", InvocationOutcome::failure(1));
        ledger.record("b", InvocationOutcome::success(1));
        assert_eq!(ledger.provider_count(), 2);
        assert!(ledger.raw("a").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_lose_no_counts() {
        let ledger = Arc::new(PerformanceLedger::new());
        let mut handles = Vec::new();
        for i in 0..100u64 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let id = if i % 2 == 0 { "even" } else { "odd" };
                ledger.record(id, InvocationOutcome::success(i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let even = ledger.raw("even").unwrap();
        let odd = ledger.raw("odd").unwrap();
        assert_eq!(even.success_count, 50);
        assert_eq!(odd.success_count, 50);
    }
}
