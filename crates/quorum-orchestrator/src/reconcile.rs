use crate::reasoner::AdvisoryReasoner;
use crate::types::{AggregatedResult, AggregationStatus, Conflict, DuplicateNote};
use quorum_catalog::{PerformanceLedger, ProviderIndex};
use quorum_core::ProviderResult;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning knobs for reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Token-overlap similarity at or above which two outputs are duplicates.
    pub similarity_threshold: f64,
    /// Budget for one advisory synthesis call.
    pub reasoner_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            reasoner_timeout: Duration::from_secs(3),
        }
    }
}

/// A normalized view of one successful provider output.
struct ParsedOutput {
    provider_id: String,
    confidence: f64,
    summary: String,
    claims: Vec<Claim>,
    insights: Vec<String>,
    recommendations: Vec<String>,
}

struct Claim {
    subject: String,
    value: String,
}

/// Merges per-provider outputs into one coherent answer: deduplicates
/// near-identical outputs, resolves contradictory claims toward the
/// higher-quality provider, and synthesizes a final text.
///
/// Without an advisory reasoner the synthesis is fully deterministic:
/// identical input results produce byte-identical output.
pub struct Reconciler {
    index: Arc<ProviderIndex>,
    ledger: Arc<PerformanceLedger>,
    reasoner: Option<Arc<dyn AdvisoryReasoner>>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler with no reasoner and default config.
    pub fn new(index: Arc<ProviderIndex>, ledger: Arc<PerformanceLedger>) -> Self {
        Self {
            index,
            ledger,
            reasoner: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Attach an advisory reasoner for prose synthesis.
    pub fn with_reasoner(mut self, reasoner: Arc<dyn AdvisoryReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Override the default config.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Merge all invocation results into one aggregated answer.
    ///
    /// Non-success results are excluded from the synthesis but retained in
    /// `per_provider_results` for provenance. Never fails: degraded inputs
    /// yield a degraded (possibly zero-confidence) answer.
    pub async fn aggregate(
        &self,
        results: Vec<ProviderResult>,
        task_description: &str,
    ) -> AggregatedResult {
        let total = results.len();
        let successes: Vec<&ProviderResult> =
            results.iter().filter(|r| r.is_success()).collect();

        if successes.is_empty() {
            warn!("No successful provider results to reconcile");
            return AggregatedResult {
                status: AggregationStatus::NoResults,
                synthesized_output: "No capability provider produced a usable result".to_string(),
                per_provider_results: results,
                conflicts: Vec::new(),
                duplicates: Vec::new(),
                insights: Vec::new(),
                recommendations: Vec::new(),
                overall_confidence: 0.0,
            };
        }

        let mut outputs: Vec<ParsedOutput> = successes.iter().map(|r| parse_output(r)).collect();
        // Deterministic processing order: confidence descending, id ascending.
        outputs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });

        let (kept, duplicates) = self.dedup_outputs(outputs);
        let (accepted_claims, conflicts) = self.resolve_claims(&kept);

        let insights = self.dedup_texts(kept.iter().flat_map(|k| k.insights.iter().cloned()));
        let recommendations =
            self.dedup_texts(kept.iter().flat_map(|k| k.recommendations.iter().cloned()));

        let surviving: Vec<ProviderResult> = kept
            .iter()
            .filter_map(|k| {
                successes
                    .iter()
                    .find(|r| r.provider_id == k.provider_id)
                    .map(|r| (*r).clone())
            })
            .collect();

        let rule_based = render_synthesis(
            &kept,
            &accepted_claims,
            &conflicts,
            &insights,
            &recommendations,
        );
        let synthesized_output = match self.reasoner_synthesis(&surviving, task_description).await
        {
            Some(text) => text,
            None => rule_based,
        };

        let mean_confidence =
            successes.iter().map(|r| r.confidence).sum::<f64>() / successes.len() as f64;
        let overall_confidence = mean_confidence * successes.len() as f64 / total.max(1) as f64;
        let status = if successes.len() == total {
            AggregationStatus::Complete
        } else {
            AggregationStatus::Partial
        };

        AggregatedResult {
            status,
            synthesized_output,
            per_provider_results: results,
            conflicts,
            duplicates,
            insights,
            recommendations,
            overall_confidence,
        }
    }

    /// Drop outputs whose normalized content duplicates an already-kept,
    /// higher-confidence output.
    fn dedup_outputs(&self, outputs: Vec<ParsedOutput>) -> (Vec<ParsedOutput>, Vec<DuplicateNote>) {
        let mut kept: Vec<ParsedOutput> = Vec::new();
        let mut duplicates = Vec::new();

        for output in outputs {
            let duplicate_of = kept.iter().find_map(|existing| {
                let sim = similarity(&existing.summary, &output.summary);
                (sim >= self.config.similarity_threshold)
                    .then(|| (existing.provider_id.clone(), sim))
            });
            match duplicate_of {
                Some((kept_id, sim)) => {
                    debug!(
                        kept = %kept_id,
                        discarded = %output.provider_id,
                        similarity = sim,
                        "Discarding duplicate output"
                    );
                    duplicates.push(DuplicateNote {
                        kept_provider: kept_id,
                        discarded_provider: output.provider_id,
                        similarity: sim,
                    });
                }
                None => kept.push(output),
            }
        }

        (kept, duplicates)
    }

    /// Group claims by subject and resolve contradictions toward the
    /// provider with the higher ledger quality score. Rejected claims are
    /// retained as [`Conflict`]s, never silently dropped.
    fn resolve_claims(
        &self,
        kept: &[ParsedOutput],
    ) -> (Vec<(String, String, String)>, Vec<Conflict>) {
        let mut by_subject: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for output in kept {
            for claim in &output.claims {
                by_subject
                    .entry(claim.subject.clone())
                    .or_default()
                    .push((output.provider_id.clone(), claim.value.clone()));
            }
        }

        let mut accepted = Vec::new();
        let mut conflicts = Vec::new();
        for (subject, claimants) in by_subject {
            let mut winner = &claimants[0];
            let mut winner_quality = self.quality_of(&winner.0);
            for claimant in &claimants[1..] {
                let quality = self.quality_of(&claimant.0);
                if quality > winner_quality {
                    winner = claimant;
                    winner_quality = quality;
                }
            }
            for claimant in &claimants {
                if claimant.0 != winner.0 && claimant.1 != winner.1 {
                    conflicts.push(Conflict {
                        subject: subject.clone(),
                        accepted_claim: winner.1.clone(),
                        accepted_provider: winner.0.clone(),
                        rejected_claim: claimant.1.clone(),
                        rejected_provider: claimant.0.clone(),
                    });
                }
            }
            accepted.push((subject, winner.1.clone(), winner.0.clone()));
        }

        (accepted, conflicts)
    }

    fn dedup_texts<I>(&self, texts: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut kept: Vec<String> = Vec::new();
        for text in texts {
            if text.trim().is_empty() {
                continue;
            }
            let duplicate = kept
                .iter()
                .any(|existing| similarity(existing, &text) >= self.config.similarity_threshold);
            if !duplicate {
                kept.push(text);
            }
        }
        kept
    }

    fn quality_of(&self, provider_id: &str) -> f64 {
        match self.index.get(provider_id) {
            Some(provider) => self.ledger.snapshot(provider).quality_score,
            None => 0.5,
        }
    }

    async fn reasoner_synthesis(
        &self,
        results: &[ProviderResult],
        task_description: &str,
    ) -> Option<String> {
        let reasoner = self.reasoner.as_ref()?;
        match tokio::time::timeout(
            self.config.reasoner_timeout,
            reasoner.synthesize(results, task_description),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!("Advisory reasoner returned empty synthesis; falling back");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Advisory reasoner synthesis failed; falling back");
                None
            }
            Err(_) => {
                warn!("Advisory reasoner synthesis timed out; falling back");
                None
            }
        }
    }
}

/// Lowercase-alphanumeric token overlap (Jaccard) between two texts.
fn similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

/// Tokenize text into lowercase words, filtering tokens with length <= 1.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1)
        .collect()
}

/// Extract the structured shape the reconciler understands from an opaque
/// payload; anything unstructured becomes a plain summary.
fn parse_output(result: &ProviderResult) -> ParsedOutput {
    let payload = &result.payload;
    let summary = match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::to_string(payload).unwrap_or_default()),
        other => serde_json::to_string(other).unwrap_or_default(),
    };

    let claims = payload
        .get("claims")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(Claim {
                        subject: entry.get("subject")?.as_str()?.to_string(),
                        value: entry.get("value")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ParsedOutput {
        provider_id: result.provider_id.clone(),
        confidence: result.confidence,
        summary,
        claims,
        insights: string_list(payload, "insights"),
        recommendations: string_list(payload, "recommendations"),
    }
}

fn string_list(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic rule-based synthesis: surviving outputs ordered by
/// descending confidence, then resolved facts, then ranked lists.
fn render_synthesis(
    kept: &[ParsedOutput],
    accepted_claims: &[(String, String, String)],
    conflicts: &[Conflict],
    insights: &[String],
    recommendations: &[String],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Merged findings from {} provider(s).\n", kept.len()));

    for output in kept {
        out.push_str(&format!(
            "\n[{}] (confidence {:.2})\n{}\n",
            output.provider_id, output.confidence, output.summary
        ));
    }

    if !accepted_claims.is_empty() {
        out.push_str("\nEstablished facts:\n");
        for (subject, value, provider) in accepted_claims {
            out.push_str(&format!("- {subject}: {value} (per {provider})\n"));
        }
    }

    if !conflicts.is_empty() {
        out.push_str(&format!(
            "\n{} conflicting claim(s) resolved by provider quality.\n",
            conflicts.len()
        ));
    }

    if !insights.is_empty() {
        out.push_str("\nInsights:\n");
        for insight in insights {
            out.push_str(&format!("- {insight}\n"));
        }
    }

    if !recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for recommendation in recommendations {
            out.push_str(&format!("- {recommendation}\n"));
        }
    }

    out
}
