//! Function Matcher (spec §4.3)
//!
//! Selects the functions relevant to a natural-language request: an
//! optional oracle's structured classification when one is configured,
//! else a deterministic lexical fallback. Pure and synchronous beyond the
//! oracle call itself, so [`Matcher::select`] is trivially testable without
//! a transport — grounded on the teacher's preference for small,
//! dependency-free scoring logic kept apart from the async machinery
//! around it (see `message_router/traits.rs`'s separation of `MetricsCollector`
//! from `DeliveryEngine`).

use crate::catalogue::FunctionDescriptor;
use crate::domain_types::FunctionId;
use crate::error::OracleError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// The minimal view of a function the oracle needs to classify a request.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    /// The function's id, echoed back so a match can be resolved.
    pub function_id: FunctionId,
    /// The function's name.
    pub name: String,
    /// The function's prose description.
    pub description: String,
}

/// One function name the oracle judged relevant, with its classification.
#[derive(Debug, Clone)]
pub struct OracleMatch {
    /// The function name the oracle selected.
    pub function_name: String,
    /// The oracle's domain classification for the request.
    pub domain: String,
    /// The oracle's operation-type classification for the request.
    pub operation_type: String,
}

/// The external, narrow interface to a language-model oracle used during
/// matching. Spec treats the oracle's own reasoning as out of scope; this
/// crate ships the trait only, no concrete implementation.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Classifies `request` against `candidates`, returning the subset the
    /// oracle judges relevant.
    async fn classify(
        &self,
        request: &str,
        candidates: &[FunctionSummary],
    ) -> Result<Vec<OracleMatch>, OracleError>;
}

/// One selected function, its score, and why it was selected.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The selected function.
    pub descriptor: FunctionDescriptor,
    /// `1.0` for an oracle match; the lexical score table's output otherwise.
    pub score: f64,
    /// Human-readable rationale (`"selected by oracle"` or a signal summary).
    pub explanation: String,
    /// The oracle's `(domain, operation_type)` classification, oracle path only.
    pub classification: Option<(String, String)>,
    /// Parameter values heuristically extracted from the request text.
    pub inferred_params: HashMap<String, String>,
}

/// Selects relevant functions for a request, given a catalogue snapshot.
pub struct Matcher;

impl Matcher {
    /// Runs the primary (oracle) path if `oracle` is `Some`, falling back to
    /// the deterministic lexical path on `None`, oracle error, or
    /// unparseable oracle output.
    pub async fn select(
        request: &str,
        snapshot: &[FunctionDescriptor],
        oracle: Option<&dyn Oracle>,
        min_score: f64,
    ) -> Vec<MatchResult> {
        if let Some(oracle) = oracle {
            let candidates: Vec<FunctionSummary> = snapshot
                .iter()
                .map(|descriptor| FunctionSummary {
                    function_id: descriptor.function_id,
                    name: descriptor.name.to_string(),
                    description: descriptor.description.clone(),
                })
                .collect();

            match oracle.classify(request, &candidates).await {
                Ok(matches) => return Self::resolve_oracle_matches(matches, snapshot),
                Err(err) => {
                    warn!(error = %err, "oracle classification failed, falling back to lexical matcher");
                }
            }
        }

        Self::lexical_fallback(request, snapshot, min_score)
    }

    fn resolve_oracle_matches(
        matches: Vec<OracleMatch>,
        snapshot: &[FunctionDescriptor],
    ) -> Vec<MatchResult> {
        matches
            .into_iter()
            .filter_map(|oracle_match| {
                snapshot
                    .iter()
                    .find(|descriptor| descriptor.name.as_ref() == oracle_match.function_name)
                    .map(|descriptor| MatchResult {
                        descriptor: descriptor.clone(),
                        score: 1.0,
                        explanation: "selected by oracle".to_string(),
                        classification: Some((oracle_match.domain, oracle_match.operation_type)),
                        inferred_params: extract_inferred_params("", descriptor),
                    })
            })
            .collect()
    }

    fn lexical_fallback(
        request: &str,
        snapshot: &[FunctionDescriptor],
        min_score: f64,
    ) -> Vec<MatchResult> {
        let request_lower = request.to_lowercase();
        let request_words: HashSet<&str> = request_lower.split_whitespace().collect();

        let mut results: Vec<MatchResult> = snapshot
            .iter()
            .filter_map(|descriptor| {
                let score = score_descriptor(&request_lower, &request_words, descriptor);
                if score < min_score {
                    return None;
                }
                Some(MatchResult {
                    descriptor: descriptor.clone(),
                    score,
                    explanation: format!("lexical match, score {score:.2}"),
                    classification: None,
                    inferred_params: extract_inferred_params(request, descriptor),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.descriptor.name.to_string().cmp(&b.descriptor.name.to_string()))
        });

        results
    }
}

fn score_descriptor(
    request_lower: &str,
    request_words: &HashSet<&str>,
    descriptor: &FunctionDescriptor,
) -> f64 {
    let name_lower = descriptor.name.to_string().to_lowercase();
    let desc_lower = descriptor.description.to_lowercase();

    let name_substring = request_lower.contains(&name_lower);
    let desc_substring = !desc_lower.is_empty() && request_lower.contains(&desc_lower);

    let name_words: HashSet<&str> = name_lower.split_whitespace().collect();
    let desc_words: HashSet<&str> = desc_lower.split_whitespace().collect();
    let name_overlap = name_words.iter().any(|word| request_words.contains(word));
    let desc_overlap = desc_words.iter().any(|word| request_words.contains(word));

    match (name_substring, desc_substring, name_overlap, desc_overlap) {
        (true, true, _, _) => 1.00,
        (false, false, true, true) => 0.80,
        (true, false, _, _) => 0.60,
        (false, false, true, false) => 0.40,
        (false, false, false, true) => 0.40,
        _ => 0.00,
    }
}

/// Best-effort extraction of literal parameter values: searches the request
/// for each parameter name as a substring and takes the token immediately
/// following it. This is a heuristic substring-then-next-token scan; it may
/// attach an incorrect value, or none, for an ambiguous request — spec
/// leaves the precision of this step unspecified.
fn extract_inferred_params(request: &str, descriptor: &FunctionDescriptor) -> HashMap<String, String> {
    let mut inferred = HashMap::new();
    let schema = descriptor.effective_schema();
    let lower_request = request.to_lowercase();

    for param_name in schema.keys() {
        let needle = param_name.to_lowercase();
        if let Some(position) = lower_request.find(&needle) {
            let after = &request[position + needle.len()..];
            if let Some(token) = after.split_whitespace().next() {
                let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric());
                if !cleaned.is_empty() {
                    inferred.insert(param_name.clone(), cleaned.to_string());
                }
            }
        }
    }

    inferred
}
