//! The evaluation collaborator contract.
//!
//! Scoring a candidate prompt against a dataset is a black box from the
//! optimizer's point of view: it may block on network calls, it owns its
//! retries, and its failures propagate unmodified. This module defines the
//! seam; the optimizer only bounds and forwards the concurrency parameter.

use serde_json::Value;
use std::collections::BTreeMap;

use sg_types::{ChatPrompt, Dataset, SgResult};

/// Lower bound for the per-evaluation worker pool.
pub const MIN_EVAL_THREADS: usize = 1;

/// Upper bound for the per-evaluation worker pool.
pub const MAX_EVAL_THREADS: usize = 32;

/// Clamp a requested thread count into the supported range.
pub fn clamp_eval_threads(requested: usize) -> usize {
    requested.clamp(MIN_EVAL_THREADS, MAX_EVAL_THREADS)
}

/// One evaluation call: candidate prompt(s) scored against a dataset with
/// a named metric.
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    /// Candidate prompts, keyed by prompt name.
    pub prompts: &'a BTreeMap<String, ChatPrompt>,

    /// Dataset to score against.
    pub dataset: &'a Dataset,

    /// Metric name, recorded on results and telemetry.
    pub metric_name: &'a str,

    /// Opaque agent configuration forwarded to the collaborator.
    pub agent: Option<&'a Value>,

    /// Opaque experiment configuration forwarded to the collaborator.
    pub experiment_config: Option<&'a Value>,

    /// Cap on the number of dataset items to evaluate.
    pub n_samples: Option<usize>,

    pub verbose: bool,

    /// Worker count, already clamped by the caller.
    pub n_threads: usize,
}

/// Black-box prompt scoring. Blocking; retries are the implementation's
/// own responsibility.
pub trait PromptEvaluator: Send + Sync {
    fn evaluate_prompt(&self, request: &EvaluationRequest<'_>) -> SgResult<f64>;
}

/// A per-item scoring metric used by the local batch evaluator.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Score one model output against its dataset item.
    fn score(&self, item: &Value, output: &Value) -> SgResult<f64>;
}

/// Adapter turning a closure into a [`PromptEvaluator`]. Used for stubs
/// and for callers that already have a scoring function.
pub struct FnEvaluator<F>(pub F);

impl<F> PromptEvaluator for FnEvaluator<F>
where
    F: Fn(&EvaluationRequest<'_>) -> SgResult<f64> + Send + Sync,
{
    fn evaluate_prompt(&self, request: &EvaluationRequest<'_>) -> SgResult<f64> {
        (self.0)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_clamp_bounds() {
        assert_eq!(clamp_eval_threads(0), MIN_EVAL_THREADS);
        assert_eq!(clamp_eval_threads(8), 8);
        assert_eq!(clamp_eval_threads(500), MAX_EVAL_THREADS);
    }

    #[test]
    fn fn_evaluator_forwards() {
        let evaluator = FnEvaluator(|request: &EvaluationRequest<'_>| {
            Ok(request.dataset.len() as f64)
        });

        let prompts = BTreeMap::new();
        let dataset = Dataset::new("dev", vec![serde_json::json!({}), serde_json::json!({})]);
        let request = EvaluationRequest {
            prompts: &prompts,
            dataset: &dataset,
            metric_name: "accuracy",
            agent: None,
            experiment_config: None,
            n_samples: None,
            verbose: false,
            n_threads: 4,
        };
        assert_eq!(evaluator.evaluate_prompt(&request).unwrap(), 2.0);
    }
}
