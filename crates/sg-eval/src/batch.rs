//! Bounded-concurrency batch evaluation.
//!
//! Fans dataset items across a pool of worker threads fed by a
//! crossbeam-channel work queue. Each unit of work is a blocking call into
//! the candidate runner (typically a network round trip), so plain threads
//! bound the concurrency. Distinct evaluation calls get independent pools.

use crossbeam_channel::unbounded;
use serde_json::Value;
use std::collections::BTreeMap;
use std::thread;
use tracing::debug;

use sg_types::{ChatPrompt, EvalError, SgError, SgResult};

use crate::evaluator::{clamp_eval_threads, EvaluationRequest, Metric, PromptEvaluator};

/// Executes candidate prompt(s) against one dataset item and returns the
/// model output. This is the blocking LLM-call seam; implementations own
/// their retries and provider plumbing.
pub trait CandidateRunner: Send + Sync {
    fn run(&self, prompts: &BTreeMap<String, ChatPrompt>, item: &Value) -> SgResult<Value>;
}

impl<F> CandidateRunner for F
where
    F: Fn(&BTreeMap<String, ChatPrompt>, &Value) -> SgResult<Value> + Send + Sync,
{
    fn run(&self, prompts: &BTreeMap<String, ChatPrompt>, item: &Value) -> SgResult<Value> {
        self(prompts, item)
    }
}

/// A local [`PromptEvaluator`] that runs each dataset item through a
/// candidate runner, scores the output with a metric, and averages item
/// scores into the candidate score.
pub struct BatchEvaluator {
    runner: Box<dyn CandidateRunner>,
    metric: Box<dyn Metric>,
}

impl BatchEvaluator {
    pub fn new(runner: Box<dyn CandidateRunner>, metric: Box<dyn Metric>) -> Self {
        Self { runner, metric }
    }

    fn score_item(&self, prompts: &BTreeMap<String, ChatPrompt>, item: &Value) -> SgResult<f64> {
        let output = self.runner.run(prompts, item)?;
        self.metric.score(item, &output)
    }
}

impl PromptEvaluator for BatchEvaluator {
    fn evaluate_prompt(&self, request: &EvaluationRequest<'_>) -> SgResult<f64> {
        let items = request.dataset.sample_items(request.n_samples);
        if items.is_empty() {
            return Err(SgError::Evaluation(EvalError::failed(format!(
                "dataset '{}' has no items to evaluate",
                request.dataset.name
            ))));
        }

        let n_threads = clamp_eval_threads(request.n_threads).min(items.len());
        debug!(
            dataset = %request.dataset.name,
            metric = %request.metric_name,
            items = items.len(),
            n_threads,
            "starting batch evaluation"
        );

        let (work_tx, work_rx) = unbounded::<&Value>();
        let (result_tx, result_rx) = unbounded::<SgResult<f64>>();

        for item in items {
            // Receivers outlive this loop; an unbounded queue cannot refuse.
            let _ = work_tx.send(item);
        }
        drop(work_tx);

        thread::scope(|scope| {
            for _ in 0..n_threads {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for item in work_rx.iter() {
                        let scored = self.score_item(request.prompts, item);
                        if result_tx.send(scored).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);
        });

        let mut total = 0.0;
        let mut count = 0usize;
        for scored in result_rx.iter() {
            total += scored?;
            count += 1;
        }

        let mean = total / count as f64;
        debug!(score = mean, items = count, "batch evaluation finished");
        Ok(mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sg_types::Dataset;

    struct ExactMatch;

    impl Metric for ExactMatch {
        fn name(&self) -> &str {
            "exact_match"
        }

        fn score(&self, item: &Value, output: &Value) -> SgResult<f64> {
            let expected = item.get("expected").cloned().unwrap_or(Value::Null);
            Ok(if expected == *output { 1.0 } else { 0.0 })
        }
    }

    fn echo_runner() -> Box<dyn CandidateRunner> {
        Box::new(|_prompts: &BTreeMap<String, ChatPrompt>, item: &Value| {
            Ok(item.get("answer").cloned().unwrap_or(Value::Null))
        })
    }

    fn request<'a>(
        prompts: &'a BTreeMap<String, ChatPrompt>,
        dataset: &'a Dataset,
        n_samples: Option<usize>,
    ) -> EvaluationRequest<'a> {
        EvaluationRequest {
            prompts,
            dataset,
            metric_name: "exact_match",
            agent: None,
            experiment_config: None,
            n_samples,
            verbose: false,
            n_threads: 4,
        }
    }

    #[test]
    fn averages_item_scores() {
        let evaluator = BatchEvaluator::new(echo_runner(), Box::new(ExactMatch));
        let prompts = BTreeMap::new();
        let dataset = Dataset::new(
            "dev",
            vec![
                json!({"answer": "yes", "expected": "yes"}),
                json!({"answer": "no", "expected": "yes"}),
                json!({"answer": "yes", "expected": "yes"}),
                json!({"answer": "yes", "expected": "yes"}),
            ],
        );

        let score = evaluator
            .evaluate_prompt(&request(&prompts, &dataset, None))
            .unwrap();
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn honors_n_samples_cap() {
        let evaluator = BatchEvaluator::new(echo_runner(), Box::new(ExactMatch));
        let prompts = BTreeMap::new();
        let dataset = Dataset::new(
            "dev",
            vec![
                json!({"answer": "yes", "expected": "yes"}),
                json!({"answer": "no", "expected": "yes"}),
            ],
        );

        let score = evaluator
            .evaluate_prompt(&request(&prompts, &dataset, Some(1)))
            .unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn empty_dataset_is_an_evaluation_error() {
        let evaluator = BatchEvaluator::new(echo_runner(), Box::new(ExactMatch));
        let prompts = BTreeMap::new();
        let dataset = Dataset::new("empty", vec![]);

        let error = evaluator
            .evaluate_prompt(&request(&prompts, &dataset, None))
            .unwrap_err();
        assert!(matches!(error, SgError::Evaluation(_)));
    }

    #[test]
    fn runner_errors_propagate_unmodified() {
        let failing: Box<dyn CandidateRunner> =
            Box::new(|_: &BTreeMap<String, ChatPrompt>, _: &Value| {
                Err(SgError::Evaluation(EvalError::failed("provider timeout")))
            });
        let evaluator = BatchEvaluator::new(failing, Box::new(ExactMatch));
        let prompts = BTreeMap::new();
        let dataset = Dataset::new("dev", vec![json!({})]);

        let error = evaluator
            .evaluate_prompt(&request(&prompts, &dataset, None))
            .unwrap_err();
        assert!(error.to_string().contains("provider timeout"));
    }

    #[test]
    fn many_items_with_few_threads_all_complete() {
        let evaluator = BatchEvaluator::new(echo_runner(), Box::new(ExactMatch));
        let prompts = BTreeMap::new();
        let items: Vec<Value> = (0..50)
            .map(|i| json!({"answer": i, "expected": i}))
            .collect();
        let dataset = Dataset::new("dev", items);

        let mut req = request(&prompts, &dataset, None);
        req.n_threads = 2;
        assert_eq!(evaluator.evaluate_prompt(&req).unwrap(), 1.0);
    }
}
