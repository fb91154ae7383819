//! The shared optimization loop every concrete algorithm plugs into.
//!
//! The loop owns baseline evaluation, early stopping, score coercion,
//! concurrency clamping, history guarantees, and result assembly. A
//! concrete algorithm supplies only its search behavior through the
//! [`OptimizationAlgorithm`] strategy trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use sg_eval::{clamp_eval_threads, EvaluationRequest, PromptEvaluator};
use sg_types::{coerce_score, ChatPrompt, Dataset, PromptInput, RawScore, SgResult};

use crate::history::{
    CandidateRecord, OptimizationHistoryState, OptimizationRound, STOP_REASON_COMPLETED,
};
use crate::reporter::{EvaluationProgress, ProgressReporter, ReporterScope};

/// Stop reason recorded when the baseline already meets the threshold.
pub const STOP_REASON_BASELINE: &str = "baseline_score_met_threshold";

/// Run-level configuration shared by every algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub optimization_id: Uuid,
    pub project_name: String,

    /// Score at or above which the run stops without searching.
    pub perfect_score: f64,

    /// Hard ceiling on the number of search trials, regardless of wall
    /// clock.
    pub max_trials: u64,

    /// Requested per-evaluation worker count (clamped before use).
    pub n_threads: usize,

    /// Cap on dataset items per evaluation.
    pub n_samples: Option<usize>,

    pub verbose: bool,

    /// Fraction of `max_trials` reserved for the local refinement stage.
    pub local_search_ratio: f64,

    /// Range-shrink factor handed to `narrow_around`.
    pub local_search_scale: f64,

    /// Explore-vs-exploit weight for the default adaptive driver.
    pub exploration_weight: f64,

    /// Seed for deterministic sampling; `None` draws from entropy.
    pub seed: Option<u64>,

    pub created_at: DateTime<Utc>,
}

impl OptimizerConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            optimization_id: Uuid::new_v4(),
            project_name: project_name.into(),
            perfect_score: 1.0,
            max_trials: 20,
            n_threads: 8,
            n_samples: None,
            verbose: false,
            local_search_ratio: 0.3,
            local_search_scale: 0.3,
            exploration_weight: 0.3,
            seed: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_optimization_id(mut self, id: Uuid) -> Self {
        self.optimization_id = id;
        self
    }

    pub fn with_perfect_score(mut self, score: f64) -> Self {
        self.perfect_score = score;
        self
    }

    pub fn with_max_trials(mut self, n: u64) -> Self {
        self.max_trials = n;
        self
    }

    pub fn with_n_threads(mut self, n: usize) -> Self {
        self.n_threads = n;
        self
    }

    pub fn with_n_samples(mut self, n: Option<usize>) -> Self {
        self.n_samples = n;
        self
    }

    pub fn with_local_search(mut self, ratio: f64, scale: f64) -> Self {
        self.local_search_ratio = ratio;
        self.local_search_scale = scale;
        self
    }

    pub fn with_exploration_weight(mut self, weight: f64) -> Self {
        self.exploration_weight = weight;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Everything a concrete algorithm gets to see for one run.
pub struct OptimizationContext<'a> {
    pub config: &'a OptimizerConfig,
    pub prompts: &'a BTreeMap<String, ChatPrompt>,
    pub dataset: &'a Dataset,
    pub metric_name: &'a str,
    pub agent: Option<&'a Value>,
    pub experiment_config: Option<&'a Value>,
    pub evaluator: &'a dyn PromptEvaluator,
    pub reporter: &'a dyn ProgressReporter,
    pub history: &'a OptimizationHistoryState,
    pub baseline_score: f64,
    /// Worker count, already clamped into the supported range.
    pub n_threads: usize,
}

impl OptimizationContext<'_> {
    /// Evaluation request for a candidate prompt set, carrying this run's
    /// dataset, metric and clamped concurrency.
    pub fn evaluation_request<'r>(
        &'r self,
        prompts: &'r BTreeMap<String, ChatPrompt>,
    ) -> EvaluationRequest<'r> {
        EvaluationRequest {
            prompts,
            dataset: self.dataset,
            metric_name: self.metric_name,
            agent: self.agent,
            experiment_config: self.experiment_config,
            n_samples: self.config.n_samples,
            verbose: self.config.verbose,
            n_threads: self.n_threads,
        }
    }
}

/// What a concrete algorithm hands back to the loop.
#[derive(Debug, Clone)]
pub struct AlgorithmResult {
    pub best_prompts: BTreeMap<String, ChatPrompt>,
    pub best_score: f64,
    pub history: Vec<OptimizationRound>,
    pub metadata: Map<String, Value>,
}

/// The algorithm plug-in contract. Concrete optimizers are independent
/// implementers sharing the baseline/early-stop/finalize skeleton, not
/// behavior via inheritance.
pub trait OptimizationAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    /// Run the search. Called only when the baseline did not already meet
    /// the threshold.
    fn run(&self, ctx: &OptimizationContext<'_>) -> SgResult<AlgorithmResult>;

    /// Effective configuration, for experiment tracking.
    fn config(&self, _ctx: &OptimizationContext<'_>) -> Value {
        json!({})
    }

    /// Static optimizer metadata (name, driver, version, ...).
    fn metadata(&self) -> Value {
        json!({})
    }

    /// Optional result-level metadata merged into `details`; may supply an
    /// authoritative `trials_completed` count.
    fn result_metadata(&self, _ctx: &OptimizationContext<'_>) -> Option<Map<String, Value>> {
        None
    }
}

/// Per-call inputs to [`OptimizationLoop::optimize`].
#[derive(Clone, Copy)]
pub struct OptimizationRequest<'a> {
    pub prompt: &'a PromptInput,
    pub dataset: &'a Dataset,
    pub metric_name: &'a str,
    pub agent: Option<&'a Value>,
    pub experiment_config: Option<&'a Value>,
    pub validation_dataset: Option<&'a Dataset>,
}

impl<'a> OptimizationRequest<'a> {
    pub fn new(prompt: &'a PromptInput, dataset: &'a Dataset, metric_name: &'a str) -> Self {
        Self {
            prompt,
            dataset,
            metric_name,
            agent: None,
            experiment_config: None,
            validation_dataset: None,
        }
    }
}

/// Unified result of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimizer: String,
    pub optimization_id: Uuid,
    pub metric_name: String,

    /// Best score seen over the whole run (baseline included).
    pub score: f64,
    pub initial_score: f64,

    /// Best prompt(s), in the same shape as the input.
    pub prompt: PromptInput,
    pub initial_prompt: PromptInput,

    pub details: Map<String, Value>,
    pub history: Vec<OptimizationRound>,
    pub timestamp: DateTime<Utc>,
}

impl OptimizationResult {
    pub fn stopped_early(&self) -> bool {
        self.details
            .get("stopped_early")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn trials_completed(&self) -> u64 {
        self.details
            .get("trials_completed")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// The shared state machine:
/// `INIT -> BASELINE_EVAL -> {EARLY_STOP | RUN_OPTIMIZATION} -> FINALIZE`.
pub struct OptimizationLoop {
    config: OptimizerConfig,
}

impl OptimizationLoop {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(
        &self,
        algorithm: &dyn OptimizationAlgorithm,
        request: &OptimizationRequest<'_>,
        evaluator: &dyn PromptEvaluator,
        reporter: &dyn ProgressReporter,
    ) -> SgResult<OptimizationResult> {
        // INIT: validate the argument shape before any evaluation runs.
        request.prompt.validate()?;
        let named = request.prompt.to_named();
        let n_threads = clamp_eval_threads(self.config.n_threads);
        let history = OptimizationHistoryState::new();

        let scope = ReporterScope::open(reporter, self.config.optimization_id);

        info!(
            optimizer = algorithm.name(),
            optimization_id = %self.config.optimization_id,
            project = %self.config.project_name,
            metric = request.metric_name,
            prompts = named.len(),
            "starting optimization run"
        );

        // BASELINE_EVAL: score the unmodified prompt(s).
        let raw_baseline = evaluator.evaluate_prompt(&EvaluationRequest {
            prompts: &named,
            dataset: request.dataset,
            metric_name: request.metric_name,
            agent: request.agent,
            experiment_config: request.experiment_config,
            n_samples: self.config.n_samples,
            verbose: self.config.verbose,
            n_threads,
        })?;
        let baseline_score = coerce_score(&RawScore::Float(raw_baseline))?;

        scope
            .reporter()
            .display_evaluation_progress(&EvaluationProgress {
                optimization_id: self.config.optimization_id,
                message: "baseline evaluation completed",
                trials_completed: 1,
                max_trials: self.config.max_trials,
                best_score: Some(baseline_score),
            });

        let ctx = OptimizationContext {
            config: &self.config,
            prompts: &named,
            dataset: request.dataset,
            metric_name: request.metric_name,
            agent: request.agent,
            experiment_config: request.experiment_config,
            evaluator,
            reporter: scope.reporter(),
            history: &history,
            baseline_score,
            n_threads,
        };

        // EARLY_STOP: the baseline already meets the threshold.
        if baseline_score >= self.config.perfect_score {
            info!(
                baseline_score,
                perfect_score = self.config.perfect_score,
                "baseline met the perfect-score threshold; skipping search"
            );

            let handle = history.start_round(0);
            history.record_trial(
                handle,
                baseline_score,
                Some(CandidateRecord::prompts(&named)),
                BTreeMap::new(),
            );
            history.mark_stopped(handle, STOP_REASON_BASELINE);
            history.end_round(handle, baseline_score);

            let mut details = Map::new();
            details.insert("stopped_early".into(), json!(true));
            details.insert("stop_reason".into(), json!(STOP_REASON_BASELINE));
            details.insert("perfect_score".into(), json!(self.config.perfect_score));

            let mut trials_completed: u64 = 1;
            if let Some(meta) = algorithm.result_metadata(&ctx) {
                if let Some(n) = meta.get("trials_completed").and_then(Value::as_u64) {
                    trials_completed = trials_completed.max(n);
                }
                merge_metadata(&mut details, meta);
            }
            let entries = history.get_entries();
            details.insert("trials_completed".into(), json!(trials_completed));
            details.insert("rounds_completed".into(), json!(entries.len()));

            return self.finalize(
                algorithm,
                request,
                named.clone(),
                baseline_score,
                baseline_score,
                details,
                entries,
                evaluator,
                n_threads,
            );
        }

        // RUN_OPTIMIZATION: delegate to the pluggable algorithm.
        let AlgorithmResult {
            best_prompts,
            best_score,
            history: algorithm_history,
            metadata,
        } = algorithm.run(&ctx)?;
        let algorithm_best = coerce_score(&RawScore::Float(best_score))?;

        // Sticky best bookkeeping: once a candidate scores +inf it stays
        // best for the run; a search that never beats the baseline falls
        // back to the unmodified prompts.
        let (final_prompts, final_score) = if algorithm_best >= baseline_score {
            (best_prompts, algorithm_best)
        } else {
            (named.clone(), baseline_score)
        };

        let mut entries = if algorithm_history.is_empty() {
            history.get_entries()
        } else {
            algorithm_history
        };
        if entries.is_empty() {
            warn!("algorithm returned an empty history; synthesizing a fallback entry");
            entries.push(fallback_round(final_score, &final_prompts));
        }

        let recorded: u64 = entries.iter().map(|round| round.trials.len() as u64).sum();
        let mut trials_completed = recorded + 1; // baseline always counts

        let mut details = Map::new();
        details.insert("stopped_early".into(), json!(false));
        details.insert("stop_reason".into(), json!(STOP_REASON_COMPLETED));
        details.insert("perfect_score".into(), json!(self.config.perfect_score));

        if let Some(n) = metadata.get("trials_completed").and_then(Value::as_u64) {
            trials_completed = trials_completed.max(n);
        }
        merge_metadata(&mut details, metadata);
        if let Some(meta) = algorithm.result_metadata(&ctx) {
            if let Some(n) = meta.get("trials_completed").and_then(Value::as_u64) {
                trials_completed = trials_completed.max(n);
            }
            merge_metadata(&mut details, meta);
        }
        details.insert("trials_completed".into(), json!(trials_completed));
        details.insert("rounds_completed".into(), json!(entries.len()));

        self.finalize(
            algorithm,
            request,
            final_prompts,
            final_score,
            baseline_score,
            details,
            entries,
            evaluator,
            n_threads,
        )
    }

    // FINALIZE: assemble the unified result in the input's shape.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        algorithm: &dyn OptimizationAlgorithm,
        request: &OptimizationRequest<'_>,
        best_prompts: BTreeMap<String, ChatPrompt>,
        score: f64,
        initial_score: f64,
        mut details: Map<String, Value>,
        history: Vec<OptimizationRound>,
        evaluator: &dyn PromptEvaluator,
        n_threads: usize,
    ) -> SgResult<OptimizationResult> {
        if let Some(validation) = request.validation_dataset {
            let raw = evaluator.evaluate_prompt(&EvaluationRequest {
                prompts: &best_prompts,
                dataset: validation,
                metric_name: request.metric_name,
                agent: request.agent,
                experiment_config: request.experiment_config,
                n_samples: self.config.n_samples,
                verbose: self.config.verbose,
                n_threads,
            })?;
            let validation_score = coerce_score(&RawScore::Float(raw))?;
            details.insert("validation_score".into(), json!(validation_score));
        }

        let optimizer_metadata = algorithm.metadata();
        if optimizer_metadata != json!({}) {
            details
                .entry("optimizer_metadata".to_string())
                .or_insert(optimizer_metadata);
        }

        info!(
            optimizer = algorithm.name(),
            score,
            initial_score,
            rounds = history.len(),
            "optimization run finished"
        );

        Ok(OptimizationResult {
            optimizer: algorithm.name().to_string(),
            optimization_id: self.config.optimization_id,
            metric_name: request.metric_name.to_string(),
            score,
            initial_score,
            prompt: request.prompt.reshape(best_prompts),
            initial_prompt: request.prompt.clone(),
            details,
            history,
            timestamp: Utc::now(),
        })
    }
}

/// Algorithm metadata merges under the loop-owned keys: an algorithm can
/// add detail but never overwrite the loop's own bookkeeping.
fn merge_metadata(details: &mut Map<String, Value>, metadata: Map<String, Value>) {
    for (key, value) in metadata {
        details.entry(key).or_insert(value);
    }
}

fn fallback_round(score: f64, prompts: &BTreeMap<String, ChatPrompt>) -> OptimizationRound {
    OptimizationRound {
        round_index: 0,
        stage: None,
        trials: vec![crate::history::OptimizationTrial {
            trial_index: 0,
            score,
            candidate: Some(CandidateRecord::prompts(prompts)),
            parameters: BTreeMap::new(),
        }],
        candidates: Vec::new(),
        best_score: Some(score),
        stop_reason: STOP_REASON_COMPLETED.to_string(),
        stopped: false,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use sg_eval::FnEvaluator;
    use sg_types::{ChatMessage, SgError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopAlgorithm;

    impl OptimizationAlgorithm for NoopAlgorithm {
        fn name(&self) -> &str {
            "noop"
        }

        fn run(&self, ctx: &OptimizationContext<'_>) -> SgResult<AlgorithmResult> {
            Ok(AlgorithmResult {
                best_prompts: ctx.prompts.clone(),
                best_score: ctx.baseline_score,
                history: Vec::new(),
                metadata: Map::new(),
            })
        }
    }

    struct PanickingAlgorithm;

    impl OptimizationAlgorithm for PanickingAlgorithm {
        fn name(&self) -> &str {
            "panicking"
        }

        fn run(&self, _ctx: &OptimizationContext<'_>) -> SgResult<AlgorithmResult> {
            panic!("run_optimization must not be called after early stop");
        }
    }

    fn sample_input() -> PromptInput {
        PromptInput::Single(
            ChatPrompt::new("qa")
                .with_message(ChatMessage::system("Answer concisely."))
                .with_model("gpt-4o-mini"),
        )
    }

    fn sample_dataset() -> Dataset {
        Dataset::new("dev", vec![serde_json::json!({"q": "hi"})])
    }

    fn const_evaluator(score: f64) -> FnEvaluator<impl Fn(&EvaluationRequest<'_>) -> SgResult<f64>>
    {
        FnEvaluator(move |_request: &EvaluationRequest<'_>| Ok(score))
    }

    #[test]
    fn early_stop_when_baseline_meets_threshold() {
        let input = sample_input();
        let dataset = sample_dataset();
        let request = OptimizationRequest::new(&input, &dataset, "accuracy");

        let run = OptimizationLoop::new(
            OptimizerConfig::new("unit-tests").with_perfect_score(0.95),
        );
        let result = run
            .optimize(
                &PanickingAlgorithm,
                &request,
                &const_evaluator(0.96),
                &NullReporter,
            )
            .unwrap();

        assert!(result.stopped_early());
        assert_eq!(
            result.details["stop_reason"],
            json!(STOP_REASON_BASELINE)
        );
        assert_eq!(result.score, 0.96);
        assert_eq!(result.initial_score, 0.96);
        assert_eq!(result.trials_completed(), 1);
        assert!(!result.history.is_empty());
        assert!(result.history[0].stopped);
    }

    #[test]
    fn empty_prompt_set_fails_before_any_evaluation() {
        let calls = AtomicUsize::new(0);
        let evaluator = FnEvaluator(|_request: &EvaluationRequest<'_>| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.5)
        });

        let input = PromptInput::Named(BTreeMap::new());
        let dataset = sample_dataset();
        let request = OptimizationRequest::new(&input, &dataset, "accuracy");

        let run = OptimizationLoop::new(OptimizerConfig::new("unit-tests"));
        let error = run
            .optimize(&NoopAlgorithm, &request, &evaluator, &NullReporter)
            .unwrap_err();

        assert!(matches!(error, SgError::Argument(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_algorithm_history_gets_a_fallback_entry() {
        let input = sample_input();
        let dataset = sample_dataset();
        let request = OptimizationRequest::new(&input, &dataset, "accuracy");

        let run = OptimizationLoop::new(
            OptimizerConfig::new("unit-tests").with_perfect_score(2.0),
        );
        let result = run
            .optimize(
                &NoopAlgorithm,
                &request,
                &const_evaluator(0.4),
                &NullReporter,
            )
            .unwrap();

        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].best_score, Some(0.4));
        assert!(!result.stopped_early());
    }

    #[test]
    fn nan_baseline_is_a_score_error() {
        let input = sample_input();
        let dataset = sample_dataset();
        let request = OptimizationRequest::new(&input, &dataset, "accuracy");

        let run = OptimizationLoop::new(OptimizerConfig::new("unit-tests"));
        let error = run
            .optimize(
                &NoopAlgorithm,
                &request,
                &const_evaluator(f64::NAN),
                &NullReporter,
            )
            .unwrap_err();

        assert!(matches!(error, SgError::Score(_)));
        assert!(error.to_string().contains("NaN"));
    }

    #[test]
    fn result_shape_matches_input_shape() {
        let dataset = sample_dataset();

        // Single in, single out.
        let single = sample_input();
        let request = OptimizationRequest::new(&single, &dataset, "accuracy");
        let run = OptimizationLoop::new(
            OptimizerConfig::new("unit-tests").with_perfect_score(0.1),
        );
        let result = run
            .optimize(
                &NoopAlgorithm,
                &request,
                &const_evaluator(0.5),
                &NullReporter,
            )
            .unwrap();
        assert!(result.prompt.is_single());

        // Mapping in, mapping out.
        let mut prompts = BTreeMap::new();
        prompts.insert("qa".to_string(), ChatPrompt::new("qa"));
        let named = PromptInput::Named(prompts);
        let request = OptimizationRequest::new(&named, &dataset, "accuracy");
        let result = run
            .optimize(
                &NoopAlgorithm,
                &request,
                &const_evaluator(0.5),
                &NullReporter,
            )
            .unwrap();
        assert!(!result.prompt.is_single());
    }

    #[test]
    fn validation_dataset_score_lands_in_details() {
        let input = sample_input();
        let dataset = sample_dataset();
        let validation = Dataset::new("holdout", vec![serde_json::json!({"q": "bye"})]);
        let mut request = OptimizationRequest::new(&input, &dataset, "accuracy");
        request.validation_dataset = Some(&validation);

        let evaluator = FnEvaluator(|request: &EvaluationRequest<'_>| {
            Ok(if request.dataset.name == "holdout" { 0.7 } else { 0.9 })
        });

        let run = OptimizationLoop::new(
            OptimizerConfig::new("unit-tests").with_perfect_score(0.8),
        );
        let result = run
            .optimize(&PanickingAlgorithm, &request, &evaluator, &NullReporter)
            .unwrap();

        assert_eq!(result.details["validation_score"], json!(0.7));
    }
}
