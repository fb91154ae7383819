//! Staged parameter search: one global stage over the full declared
//! space, then (optionally) one local stage over a space narrowed around
//! the best point found so far.

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use sg_eval::PromptEvaluator;
use sg_types::SgResult;

use crate::base::{
    AlgorithmResult, OptimizationAlgorithm, OptimizationContext, OptimizationLoop,
    OptimizationRequest, OptimizationResult, OptimizerConfig,
};
use crate::driver::{AdaptiveDriver, SuggestionDriver};
use crate::importance::parameter_importance;
use crate::objective::{ScoredTrial, TrialObjective};
use crate::redact::SensitiveParams;
use crate::reporter::{EvaluationProgress, ProgressReporter};
use crate::search::ParameterSearchSpace;

/// Stage name for the full-space sampling pass.
pub const STAGE_GLOBAL: &str = "global";

/// Stage name for the narrowed refinement pass.
pub const STAGE_LOCAL: &str = "stage_1";

/// Concrete [`OptimizationAlgorithm`] tuning prompt/model parameters
/// through a suggestion driver.
pub struct ParameterSearchAlgorithm {
    space: ParameterSearchSpace,
    base_model_kwargs: Map<String, Value>,
    sensitive: SensitiveParams,
}

impl ParameterSearchAlgorithm {
    pub fn new(space: ParameterSearchSpace) -> Self {
        Self {
            space,
            base_model_kwargs: Map::new(),
            sensitive: SensitiveParams::default(),
        }
    }

    pub fn with_base_model_kwargs(mut self, base: Map<String, Value>) -> Self {
        self.base_model_kwargs = base;
        self
    }

    pub fn with_sensitive_params(mut self, sensitive: SensitiveParams) -> Self {
        self.sensitive = sensitive;
        self
    }

    #[allow(clippy::too_many_arguments)]
    fn run_stage(
        &self,
        ctx: &OptimizationContext<'_>,
        space: &ParameterSearchSpace,
        stage: &str,
        round_index: u64,
        budget: u64,
        driver: &mut dyn SuggestionDriver,
        all_trials: &mut Vec<ScoredTrial>,
        best: &mut Option<ScoredTrial>,
    ) -> SgResult<()> {
        let handle = ctx.history.start_round_with_stage(round_index, stage);
        let objective = TrialObjective::new(
            ctx,
            space,
            &self.base_model_kwargs,
            &self.sensitive,
            stage,
            handle,
        );

        let mut stage_best: Option<f64> = None;
        for _ in 0..budget {
            let trial = match objective.evaluate_trial(driver) {
                Ok(trial) => trial,
                Err(error) => {
                    // Seal the partial round before the failure surfaces.
                    ctx.history.mark_stopped(handle, "evaluation_failed");
                    ctx.history
                        .end_round(handle, stage_best.unwrap_or(f64::NEG_INFINITY));
                    return Err(error);
                }
            };

            stage_best = Some(stage_best.map_or(trial.score, |b| b.max(trial.score)));
            let improves = best
                .as_ref()
                .map_or(true, |incumbent| trial.score > incumbent.score);
            if improves {
                *best = Some(trial.clone());
            }

            ctx.reporter
                .display_evaluation_progress(&EvaluationProgress {
                    optimization_id: ctx.config.optimization_id,
                    message: "trial completed",
                    trials_completed: ctx.history.trial_count(),
                    max_trials: ctx.config.max_trials,
                    best_score: best.as_ref().map(|b| b.score),
                });
            all_trials.push(trial);
        }

        ctx.history
            .end_round(handle, stage_best.unwrap_or(f64::NEG_INFINITY));
        Ok(())
    }
}

impl OptimizationAlgorithm for ParameterSearchAlgorithm {
    fn name(&self) -> &str {
        "parameter_search"
    }

    fn run(&self, ctx: &OptimizationContext<'_>) -> SgResult<AlgorithmResult> {
        let prompt_names: Vec<&str> = ctx.prompts.keys().map(String::as_str).collect();
        let space = self.space.expand_for_prompts(&prompt_names);

        if space.is_empty() {
            debug!("parameter space is empty; nothing to search");
            let mut metadata = Map::new();
            metadata.insert("trials_completed".into(), json!(0));
            return Ok(AlgorithmResult {
                best_prompts: ctx.prompts.clone(),
                best_score: ctx.baseline_score,
                history: ctx.history.get_entries(),
                metadata,
            });
        }

        let max_trials = ctx.config.max_trials.max(1);
        let mut local_trials = if space.has_numeric() {
            (max_trials as f64 * ctx.config.local_search_ratio.clamp(0.0, 1.0)).round() as u64
        } else {
            0
        };
        // The global stage always keeps at least one trial.
        local_trials = local_trials.min(max_trials.saturating_sub(1));
        let global_trials = max_trials - local_trials;

        let mut driver: Box<dyn SuggestionDriver> = match ctx.config.seed {
            Some(seed) => Box::new(AdaptiveDriver::seeded(ctx.config.exploration_weight, seed)),
            None => Box::new(AdaptiveDriver::new(ctx.config.exploration_weight)),
        };

        info!(
            parameters = space.len(),
            global_trials,
            local_trials,
            driver = driver.name(),
            "starting parameter search"
        );

        let mut all_trials: Vec<ScoredTrial> = Vec::new();
        let mut best: Option<ScoredTrial> = None;

        self.run_stage(
            ctx,
            &space,
            STAGE_GLOBAL,
            0,
            global_trials,
            driver.as_mut(),
            &mut all_trials,
            &mut best,
        )?;

        if local_trials > 0 {
            if let Some(incumbent) = best.clone() {
                let narrowed = space.narrow_around(&incumbent.values, ctx.config.local_search_scale);
                info!(
                    stage = STAGE_LOCAL,
                    center_score = incumbent.score,
                    scale = ctx.config.local_search_scale,
                    "narrowing search space around the incumbent best"
                );
                self.run_stage(
                    ctx,
                    &narrowed,
                    STAGE_LOCAL,
                    1,
                    local_trials,
                    driver.as_mut(),
                    &mut all_trials,
                    &mut best,
                )?;
            }
        }

        // Best-effort analytics: failures inside degrade to an empty map.
        let importance = parameter_importance(&space, &all_trials);

        let mut metadata = Map::new();
        metadata.insert("trials_completed".into(), json!(all_trials.len() as u64 + 1));
        metadata.insert("driver".into(), json!(driver.name()));
        if !importance.is_empty() {
            metadata.insert("parameter_importance".into(), json!(importance));
        }

        let (best_prompts, best_score) = match best {
            Some(trial) => (trial.prompts, trial.score),
            None => (ctx.prompts.clone(), ctx.baseline_score),
        };

        Ok(AlgorithmResult {
            best_prompts,
            best_score,
            history: ctx.history.get_entries(),
            metadata,
        })
    }

    fn config(&self, ctx: &OptimizationContext<'_>) -> Value {
        json!({
            "parameter_space": self.space.describe(),
            "max_trials": ctx.config.max_trials,
            "local_search_ratio": ctx.config.local_search_ratio,
            "local_search_scale": ctx.config.local_search_scale,
            "n_samples": ctx.config.n_samples,
            "n_threads": ctx.n_threads,
        })
    }

    fn metadata(&self) -> Value {
        json!({
            "name": "parameter_search",
            "driver": "adaptive",
        })
    }
}

/// Tune prompt/model parameters over a declarative search space and
/// return the unified optimization result.
pub fn optimize_parameter(
    config: OptimizerConfig,
    parameter_space: ParameterSearchSpace,
    request: &OptimizationRequest<'_>,
    evaluator: &dyn PromptEvaluator,
    reporter: &dyn ProgressReporter,
) -> SgResult<OptimizationResult> {
    let algorithm = ParameterSearchAlgorithm::new(parameter_space);
    OptimizationLoop::new(config).optimize(&algorithm, request, evaluator, reporter)
}
