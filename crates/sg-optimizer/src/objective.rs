//! Bridges one sampled search-space point to a scored, recorded,
//! reported trial.
//!
//! The external driver stays a black box: the objective asks it for one
//! value per parameter, builds candidate prompts, scores them through the
//! evaluation collaborator, and writes the redacted copy into history and
//! telemetry. The real sampled values only ever feed the evaluated
//! candidate and the driver's feedback hook.

use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;

use sg_types::{coerce_score, ChatPrompt, RawScore, SgResult};

use crate::base::OptimizationContext;
use crate::driver::SuggestionDriver;
use crate::history::{CandidateRecord, RoundHandle};
use crate::redact::SensitiveParams;
use crate::reporter::TrialEvaluation;
use crate::search::{Distribution, ParamValue, ParamValues, ParameterSearchSpace};

/// One completed trial as seen by the algorithm: raw sampled values plus
/// the resulting candidate prompts and coerced score.
#[derive(Debug, Clone)]
pub struct ScoredTrial {
    pub trial_index: u64,
    pub score: f64,
    pub values: ParamValues,
    pub prompts: BTreeMap<String, ChatPrompt>,
}

/// Per-stage objective function handed to the suggestion driver.
pub struct TrialObjective<'a> {
    ctx: &'a OptimizationContext<'a>,
    space: &'a ParameterSearchSpace,
    base_model_kwargs: &'a Map<String, Value>,
    sensitive: &'a SensitiveParams,
    stage: &'a str,
    round: RoundHandle,
}

impl<'a> TrialObjective<'a> {
    pub fn new(
        ctx: &'a OptimizationContext<'a>,
        space: &'a ParameterSearchSpace,
        base_model_kwargs: &'a Map<String, Value>,
        sensitive: &'a SensitiveParams,
        stage: &'a str,
        round: RoundHandle,
    ) -> Self {
        Self {
            ctx,
            space,
            base_model_kwargs,
            sensitive,
            stage,
            round,
        }
    }

    /// Run one trial: sample, apply, evaluate, record, report.
    ///
    /// Evaluation failures propagate unmodified; nothing is recorded for
    /// a failed trial.
    pub fn evaluate_trial(&self, driver: &mut dyn SuggestionDriver) -> SgResult<ScoredTrial> {
        let values = self.sample(driver);
        let candidates = self
            .space
            .apply_to_prompts(self.ctx.prompts, &values, self.base_model_kwargs);

        let raw = self
            .ctx
            .evaluator
            .evaluate_prompt(&self.ctx.evaluation_request(&candidates))?;
        let score = coerce_score(&RawScore::Float(raw))?;

        let redacted = self.sensitive.redact_values(&values);
        let trial_index = self.ctx.history.record_trial(
            self.round,
            score,
            Some(CandidateRecord::prompts(&candidates)),
            redacted.clone(),
        );

        self.ctx
            .reporter
            .display_trial_evaluation(&TrialEvaluation {
                trial_index,
                score,
                stage: self.stage,
                metric_name: self.ctx.metric_name,
                parameters: &redacted,
            });
        driver.observe(&values, score);

        Ok(ScoredTrial {
            trial_index,
            score,
            values,
            prompts: candidates,
        })
    }

    /// One suggestion call per spec in the active space.
    fn sample(&self, driver: &mut dyn SuggestionDriver) -> ParamValues {
        let mut values = ParamValues::new();
        for spec in self.space.parameters() {
            let value = match &spec.distribution {
                Distribution::Float {
                    low,
                    high,
                    step,
                    scale,
                } => ParamValue::Float(driver.suggest_float(&spec.name, *low, *high, *step, *scale)),
                Distribution::Int { low, high, step } => {
                    ParamValue::Int(driver.suggest_int(&spec.name, *low, *high, *step))
                }
                Distribution::Categorical { choices } | Distribution::Bool { choices } => {
                    ParamValue::Json(driver.suggest_choice(&spec.name, choices))
                }
            };
            values.insert(spec.name.clone(), value);
        }
        values
    }
}
