//! Progress reporting contract.
//!
//! The reporter is an external telemetry/UI sink fed during one run. It
//! is acquired once per optimization call through [`ReporterScope`] and
//! released on every exit path by the guard's `Drop`, so concurrent runs
//! never share a dangling reporter slot. Reporter methods are infallible
//! by contract: a misbehaving sink cannot abort a run.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// One completed trial, as shown to the outside world. The parameter map
/// is the redacted copy.
#[derive(Debug, Clone)]
pub struct TrialEvaluation<'a> {
    pub trial_index: u64,
    pub score: f64,
    pub stage: &'a str,
    pub metric_name: &'a str,
    pub parameters: &'a BTreeMap<String, Value>,
}

/// Coarse run progress.
#[derive(Debug, Clone)]
pub struct EvaluationProgress<'a> {
    pub optimization_id: Uuid,
    pub message: &'a str,
    pub trials_completed: u64,
    pub max_trials: u64,
    pub best_score: Option<f64>,
}

/// External progress/telemetry sink for one optimization run.
pub trait ProgressReporter: Send + Sync {
    fn display_trial_evaluation(&self, _update: &TrialEvaluation<'_>) {}

    fn display_evaluation_progress(&self, _progress: &EvaluationProgress<'_>) {}

    /// Called when the run's reporter scope opens.
    fn scope_opened(&self, _optimization_id: Uuid) {}

    /// Called when the run's reporter scope closes, on every exit path.
    fn scope_closed(&self, _optimization_id: Uuid) {}
}

/// Reporter that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}

/// Reporter that forwards progress into the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn display_trial_evaluation(&self, update: &TrialEvaluation<'_>) {
        debug!(
            trial_index = update.trial_index,
            score = update.score,
            stage = update.stage,
            metric = update.metric_name,
            "trial evaluated"
        );
    }

    fn display_evaluation_progress(&self, progress: &EvaluationProgress<'_>) {
        info!(
            optimization_id = %progress.optimization_id,
            trials_completed = progress.trials_completed,
            max_trials = progress.max_trials,
            best_score = ?progress.best_score,
            "{}",
            progress.message
        );
    }
}

/// RAII guard tying a reporter to one optimization call.
pub struct ReporterScope<'a> {
    reporter: &'a dyn ProgressReporter,
    optimization_id: Uuid,
}

impl<'a> ReporterScope<'a> {
    pub fn open(reporter: &'a dyn ProgressReporter, optimization_id: Uuid) -> Self {
        reporter.scope_opened(optimization_id);
        Self {
            reporter,
            optimization_id,
        }
    }

    pub fn reporter(&self) -> &'a dyn ProgressReporter {
        self.reporter
    }
}

impl Drop for ReporterScope<'_> {
    fn drop(&mut self) {
        self.reporter.scope_closed(self.optimization_id);
    }
}
