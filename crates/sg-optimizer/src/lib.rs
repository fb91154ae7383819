//! # sg-optimizer
//!
//! Trial-based prompt/parameter optimization core for Spyglass.
//!
//! Provides the declarative parameter search space, the monotonic
//! round/trial history ledger, the trial objective with sensitive-value
//! redaction and scoped progress reporting, suggestion drivers, and the
//! shared baseline/early-stop/finalize loop that concrete optimization
//! algorithms plug into.

mod base;
mod driver;
mod history;
mod importance;
mod objective;
mod parameter;
mod redact;
mod reporter;
mod search;

pub use base::{
    AlgorithmResult, OptimizationAlgorithm, OptimizationContext, OptimizationLoop,
    OptimizationRequest, OptimizationResult, OptimizerConfig, STOP_REASON_BASELINE,
};
pub use driver::{AdaptiveDriver, RandomDriver, SuggestionDriver};
pub use history::{
    CandidateRecord, OptimizationHistoryState, OptimizationRound, OptimizationTrial,
    RoundCandidate, RoundHandle, STOP_REASON_COMPLETED,
};
pub use importance::parameter_importance;
pub use objective::{ScoredTrial, TrialObjective};
pub use parameter::{
    optimize_parameter, ParameterSearchAlgorithm, STAGE_GLOBAL, STAGE_LOCAL,
};
pub use redact::{SensitiveParams, REDACTED_VALUE};
pub use reporter::{
    EvaluationProgress, NullReporter, ProgressReporter, ReporterScope, TracingReporter,
    TrialEvaluation,
};
pub use search::{
    Distribution, ParamValue, ParamValues, ParameterSearchSpace, ParameterSpec, TargetPath,
    ValueScale,
};
