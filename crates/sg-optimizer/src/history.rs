//! Append-only round/trial history ledger.
//!
//! One [`OptimizationHistoryState`] exists per optimization run. It owns
//! the global trial counter: trial indices are strictly increasing across
//! the entire run, independent of round boundaries, and are never reused.
//! The inner state sits behind a mutex so evaluation threads can record
//! trials directly under the evaluator's concurrency bound.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use sg_types::ChatPrompt;

/// Stop reason written by `end_round` when nothing marked the round
/// otherwise.
pub const STOP_REASON_COMPLETED: &str = "completed";

/// A recorded candidate, normalized once at record time.
///
/// Bare scalars are wrapped as `{"value": scalar}` so every candidate
/// payload is a mapping; the tag says how to read it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum CandidateRecord {
    Prompt(Value),
    Scalar(Value),
    Raw(Value),
}

impl CandidateRecord {
    pub fn prompt(prompt: &ChatPrompt) -> Self {
        Self::Prompt(serde_json::to_value(prompt).unwrap_or(Value::Null))
    }

    pub fn prompts(prompts: &BTreeMap<String, ChatPrompt>) -> Self {
        Self::Prompt(serde_json::to_value(prompts).unwrap_or(Value::Null))
    }

    /// Normalize an arbitrary payload: mappings record as-is, everything
    /// else wraps as `{"value": scalar}`.
    pub fn normalize(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Raw(Value::Object(map)),
            scalar => Self::Scalar(serde_json::json!({ "value": scalar })),
        }
    }
}

/// One sampled configuration point, evaluated once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationTrial {
    /// Globally monotonic index, assigned on record.
    pub trial_index: u64,

    /// Coerced score; may be ±infinity.
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateRecord>,

    /// Externally visible parameter map (sensitive values already
    /// redacted by the caller).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

/// A round-level candidate summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundCandidate {
    pub candidate: CandidateRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

/// A logical grouping of trials: one generation, one search stage, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRound {
    pub round_index: u64,

    /// Originating stage name ("global", "stage_1", ...), when the
    /// algorithm runs staged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    pub trials: Vec<OptimizationTrial>,
    pub candidates: Vec<RoundCandidate>,
    pub best_score: Option<f64>,
    pub stop_reason: String,
    pub stopped: bool,
    pub timestamp: DateTime<Utc>,
}

impl OptimizationRound {
    fn open(round_index: u64, stage: Option<String>) -> Self {
        Self {
            round_index,
            stage,
            trials: Vec::new(),
            candidates: Vec::new(),
            best_score: None,
            stop_reason: STOP_REASON_COMPLETED.to_string(),
            stopped: false,
            timestamp: Utc::now(),
        }
    }
}

/// Handle to a round opened on a [`OptimizationHistoryState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundHandle(usize);

#[derive(Debug, Default)]
struct HistoryInner {
    rounds: Vec<OptimizationRound>,
    next_trial_index: u64,
}

/// Process-scoped ledger for one optimization run.
#[derive(Debug, Default)]
pub struct OptimizationHistoryState {
    inner: Mutex<HistoryInner>,
}

impl OptimizationHistoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round and return its handle.
    pub fn start_round(&self, round_index: u64) -> RoundHandle {
        self.start_round_with_stage_impl(round_index, None)
    }

    /// Open a round attributed to a named search stage.
    pub fn start_round_with_stage(
        &self,
        round_index: u64,
        stage: impl Into<String>,
    ) -> RoundHandle {
        self.start_round_with_stage_impl(round_index, Some(stage.into()))
    }

    fn start_round_with_stage_impl(&self, round_index: u64, stage: Option<String>) -> RoundHandle {
        let mut inner = self.inner.lock();
        inner.rounds.push(OptimizationRound::open(round_index, stage));
        RoundHandle(inner.rounds.len() - 1)
    }

    /// Record a trial in the given round, assigning the next global trial
    /// index. Returns the assigned index.
    pub fn record_trial(
        &self,
        handle: RoundHandle,
        score: f64,
        candidate: Option<CandidateRecord>,
        parameters: BTreeMap<String, Value>,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let trial_index = inner.next_trial_index;
        inner.next_trial_index += 1;
        if let Some(round) = inner.rounds.get_mut(handle.0) {
            round.trials.push(OptimizationTrial {
                trial_index,
                score,
                candidate,
                parameters,
            });
        }
        trial_index
    }

    /// Attach a round-level candidate summary.
    pub fn add_round_candidate(
        &self,
        handle: RoundHandle,
        candidate: CandidateRecord,
        score: Option<f64>,
        metrics: BTreeMap<String, f64>,
    ) {
        let mut inner = self.inner.lock();
        if let Some(round) = inner.rounds.get_mut(handle.0) {
            round.candidates.push(RoundCandidate {
                candidate,
                score,
                metrics,
            });
        }
    }

    /// Mark a round as stopped before `end_round` seals it.
    pub fn mark_stopped(&self, handle: RoundHandle, reason: impl Into<String>) {
        let mut inner = self.inner.lock();
        if let Some(round) = inner.rounds.get_mut(handle.0) {
            round.stopped = true;
            round.stop_reason = reason.into();
        }
    }

    /// Close a round with its best score. Keeps an earlier `mark_stopped`
    /// reason; otherwise the round reads "completed".
    pub fn end_round(&self, handle: RoundHandle, best_score: f64) {
        let mut inner = self.inner.lock();
        if let Some(round) = inner.rounds.get_mut(handle.0) {
            round.best_score = Some(best_score);
        }
    }

    /// Total number of trials recorded so far.
    pub fn trial_count(&self) -> u64 {
        self.inner.lock().next_trial_index
    }

    /// Ordered snapshot of all rounds, for serialization.
    pub fn get_entries(&self) -> Vec<OptimizationRound> {
        self.inner.lock().rounds.clone()
    }
}
