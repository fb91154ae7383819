//! Best-effort parameter importance from completed trial records.
//!
//! Numeric parameters score the absolute Pearson correlation between
//! sampled value and trial score; categorical/bool parameters score the
//! spread of per-choice mean scores. Scores are normalized to sum to one.
//! Degenerate input (too few trials, zero variance, missing values)
//! yields an empty map — this analysis never aborts a run.

use std::collections::BTreeMap;

use crate::objective::ScoredTrial;
use crate::search::{ParameterSearchSpace, ParameterSpec};

/// Minimum number of finite-scored trials before any signal is computed.
const MIN_TRIALS: usize = 3;

pub fn parameter_importance(
    space: &ParameterSearchSpace,
    trials: &[ScoredTrial],
) -> BTreeMap<String, f64> {
    let usable: Vec<&ScoredTrial> = trials.iter().filter(|t| t.score.is_finite()).collect();
    if usable.len() < MIN_TRIALS {
        return BTreeMap::new();
    }

    let mut raw = BTreeMap::new();
    for spec in space.parameters() {
        let signal = if spec.distribution.is_numeric() {
            numeric_signal(spec, &usable)
        } else {
            categorical_signal(spec, &usable)
        };
        raw.insert(spec.name.clone(), signal.max(0.0));
    }

    let total: f64 = raw.values().sum();
    if !(total > 0.0) || !total.is_finite() {
        return BTreeMap::new();
    }
    raw.into_iter().map(|(name, v)| (name, v / total)).collect()
}

fn numeric_signal(spec: &ParameterSpec, trials: &[&ScoredTrial]) -> f64 {
    let pairs: Vec<(f64, f64)> = trials
        .iter()
        .filter_map(|trial| {
            trial
                .values
                .get(&spec.name)
                .and_then(|v| v.as_f64())
                .filter(|v| v.is_finite())
                .map(|v| (v, trial.score))
        })
        .collect();
    if pairs.len() < MIN_TRIALS {
        return 0.0;
    }
    pearson(&pairs).map(f64::abs).unwrap_or(0.0)
}

fn categorical_signal(spec: &ParameterSpec, trials: &[&ScoredTrial]) -> f64 {
    let mut by_choice: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for trial in trials {
        if let Some(value) = trial.values.get(&spec.name) {
            by_choice
                .entry(value.to_json().to_string())
                .or_default()
                .push(trial.score);
        }
    }
    if by_choice.len() < 2 {
        return 0.0;
    }

    let means: Vec<f64> = by_choice
        .values()
        .map(|scores| scores.iter().sum::<f64>() / scores.len() as f64)
        .collect();
    let max = means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = means.iter().cloned().fold(f64::INFINITY, f64::min);
    let spread = max - min;
    if spread.is_finite() {
        spread
    } else {
        0.0
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r)
}
