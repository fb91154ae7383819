//! Suggestion drivers: the black-box search loop's per-type sampling
//! boundary.
//!
//! The trial objective asks the driver for one value per parameter spec
//! and feeds completed (values, score) pairs back through `observe` so
//! adaptive drivers can learn. The driver's internal heuristics are its
//! own business; this module ships a uniform sampler and an
//! explore/exploit sampler that perturbs the incumbent best.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::search::{ParamValue, ParamValues, ValueScale};

/// Per-type suggestion calls made once per parameter per trial.
pub trait SuggestionDriver: Send {
    fn suggest_float(
        &mut self,
        name: &str,
        low: f64,
        high: f64,
        step: Option<f64>,
        scale: ValueScale,
    ) -> f64;

    fn suggest_int(&mut self, name: &str, low: i64, high: i64, step: Option<i64>) -> i64;

    fn suggest_choice(&mut self, name: &str, choices: &[Value]) -> Value;

    /// Report a completed trial so adaptive drivers can learn.
    fn observe(&mut self, _values: &ParamValues, _score: f64) {}

    /// Human-readable driver name.
    fn name(&self) -> &str;
}

fn snap_float(value: f64, low: f64, high: f64, step: Option<f64>) -> f64 {
    match step {
        Some(step) if step > 0.0 => {
            let snapped = low + ((value - low) / step).round() * step;
            snapped.clamp(low, high)
        }
        _ => value,
    }
}

fn snap_int(value: i64, low: i64, high: i64, step: Option<i64>) -> i64 {
    match step {
        Some(step) if step > 0 => {
            let offset = (value - low) as f64 / step as f64;
            let snapped = low + offset.round() as i64 * step;
            snapped.clamp(low, high)
        }
        _ => value,
    }
}

fn uniform_float(rng: &mut ChaCha8Rng, low: f64, high: f64, scale: ValueScale) -> f64 {
    match scale {
        ValueScale::Linear => rng.gen_range(low..=high),
        ValueScale::Log => {
            let log_low = low.ln();
            let log_high = high.ln();
            rng.gen_range(log_low..=log_high).exp()
        }
    }
}

/// Independent uniform sampling across the space.
#[derive(Debug, Clone)]
pub struct RandomDriver {
    rng: ChaCha8Rng,
}

impl RandomDriver {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionDriver for RandomDriver {
    fn suggest_float(
        &mut self,
        _name: &str,
        low: f64,
        high: f64,
        step: Option<f64>,
        scale: ValueScale,
    ) -> f64 {
        let value = uniform_float(&mut self.rng, low, high, scale);
        snap_float(value, low, high, step)
    }

    fn suggest_int(&mut self, _name: &str, low: i64, high: i64, step: Option<i64>) -> i64 {
        let value = self.rng.gen_range(low..=high);
        snap_int(value, low, high, step)
    }

    fn suggest_choice(&mut self, _name: &str, choices: &[Value]) -> Value {
        let idx = self.rng.gen_range(0..choices.len());
        choices[idx].clone()
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Explore/exploit sampling: with probability `exploration_weight` sample
/// uniformly; otherwise perturb the best-known point. A surrogate-model
/// driver can replace this through the same trait.
#[derive(Debug, Clone)]
pub struct AdaptiveDriver {
    rng: ChaCha8Rng,
    exploration_weight: f64,
    best: Option<(ParamValues, f64)>,
}

impl AdaptiveDriver {
    pub fn new(exploration_weight: f64) -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
            exploration_weight,
            best: None,
        }
    }

    pub fn seeded(exploration_weight: f64, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            exploration_weight,
            best: None,
        }
    }

    fn explore(&mut self) -> bool {
        self.best.is_none() || self.rng.gen::<f64>() < self.exploration_weight
    }

    fn best_value(&self, name: &str) -> Option<&ParamValue> {
        self.best.as_ref().and_then(|(values, _)| values.get(name))
    }
}

impl SuggestionDriver for AdaptiveDriver {
    fn suggest_float(
        &mut self,
        name: &str,
        low: f64,
        high: f64,
        step: Option<f64>,
        scale: ValueScale,
    ) -> f64 {
        if self.explore() {
            let value = uniform_float(&mut self.rng, low, high, scale);
            return snap_float(value, low, high, step);
        }

        let base = self
            .best_value(name)
            .and_then(ParamValue::as_f64)
            .filter(|v| v.is_finite());
        let value = match (base, scale) {
            (Some(base), ValueScale::Linear) => {
                let noise = self.rng.gen_range(-0.1..0.1) * (high - low);
                (base + noise).clamp(low, high)
            }
            (Some(base), ValueScale::Log) if base > 0.0 => {
                let log_range = high.ln() - low.ln();
                let noise = self.rng.gen_range(-0.1..0.1) * log_range;
                (base.ln() + noise).exp().clamp(low, high)
            }
            _ => uniform_float(&mut self.rng, low, high, scale),
        };
        snap_float(value, low, high, step)
    }

    fn suggest_int(&mut self, name: &str, low: i64, high: i64, step: Option<i64>) -> i64 {
        if self.explore() {
            let value = self.rng.gen_range(low..=high);
            return snap_int(value, low, high, step);
        }

        let value = match self.best_value(name).and_then(ParamValue::as_i64) {
            Some(base) => {
                let delta: i64 = self.rng.gen_range(-2..=2);
                (base + delta).clamp(low, high)
            }
            None => self.rng.gen_range(low..=high),
        };
        snap_int(value, low, high, step)
    }

    fn suggest_choice(&mut self, _name: &str, choices: &[Value]) -> Value {
        // No perturbation structure on choices; sample uniformly.
        let idx = self.rng.gen_range(0..choices.len());
        choices[idx].clone()
    }

    fn observe(&mut self, values: &ParamValues, score: f64) {
        let improves = match &self.best {
            None => true,
            Some((_, best_score)) => score > *best_score,
        };
        if improves {
            self.best = Some((values.clone(), score));
        }
    }

    fn name(&self) -> &str {
        "adaptive"
    }
}
