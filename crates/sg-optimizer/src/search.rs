//! Declarative search-space algebra over nested prompt/model parameters.
//!
//! A [`ParameterSearchSpace`] is a pure value object: every
//! mutating-looking operation (`expand_for_prompts`, `narrow_around`,
//! `apply`, ...) returns a new instance and leaves its arguments — search
//! space, prompts, and base model kwargs alike — untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use sg_types::{ChatPrompt, ConfigError};

/// Sampling scale for numeric parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueScale {
    #[default]
    Linear,
    /// Sampled in log-space then exponentiated.
    Log,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Distribution {
    Float {
        low: f64,
        high: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        #[serde(default)]
        scale: ValueScale,
    },
    Int {
        low: i64,
        high: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<i64>,
    },
    Categorical {
        choices: Vec<Value>,
    },
    Bool {
        choices: Vec<Value>,
    },
}

impl Distribution {
    /// Bool parameters default to the `[false, true]` choice pair.
    pub fn boolean() -> Self {
        Self::Bool {
            choices: vec![Value::Bool(false), Value::Bool(true)],
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Float { .. } | Self::Int { .. })
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        match self {
            Self::Float {
                low, high, scale, ..
            } => {
                if !(low < high) {
                    return Err(ConfigError::InvalidBounds {
                        name: name.to_string(),
                        low: *low,
                        high: *high,
                    });
                }
                if *scale == ValueScale::Log && *low <= 0.0 {
                    return Err(ConfigError::InvalidLogBounds {
                        name: name.to_string(),
                        low: *low,
                    });
                }
                Ok(())
            }
            Self::Int { low, high, .. } => {
                if !(low < high) {
                    return Err(ConfigError::InvalidBounds {
                        name: name.to_string(),
                        low: *low as f64,
                        high: *high as f64,
                    });
                }
                Ok(())
            }
            Self::Categorical { choices } | Self::Bool { choices } => {
                if choices.is_empty() {
                    return Err(ConfigError::MissingChoices {
                        name: name.to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Where a sampled value is written on the prompt: the top-level model
/// field, or a nested path under the model-parameters bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPath {
    Model,
    ModelKwargs(Vec<String>),
}

impl TargetPath {
    /// Default resolution from a declared parameter name: `"model"` maps
    /// to the top-level model attribute; any other name (dotted or not)
    /// maps to the corresponding nested path under `model_kwargs`.
    pub fn from_name(name: &str) -> Self {
        if name == "model" {
            return Self::Model;
        }
        Self::ModelKwargs(name.split('.').map(str::to_string).collect())
    }

    /// Parse an explicit `target` override.
    pub fn parse(target: &str) -> Self {
        if target == "model" {
            return Self::Model;
        }
        let path = target.strip_prefix("model_kwargs.").unwrap_or(target);
        Self::ModelKwargs(path.split('.').map(str::to_string).collect())
    }
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Dot-namespaced parameter name (e.g. "qa.temperature").
    pub name: String,
    pub distribution: Distribution,
    /// Where the sampled value lands on the prompt.
    pub target: TargetPath,
}

impl ParameterSpec {
    /// Build a spec, validating the distribution at construction time.
    /// Without an explicit target the name decides placement.
    pub fn new(
        name: impl Into<String>,
        distribution: Distribution,
        target: Option<TargetPath>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        distribution.validate(&name)?;
        let target = target.unwrap_or_else(|| TargetPath::from_name(&name));
        Ok(Self {
            name,
            distribution,
            target,
        })
    }

    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Result<Self, ConfigError> {
        Self::new(
            name,
            Distribution::Float {
                low,
                high,
                step: None,
                scale: ValueScale::Linear,
            },
            None,
        )
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Result<Self, ConfigError> {
        Self::new(name, Distribution::Int { low, high, step: None }, None)
    }

    pub fn categorical(name: impl Into<String>, choices: Vec<Value>) -> Result<Self, ConfigError> {
        Self::new(name, Distribution::Categorical { choices }, None)
    }

    pub fn boolean(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(name, Distribution::boolean(), None)
    }
}

/// A concrete sampled parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Json(Value),
}

impl ParamValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Int(v) => Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(v.round() as i64),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Sampled values keyed by parameter name.
pub type ParamValues = BTreeMap<String, ParamValue>;

/// The full search space: an ordered, name-unique list of parameter
/// specs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSearchSpace {
    parameters: Vec<ParameterSpec>,
}

impl ParameterSearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn has_numeric(&self) -> bool {
        self.parameters.iter().any(|p| p.distribution.is_numeric())
    }

    /// Append a spec, rejecting duplicate names.
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Result<Self, ConfigError> {
        if self.parameters.iter().any(|p| p.name == spec.name) {
            return Err(ConfigError::DuplicateParameter { name: spec.name });
        }
        self.parameters.push(spec);
        Ok(self)
    }

    pub fn add_float(
        self,
        name: impl Into<String>,
        low: f64,
        high: f64,
    ) -> Result<Self, ConfigError> {
        self.with_parameter(ParameterSpec::float(name, low, high)?)
    }

    pub fn add_int(
        self,
        name: impl Into<String>,
        low: i64,
        high: i64,
    ) -> Result<Self, ConfigError> {
        self.with_parameter(ParameterSpec::int(name, low, high)?)
    }

    pub fn add_categorical(
        self,
        name: impl Into<String>,
        choices: Vec<Value>,
    ) -> Result<Self, ConfigError> {
        self.with_parameter(ParameterSpec::categorical(name, choices)?)
    }

    pub fn add_bool(self, name: impl Into<String>) -> Result<Self, ConfigError> {
        self.with_parameter(ParameterSpec::boolean(name)?)
    }

    /// Parse the declarative shorthand:
    ///
    /// ```json
    /// {"temperature": {"type": "float", "min": 0.0, "max": 1.0},
    ///  "style": {"type": "categorical", "values": ["terse", "verbose"]}}
    /// ```
    ///
    /// `distribution` is accepted as an alias of `type`, `choices` of
    /// `values`, `low`/`high` of `min`/`max`. An explicit `target`
    /// overrides name-based placement.
    pub fn from_json(shorthand: &Value) -> Result<Self, ConfigError> {
        let entries = shorthand
            .as_object()
            .ok_or_else(|| ConfigError::InvalidSpec {
                name: "<root>".to_string(),
                message: "search space shorthand must be an object".to_string(),
            })?;

        let mut space = Self::new();
        for (name, entry) in entries {
            space = space.with_parameter(parse_shorthand_entry(name, entry)?)?;
        }
        Ok(space)
    }

    /// Expand unprefixed specs across the given prompt names.
    ///
    /// Each spec whose name is not already prefixed by one of
    /// `prompt_names` is cloned once per prompt as `"{prompt}.{name}"`;
    /// already-prefixed specs pass through as a single instance.
    pub fn expand_for_prompts(&self, prompt_names: &[&str]) -> Self {
        let mut parameters = Vec::new();
        for spec in &self.parameters {
            let already_prefixed = prompt_names
                .iter()
                .any(|prompt| spec.name.starts_with(&format!("{prompt}.")));
            if already_prefixed {
                parameters.push(spec.clone());
            } else {
                for prompt in prompt_names {
                    let mut clone = spec.clone();
                    clone.name = format!("{prompt}.{}", spec.name);
                    parameters.push(clone);
                }
            }
        }
        Self { parameters }
    }

    /// Apply sampled values to a single prompt, returning a new prompt.
    ///
    /// Model-targeted values set the model field; everything else lands at
    /// its nested path in a fresh model-parameters bag built from the
    /// prompt's own kwargs deep-merged with `base_model_kwargs`. Neither
    /// the prompt nor `base_model_kwargs` is mutated.
    pub fn apply(
        &self,
        prompt: &ChatPrompt,
        values: &ParamValues,
        base_model_kwargs: &Map<String, Value>,
    ) -> ChatPrompt {
        let mut next = prompt.clone();
        let mut kwargs = merge_maps(&prompt.model_kwargs, base_model_kwargs);

        for (key, value) in values {
            let target = self
                .spec_for(&prompt.name, key)
                .map(|spec| spec.target.clone())
                .unwrap_or_else(|| TargetPath::from_name(key));

            match target {
                TargetPath::Model => {
                    next.model = Some(match value.to_json() {
                        Value::String(s) => s,
                        other => other.to_string(),
                    });
                }
                TargetPath::ModelKwargs(path) => {
                    insert_at_path(&mut kwargs, &path, value.to_json());
                }
            }
        }

        next.model_kwargs = kwargs;
        next
    }

    /// Apply values keyed `"{prompt}.{param}"` across a named prompt set.
    ///
    /// Keys whose prompt prefix does not match any entry in `prompts` are
    /// silently dropped (with a debug log). `prompts` is never mutated.
    pub fn apply_to_prompts(
        &self,
        prompts: &BTreeMap<String, ChatPrompt>,
        values: &ParamValues,
        base_model_kwargs: &Map<String, Value>,
    ) -> BTreeMap<String, ChatPrompt> {
        let mut routed: BTreeMap<&str, ParamValues> = BTreeMap::new();
        for (key, value) in values {
            let matched = prompts
                .keys()
                .find(|prompt| key.starts_with(&format!("{prompt}.")));
            match matched {
                Some(prompt) => {
                    let local = key[prompt.len() + 1..].to_string();
                    routed
                        .entry(prompt.as_str())
                        .or_default()
                        .insert(local, value.clone());
                }
                None => {
                    debug!(param = %key, "dropping sampled value with unresolvable prompt prefix");
                }
            }
        }

        prompts
            .iter()
            .map(|(name, prompt)| {
                let applied = match routed.get(name.as_str()) {
                    Some(local_values) => self.apply(prompt, local_values, base_model_kwargs),
                    None => prompt.clone(),
                };
                (name.clone(), applied)
            })
            .collect()
    }

    /// Prompt-less variant of the merge, used before a prompt object
    /// exists.
    pub fn values_to_model_kwargs(
        &self,
        values: &ParamValues,
        base: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut kwargs = base.clone();
        for (key, value) in values {
            let target = self
                .spec_named(key)
                .map(|spec| spec.target.clone())
                .unwrap_or_else(|| TargetPath::from_name(key));
            if let TargetPath::ModelKwargs(path) = target {
                insert_at_path(&mut kwargs, &path, value.to_json());
            }
        }
        kwargs
    }

    /// Shrink numeric parameters around a center point.
    ///
    /// For Float/Int specs: `half = scale * (high - low) / 2`, new bounds
    /// `[max(low, c - half), min(high, c + half)]`. A collapsed interval
    /// is widened symmetrically (clamped to the original bounds) so the
    /// result always satisfies `new_low < new_high`. Categorical/Bool
    /// specs, and specs absent from `center`, pass through unchanged.
    pub fn narrow_around(&self, center: &ParamValues, scale: f64) -> Self {
        let parameters = self
            .parameters
            .iter()
            .map(|spec| narrow_spec(spec, center, scale))
            .collect();
        Self { parameters }
    }

    /// Introspection map: `name -> {type, min/max or choices}`.
    pub fn describe(&self) -> BTreeMap<String, Value> {
        self.parameters
            .iter()
            .map(|spec| {
                let summary = match &spec.distribution {
                    Distribution::Float {
                        low, high, scale, ..
                    } => {
                        let scale = if *scale == ValueScale::Log { "log" } else { "linear" };
                        serde_json::json!({
                            "type": "float",
                            "min": low,
                            "max": high,
                            "scale": scale,
                        })
                    }
                    Distribution::Int { low, high, .. } => serde_json::json!({
                        "type": "int",
                        "min": low,
                        "max": high,
                    }),
                    Distribution::Categorical { choices } => serde_json::json!({
                        "type": "categorical",
                        "choices": choices,
                    }),
                    Distribution::Bool { choices } => serde_json::json!({
                        "type": "bool",
                        "choices": choices,
                    }),
                };
                (spec.name.clone(), summary)
            })
            .collect()
    }

    fn spec_named(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    /// Look up a spec by its local name within a prompt's namespace:
    /// either an exact match or `"{prompt}.{key}"`.
    fn spec_for(&self, prompt_name: &str, key: &str) -> Option<&ParameterSpec> {
        self.spec_named(key)
            .or_else(|| self.spec_named(&format!("{prompt_name}.{key}")))
    }
}

fn parse_shorthand_entry(name: &str, entry: &Value) -> Result<ParameterSpec, ConfigError> {
    let fields = entry.as_object().ok_or_else(|| ConfigError::InvalidSpec {
        name: name.to_string(),
        message: "parameter entry must be an object".to_string(),
    })?;

    let kind = fields
        .get("type")
        .or_else(|| fields.get("distribution"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::MissingField {
            name: name.to_string(),
            field: "type".to_string(),
        })?
        .to_ascii_lowercase();

    let bound = |field: &str, alias: &str| fields.get(field).or_else(|| fields.get(alias));

    let distribution = match kind.as_str() {
        "float" => {
            let low = bound("min", "low").and_then(Value::as_f64).ok_or_else(|| {
                ConfigError::MissingField {
                    name: name.to_string(),
                    field: "min".to_string(),
                }
            })?;
            let high = bound("max", "high").and_then(Value::as_f64).ok_or_else(|| {
                ConfigError::MissingField {
                    name: name.to_string(),
                    field: "max".to_string(),
                }
            })?;
            let scale = match fields.get("scale").and_then(Value::as_str) {
                None => ValueScale::Linear,
                Some("linear") => ValueScale::Linear,
                Some("log") => ValueScale::Log,
                Some(other) => {
                    return Err(ConfigError::InvalidSpec {
                        name: name.to_string(),
                        message: format!("unknown scale '{other}'"),
                    })
                }
            };
            Distribution::Float {
                low,
                high,
                step: fields.get("step").and_then(Value::as_f64),
                scale,
            }
        }
        "int" => {
            let low = bound("min", "low").and_then(Value::as_i64).ok_or_else(|| {
                ConfigError::MissingField {
                    name: name.to_string(),
                    field: "min".to_string(),
                }
            })?;
            let high = bound("max", "high").and_then(Value::as_i64).ok_or_else(|| {
                ConfigError::MissingField {
                    name: name.to_string(),
                    field: "max".to_string(),
                }
            })?;
            Distribution::Int {
                low,
                high,
                step: fields.get("step").and_then(Value::as_i64),
            }
        }
        "categorical" => {
            let choices = bound("values", "choices")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| ConfigError::MissingChoices {
                    name: name.to_string(),
                })?;
            Distribution::Categorical { choices }
        }
        "bool" => match bound("values", "choices").and_then(Value::as_array) {
            Some(choices) => Distribution::Bool {
                choices: choices.clone(),
            },
            None => Distribution::boolean(),
        },
        other => {
            return Err(ConfigError::UnknownDistribution {
                name: name.to_string(),
                value: other.to_string(),
            })
        }
    };

    let target = fields
        .get("target")
        .and_then(Value::as_str)
        .map(TargetPath::parse);

    ParameterSpec::new(name, distribution, target)
}

fn narrow_spec(spec: &ParameterSpec, center: &ParamValues, scale: f64) -> ParameterSpec {
    let mut narrowed = spec.clone();
    match (&spec.distribution, center.get(&spec.name)) {
        (
            Distribution::Float {
                low,
                high,
                step,
                scale: value_scale,
            },
            Some(value),
        ) => {
            if let Some(c) = value.as_f64() {
                let half = scale * (high - low) / 2.0;
                let mut new_low = (c - half).max(*low);
                let mut new_high = (c + half).min(*high);
                if !(new_low < new_high) {
                    // Collapsed interval: widen symmetrically inside the
                    // original bounds.
                    let eps = f64::max(1e-9, (high - low) * 1e-6);
                    new_low = (new_low - eps).max(*low);
                    new_high = (new_high + eps).min(*high);
                }
                if !(new_low < new_high) {
                    new_low = *low;
                    new_high = *high;
                }
                narrowed.distribution = Distribution::Float {
                    low: new_low,
                    high: new_high,
                    step: *step,
                    scale: *value_scale,
                };
            }
        }
        (Distribution::Int { low, high, step }, Some(value)) => {
            if let Some(c) = value.as_i64() {
                let half = ((scale * (high - low) as f64) / 2.0).round() as i64;
                let mut new_low = (c - half).max(*low);
                let mut new_high = (c + half).min(*high);
                if new_low >= new_high {
                    new_low = (new_low - 1).max(*low);
                    new_high = (new_high + 1).min(*high);
                }
                if new_low >= new_high {
                    new_low = *low;
                    new_high = *high;
                }
                narrowed.distribution = Distribution::Int {
                    low: new_low,
                    high: new_high,
                    step: *step,
                };
            }
        }
        _ => {}
    }
    narrowed
}

/// Deep-merge `overlay` into a copy of `base`: objects merge recursively,
/// anything else overwrites.
fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, incoming) in overlay {
        let combined = match (merged.get(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(next)) => {
                Value::Object(merge_maps(existing, next))
            }
            _ => incoming.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

/// Write `value` at a nested path, creating (or replacing non-object)
/// intermediate entries.
fn insert_at_path(target: &mut Map<String, Value>, path: &[String], value: Value) {
    if path.is_empty() {
        return;
    }
    if path.len() == 1 {
        target.insert(path[0].clone(), value);
        return;
    }

    let entry = target
        .entry(path[0].clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(inner) = entry {
        insert_at_path(inner, &path[1..], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_space() -> ParameterSearchSpace {
        ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap()
            .add_int("max_tokens", 16, 512)
            .unwrap()
            .add_categorical("style", vec![json!("terse"), json!("verbose")])
            .unwrap()
    }

    fn sample_prompt(name: &str) -> ChatPrompt {
        let mut kwargs = Map::new();
        kwargs.insert("top_p".into(), json!(0.9));
        ChatPrompt::new(name)
            .with_model("gpt-4o-mini")
            .with_model_kwargs(kwargs)
    }

    #[test]
    fn builder_chain() {
        let space = sample_space();
        assert_eq!(space.len(), 3);
        assert!(space.has_numeric());
    }

    #[test]
    fn categorical_without_choices_fails_at_construction() {
        let error = ParameterSpec::categorical("style", vec![]).unwrap_err();
        assert!(matches!(error, ConfigError::MissingChoices { .. }));
    }

    #[test]
    fn inverted_bounds_fail_at_construction() {
        let error = ParameterSpec::float("temperature", 1.0, 0.5).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidBounds { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let error = sample_space().add_float("temperature", 0.0, 2.0).unwrap_err();
        assert!(matches!(error, ConfigError::DuplicateParameter { .. }));
    }

    #[test]
    fn log_scale_requires_positive_low() {
        let shorthand = json!({
            "lr": {"type": "float", "min": 0.0, "max": 1.0, "scale": "log"}
        });
        let error = ParameterSearchSpace::from_json(&shorthand).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidLogBounds { .. }));
    }

    #[test]
    fn shorthand_parses_types_and_aliases() {
        let shorthand = json!({
            "temperature": {"type": "float", "min": 0.0, "max": 1.0},
            "max_tokens": {"distribution": "int", "low": 16, "high": 512},
            "style": {"type": "categorical", "values": ["terse", "verbose"]},
            "use_cot": {"type": "bool"},
        });
        let space = ParameterSearchSpace::from_json(&shorthand).unwrap();
        assert_eq!(space.len(), 4);

        let bool_spec = space.spec_named("use_cot").unwrap();
        assert_eq!(
            bool_spec.distribution,
            Distribution::Bool {
                choices: vec![json!(false), json!(true)]
            }
        );
    }

    #[test]
    fn shorthand_target_resolution() {
        let shorthand = json!({
            "model": {"type": "categorical", "values": ["gpt-4o", "gpt-4o-mini"]},
            "temperature": {"type": "float", "min": 0.0, "max": 1.0},
            "gen.top_k": {"type": "int", "min": 1, "max": 50},
            "penalty": {"type": "float", "min": 0.0, "max": 2.0, "target": "sampling.presence_penalty"},
        });
        let space = ParameterSearchSpace::from_json(&shorthand).unwrap();

        assert_eq!(space.spec_named("model").unwrap().target, TargetPath::Model);
        assert_eq!(
            space.spec_named("temperature").unwrap().target,
            TargetPath::ModelKwargs(vec!["temperature".into()])
        );
        assert_eq!(
            space.spec_named("gen.top_k").unwrap().target,
            TargetPath::ModelKwargs(vec!["gen".into(), "top_k".into()])
        );
        assert_eq!(
            space.spec_named("penalty").unwrap().target,
            TargetPath::ModelKwargs(vec!["sampling".into(), "presence_penalty".into()])
        );
    }

    #[test]
    fn unknown_distribution_rejected() {
        let shorthand = json!({"x": {"type": "gaussian", "min": 0.0, "max": 1.0}});
        let error = ParameterSearchSpace::from_json(&shorthand).unwrap_err();
        assert!(matches!(error, ConfigError::UnknownDistribution { .. }));
    }

    #[test]
    fn expansion_count_law() {
        let space = ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap()
            .add_int("max_tokens", 16, 512)
            .unwrap()
            .add_float("qa.top_p", 0.1, 1.0)
            .unwrap();

        let prompts = ["qa", "summary", "rerank"];
        let expanded = space.expand_for_prompts(&prompts);

        // 2 unprefixed specs × 3 prompts + 1 already-prefixed spec.
        assert_eq!(expanded.len(), 2 * prompts.len() + 1);
        assert!(expanded.spec_named("qa.temperature").is_some());
        assert!(expanded.spec_named("summary.max_tokens").is_some());
        assert!(expanded.spec_named("qa.top_p").is_some());
        assert!(expanded.spec_named("summary.qa.top_p").is_none());
    }

    #[test]
    fn expansion_deep_copies_choices() {
        let space = ParameterSearchSpace::new()
            .add_categorical("style", vec![json!("terse")])
            .unwrap();
        let expanded = space.expand_for_prompts(&["qa"]);
        assert_eq!(space.spec_named("style").unwrap().name, "style");
        assert!(expanded.spec_named("qa.style").is_some());
    }

    #[test]
    fn apply_writes_nested_paths_without_mutating_inputs() {
        let space = ParameterSearchSpace::new()
            .add_float("sampling.temperature", 0.0, 1.0)
            .unwrap();
        let prompt = sample_prompt("qa");
        let prompt_snapshot = prompt.clone();

        let mut base = Map::new();
        base.insert("seed".into(), json!(7));
        let base_snapshot = base.clone();

        let mut values = ParamValues::new();
        values.insert("sampling.temperature".into(), ParamValue::Float(0.25));

        let applied = space.apply(&prompt, &values, &base);

        assert_eq!(applied.model_kwargs.get("seed"), Some(&json!(7)));
        assert_eq!(applied.model_kwargs.get("top_p"), Some(&json!(0.9)));
        assert_eq!(
            applied.model_kwargs.get("sampling"),
            Some(&json!({"temperature": 0.25}))
        );

        // Originals untouched.
        assert_eq!(prompt, prompt_snapshot);
        assert_eq!(base, base_snapshot);
    }

    #[test]
    fn apply_model_target_sets_model_field() {
        let space = ParameterSearchSpace::new()
            .add_categorical("model", vec![json!("gpt-4o"), json!("gpt-4o-mini")])
            .unwrap();
        let prompt = sample_prompt("qa");

        let mut values = ParamValues::new();
        values.insert("model".into(), ParamValue::Json(json!("gpt-4o")));

        let applied = space.apply(&prompt, &values, &Map::new());
        assert_eq!(applied.model.as_deref(), Some("gpt-4o"));
        assert_eq!(prompt.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn apply_to_prompts_routes_by_prefix_and_drops_unresolvable() {
        let space = ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap()
            .expand_for_prompts(&["qa", "summary"]);

        let mut prompts = BTreeMap::new();
        prompts.insert("qa".to_string(), sample_prompt("qa"));
        prompts.insert("summary".to_string(), sample_prompt("summary"));
        let snapshot = prompts.clone();

        let mut values = ParamValues::new();
        values.insert("qa.temperature".into(), ParamValue::Float(0.1));
        values.insert("summary.temperature".into(), ParamValue::Float(0.9));
        values.insert("missing.temperature".into(), ParamValue::Float(0.5));

        let applied = space.apply_to_prompts(&prompts, &values, &Map::new());

        assert_eq!(
            applied["qa"].model_kwargs.get("temperature"),
            Some(&json!(0.1))
        );
        assert_eq!(
            applied["summary"].model_kwargs.get("temperature"),
            Some(&json!(0.9))
        );
        assert_eq!(prompts, snapshot);
    }

    #[test]
    fn values_to_model_kwargs_merges_over_base() {
        let space = ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap();

        let mut base = Map::new();
        base.insert("top_p".into(), json!(0.9));

        let mut values = ParamValues::new();
        values.insert("temperature".into(), ParamValue::Float(0.3));

        let kwargs = space.values_to_model_kwargs(&values, &base);
        assert_eq!(kwargs.get("top_p"), Some(&json!(0.9)));
        assert_eq!(kwargs.get("temperature"), Some(&json!(0.3)));
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn narrow_around_shrinks_within_original_bounds() {
        let space = ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap()
            .add_int("max_tokens", 0, 100)
            .unwrap();

        let mut center = ParamValues::new();
        center.insert("temperature".into(), ParamValue::Float(0.5));
        center.insert("max_tokens".into(), ParamValue::Int(90));

        let narrowed = space.narrow_around(&center, 0.2);

        match narrowed.spec_named("temperature").unwrap().distribution {
            Distribution::Float { low, high, .. } => {
                assert!(low < high);
                assert!(low >= 0.0 && high <= 1.0);
                assert!(low <= 0.5 && 0.5 <= high);
                assert!((low - 0.4).abs() < 1e-9);
                assert!((high - 0.6).abs() < 1e-9);
            }
            _ => panic!("expected float distribution"),
        }

        match narrowed.spec_named("max_tokens").unwrap().distribution {
            Distribution::Int { low, high, .. } => {
                assert!(low < high);
                assert!(low >= 0 && high <= 100);
                assert!(low <= 90 && 90 <= high);
            }
            _ => panic!("expected int distribution"),
        }
    }

    #[test]
    fn narrow_around_collapsed_interval_stays_valid() {
        let space = ParameterSearchSpace::new()
            .add_float("temperature", 0.0, 1.0)
            .unwrap();

        let mut center = ParamValues::new();
        // Center at the boundary with zero scale collapses the interval.
        center.insert("temperature".into(), ParamValue::Float(0.0));

        let narrowed = space.narrow_around(&center, 0.0);
        match narrowed.spec_named("temperature").unwrap().distribution {
            Distribution::Float { low, high, .. } => {
                assert!(low < high);
                assert!(low >= 0.0 && high <= 1.0);
            }
            _ => panic!("expected float distribution"),
        }
    }

    #[test]
    fn narrow_around_passes_categorical_through() {
        let space = ParameterSearchSpace::new()
            .add_categorical("style", vec![json!("terse"), json!("verbose")])
            .unwrap();

        let mut center = ParamValues::new();
        center.insert("style".into(), ParamValue::Json(json!("terse")));

        let narrowed = space.narrow_around(&center, 0.1);
        assert_eq!(narrowed, space);
    }

    #[test]
    fn narrow_around_skips_params_missing_from_center() {
        let space = sample_space();
        let narrowed = space.narrow_around(&ParamValues::new(), 0.1);
        assert_eq!(narrowed, space);
    }

    #[test]
    fn describe_reports_types_and_ranges() {
        let described = sample_space().describe();
        assert_eq!(described["temperature"]["type"], json!("float"));
        assert_eq!(described["temperature"]["min"], json!(0.0));
        assert_eq!(described["max_tokens"]["max"], json!(512));
        assert_eq!(
            described["style"]["choices"],
            json!(["terse", "verbose"])
        );
    }

    #[test]
    fn space_serialization_round_trip() {
        let space = sample_space();
        let encoded = serde_json::to_string(&space).unwrap();
        let back: ParameterSearchSpace = serde_json::from_str(&encoded).unwrap();
        assert_eq!(space, back);
    }
}
