//! Sensitive-parameter redaction.
//!
//! Whatever leaves the process — history entries, reporter payloads —
//! carries redacted copies of sampled values. The value actually used to
//! build the evaluated candidate is never touched.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::search::ParamValues;

/// Placeholder written in place of a sensitive value.
pub const REDACTED_VALUE: &str = "<REDACTED>";

/// Case-insensitive substring predicate over parameter names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveParams {
    patterns: Vec<String>,
}

impl Default for SensitiveParams {
    fn default() -> Self {
        Self::new(["api_key", "apikey", "secret", "token", "password"])
    }
}

impl SensitiveParams {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// No redaction at all. For spaces known to carry nothing sensitive.
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Externally visible copy of sampled values, with sensitive entries
    /// replaced by [`REDACTED_VALUE`].
    pub fn redact_values(&self, values: &ParamValues) -> BTreeMap<String, Value> {
        values
            .iter()
            .map(|(name, value)| {
                let visible = if self.is_sensitive(name) {
                    Value::String(REDACTED_VALUE.to_string())
                } else {
                    value.to_json()
                };
                (name.clone(), visible)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamValue;
    use serde_json::json;

    #[test]
    fn default_patterns_catch_api_keys_anywhere_in_the_name() {
        let sensitive = SensitiveParams::default();
        assert!(sensitive.is_sensitive("api_key"));
        assert!(sensitive.is_sensitive("qa.api_key"));
        assert!(sensitive.is_sensitive("provider.API_KEY"));
        assert!(!sensitive.is_sensitive("temperature"));
    }

    #[test]
    fn redaction_replaces_only_sensitive_entries() {
        let sensitive = SensitiveParams::default();

        let mut values = ParamValues::new();
        values.insert("qa.api_key".into(), ParamValue::Json(json!("sk-live-123")));
        values.insert("qa.temperature".into(), ParamValue::Float(0.3));

        let redacted = sensitive.redact_values(&values);
        assert_eq!(redacted["qa.api_key"], json!(REDACTED_VALUE));
        assert_eq!(redacted["qa.temperature"], json!(0.3));

        // The working copy keeps the real value.
        assert_eq!(
            values.get("qa.api_key"),
            Some(&ParamValue::Json(json!("sk-live-123")))
        );
    }

    #[test]
    fn disabled_predicate_redacts_nothing() {
        let sensitive = SensitiveParams::disabled();
        let mut values = ParamValues::new();
        values.insert("api_key".into(), ParamValue::Json(json!("sk")));
        let redacted = sensitive.redact_values(&values);
        assert_eq!(redacted["api_key"], json!("sk"));
    }
}
