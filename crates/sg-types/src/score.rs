//! Score validation and normalization.
//!
//! Metrics and evaluation collaborators return scores in whatever numeric
//! shape they have on hand: floats, integers, decimals, JSON numbers, or
//! numeric strings. Everything funnels through [`coerce_score`] before the
//! optimization loop compares or records anything.
//!
//! NaN is rejected with a value error, anything non-numeric with a type
//! error. Positive and negative infinity are *valid* scores: the loop uses
//! `+inf` as an intentional "permanently best" sentinel.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::ScoreError;

/// A raw score as produced by a metric or evaluation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    Float(f64),
    Int(i64),
    Bool(bool),
    Decimal(Decimal),
    Text(String),
    Json(Value),
}

impl From<f64> for RawScore {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for RawScore {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RawScore {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for RawScore {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Decimal> for RawScore {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for RawScore {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawScore {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for RawScore {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Validate and normalize a raw score to `f64`.
///
/// Errors:
/// - [`ScoreError::Nan`] for NaN in any representation (value error).
/// - [`ScoreError::NotNumeric`] for inputs that are not numeric at all
///   (type error).
pub fn coerce_score(raw: &RawScore) -> Result<f64, ScoreError> {
    match raw {
        RawScore::Float(value) => check_finite_or_infinite(*value, "float"),
        RawScore::Int(value) => Ok(*value as f64),
        RawScore::Bool(value) => Ok(if *value { 1.0 } else { 0.0 }),
        RawScore::Decimal(value) => value
            .to_f64()
            .ok_or_else(|| ScoreError::NotNumeric {
                type_name: "decimal".to_string(),
            })
            .and_then(|v| check_finite_or_infinite(v, "decimal")),
        RawScore::Text(text) => coerce_text(text),
        RawScore::Json(value) => coerce_json(value),
    }
}

/// Normalize any numeric type (including `rust_decimal::Decimal`) through
/// its `ToPrimitive` conversion.
pub fn coerce_numeric<T: ToPrimitive>(value: T) -> Result<f64, ScoreError> {
    let as_float = value.to_f64().ok_or_else(|| ScoreError::NotNumeric {
        type_name: "numeric".to_string(),
    })?;
    check_finite_or_infinite(as_float, "numeric")
}

fn check_finite_or_infinite(value: f64, source: &str) -> Result<f64, ScoreError> {
    if value.is_nan() {
        return Err(ScoreError::Nan {
            context: format!("{source} value is not a number"),
        });
    }
    Ok(value)
}

fn coerce_text(text: &str) -> Result<f64, ScoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ScoreError::NotNumeric {
            type_name: "empty string".to_string(),
        });
    }
    // f64::from_str already understands "inf", "Infinity" and "NaN" in any
    // casing, which covers decimal-infinity inputs arriving as text.
    match trimmed.parse::<f64>() {
        Ok(value) => check_finite_or_infinite(value, "string"),
        Err(_) => Err(ScoreError::NotNumeric {
            type_name: format!("string '{trimmed}'"),
        }),
    }
}

fn coerce_json(value: &Value) -> Result<f64, ScoreError> {
    match value {
        Value::Number(number) => {
            let as_float = number.as_f64().ok_or_else(|| ScoreError::NotNumeric {
                type_name: "number".to_string(),
            })?;
            check_finite_or_infinite(as_float, "number")
        }
        Value::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => coerce_text(text),
        Value::Null => Err(ScoreError::NotNumeric {
            type_name: "null".to_string(),
        }),
        Value::Array(_) => Err(ScoreError::NotNumeric {
            type_name: "array".to_string(),
        }),
        Value::Object(_) => Err(ScoreError::NotNumeric {
            type_name: "object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn nan_raises_value_error_mentioning_nan() {
        let error = coerce_score(&RawScore::Float(f64::NAN)).unwrap_err();
        assert!(matches!(error, ScoreError::Nan { .. }));
        assert!(error.to_string().contains("NaN"));
    }

    #[test]
    fn non_numeric_raises_type_error() {
        let error = coerce_score(&RawScore::Json(json!({"score": 1.0}))).unwrap_err();
        assert!(matches!(error, ScoreError::NotNumeric { .. }));

        let error = coerce_score(&RawScore::Json(json!(null))).unwrap_err();
        assert!(matches!(error, ScoreError::NotNumeric { .. }));
    }

    #[test]
    fn infinity_is_valid_and_propagated() {
        assert_eq!(
            coerce_score(&RawScore::Float(f64::INFINITY)).unwrap(),
            f64::INFINITY
        );
        assert_eq!(
            coerce_score(&RawScore::Text("Infinity".to_string())).unwrap(),
            f64::INFINITY
        );
        assert_eq!(
            coerce_score(&RawScore::Text("-Infinity".to_string())).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn decimal_scores_convert() {
        assert_eq!(coerce_score(&RawScore::Decimal(dec!(0.96))).unwrap(), 0.96);
        assert_eq!(coerce_numeric(dec!(2)).unwrap(), 2.0);
    }

    #[test]
    fn numeric_like_inputs_convert() {
        assert_eq!(coerce_score(&RawScore::Int(3)).unwrap(), 3.0);
        assert_eq!(coerce_score(&RawScore::Bool(true)).unwrap(), 1.0);
        assert_eq!(coerce_score(&RawScore::Text(" 0.5 ".into())).unwrap(), 0.5);
        assert_eq!(coerce_score(&RawScore::Json(json!(0.25))).unwrap(), 0.25);
    }

    #[test]
    fn nan_text_is_a_value_error_not_a_type_error() {
        let error = coerce_score(&RawScore::Text("nan".to_string())).unwrap_err();
        assert!(matches!(error, ScoreError::Nan { .. }));
    }

    #[test]
    fn garbage_text_is_a_type_error() {
        let error = coerce_score(&RawScore::Text("not-a-score".to_string())).unwrap_err();
        assert!(matches!(error, ScoreError::NotNumeric { .. }));
    }
}
