use thiserror::Error;

/// Main error type for the Spyglass optimization core
#[derive(Error, Debug)]
pub enum SgError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Argument error: {0}")]
    Argument(#[from] ArgumentError),

    #[error("Score error: {0}")]
    Score(#[from] ScoreError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Search-space construction errors. Raised when a spec is built,
/// never at sampling/application time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("categorical parameter '{name}' requires non-empty choices")]
    MissingChoices { name: String },

    #[error("parameter '{name}': low {low} must be strictly below high {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("parameter '{name}': log scale requires low > 0, got {low}")]
    InvalidLogBounds { name: String, low: f64 },

    #[error("duplicate parameter name: '{name}'")]
    DuplicateParameter { name: String },

    #[error("parameter '{name}': unknown distribution '{value}'")]
    UnknownDistribution { name: String, value: String },

    #[error("parameter '{name}': missing required field '{field}'")]
    MissingField { name: String, field: String },

    #[error("parameter '{name}': {message}")]
    InvalidSpec { name: String, message: String },
}

/// Invalid arguments to the public optimization entry points.
/// Raised before any evaluation runs.
#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("prompt argument must contain at least one prompt")]
    EmptyPromptSet,

    #[error("prompt name must be a non-empty string")]
    BlankPromptName,

    #[error("invalid argument: {message}")]
    Invalid { message: String },
}

/// Score validation errors.
///
/// NaN is a value error with a descriptive message; inputs that are not
/// numeric at all are a type error. Positive and negative infinity are
/// valid scores, not errors.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("score is NaN: {context}")]
    Nan { context: String },

    #[error("cannot convert {type_name} to a numeric score")]
    NotNumeric { type_name: String },
}

/// Opaque failures from the evaluation collaborator. The core propagates
/// these unmodified and never retries them.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("{message}")]
    Failed { message: String },
}

impl EvalError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Result type alias for Spyglass operations
pub type SgResult<T> = Result<T, SgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::MissingChoices {
            name: "style".to_string(),
        };
        assert!(error.to_string().contains("style"));
        assert!(error.to_string().contains("choices"));
    }

    #[test]
    fn score_error_classes() {
        let nan = ScoreError::Nan {
            context: "metric returned an undefined value".to_string(),
        };
        assert!(nan.to_string().contains("NaN"));

        let ty = ScoreError::NotNumeric {
            type_name: "object".to_string(),
        };
        assert!(ty.to_string().contains("object"));
    }

    #[test]
    fn error_conversion() {
        let arg_error = ArgumentError::EmptyPromptSet;
        let sg_error: SgError = arg_error.into();

        match sg_error {
            SgError::Argument(_) => (),
            _ => panic!("Expected Argument error"),
        }
    }
}
