//! Error types for the ExoAI classifier

use thiserror::Error;

/// Result type alias for ExoAI operations
pub type Result<T> = std::result::Result<T, ExoError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ExoError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Missing artifact: {0}")]
    ArtifactMissing(String),

    /// Request-level validation failure (bad body, unknown model id, missing keys)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Batch input lacks required headers; carries exactly the absent names
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

impl ExoError {
    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExoError::ValidationError(_) | ExoError::MissingColumns(_))
    }
}

impl From<polars::error::PolarsError> for ExoError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExoError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExoError {
    fn from(err: serde_json::Error) -> Self {
        ExoError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExoError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExoError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExoError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_missing_columns_lists_names() {
        let err = ExoError::MissingColumns(vec!["Transit Depth".to_string(), "Stellar Radius".to_string()]);
        assert_eq!(err.to_string(), "Missing required columns: Transit Depth, Stellar Radius");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExoError = io_err.into();
        assert!(matches!(err, ExoError::IoError(_)));
        assert!(!err.is_client_error());
    }
}
