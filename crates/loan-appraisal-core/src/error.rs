use thiserror::Error;

#[cfg(feature = "narrative")]
use crate::lending::narrative::NarrativeError;

#[derive(Debug, Error)]
pub enum LoanAppraisalError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "narrative")]
    #[error("Narrative analysis failed: {0}")]
    Narrative(#[from] NarrativeError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for LoanAppraisalError {
    fn from(e: serde_json::Error) -> Self {
        LoanAppraisalError::SerializationError(e.to_string())
    }
}
