//! Structured error types for the log analyzer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl AnalysisError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
