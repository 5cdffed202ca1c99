//! Error types, one enum per collaborator seam plus the worker-level union.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required environment variables: {}", .0.join(", "))]
  Missing(Vec<String>),

  #[error("invalid {field}: {reason}")]
  Invalid { field: String, reason: String },
}

impl ConfigError {
  pub fn invalid(field: &str, reason: &str) -> Self {
    Self::Invalid {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database: {0}")]
  Database(#[from] sqlx_core::Error),

  #[error("store: {0}")]
  Other(String),
}

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("object not found: {bucket}/{key}")]
  NotFound { bucket: String, key: String },

  #[error("object store: {0}")]
  ObjectStore(#[from] object_store::Error),

  #[error("blob: {0}")]
  Other(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
  #[error("amqp: {0}")]
  Amqp(#[from] lapin::Error),

  #[error("queue: {0}")]
  Other(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Blob(#[from] BlobError),

  #[error(transparent)]
  Queue(#[from] QueueError),

  #[error("analysis: {0}")]
  Analysis(#[from] log_analyzer::AnalysisError),

  #[error("analysis task aborted: {0}")]
  Aborted(String),
}
