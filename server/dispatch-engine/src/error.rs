//! Structured error types for the dispatch engine.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("invalid argument: {field}: {reason}")]
  InvalidArgument { field: String, reason: String },

  #[error("invalid {kind}: {value:?}")]
  InvalidEnumValue { kind: &'static str, value: String },

  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  #[error("invalid state transition: {0}")]
  InvalidStateTransition(String),

  #[error("snapshot: {0}")]
  Snapshot(String),

  #[error("io: {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn invalid_argument(field: &str, reason: &str) -> Self {
    Self::InvalidArgument {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn invalid_enum(kind: &'static str, value: &str) -> Self {
    Self::InvalidEnumValue {
      kind,
      value: value.to_string(),
    }
  }

  pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
    Self::NotFound {
      kind,
      id: id.to_string(),
    }
  }

  pub fn transition(msg: impl Into<String>) -> Self {
    Self::InvalidStateTransition(msg.into())
  }

  pub fn snapshot(msg: impl Into<String>) -> Self {
    Self::Snapshot(msg.into())
  }

  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
