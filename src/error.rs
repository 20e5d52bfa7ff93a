//! Error types for the stores and the adaptive engine.

use thiserror::Error;

/// Failures reported by a store backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
  /// Backend could not be reached; worth retrying.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("commit failed: {0}")]
  Commit(String),

  #[error("corrupt record: {0}")]
  Corrupt(String),
}

impl StoreError {
  pub fn is_transient(&self) -> bool {
    matches!(self, StoreError::Unavailable(_))
  }
}

/// Failures surfaced by `record_response`. Selection never returns these.
#[derive(Error, Debug)]
pub enum EngineError {
  #[error("statistics for {item_id} were not persisted: {source}")]
  Persistence {
    item_id: String,
    #[source]
    source: StoreError,
  },

  #[error("statistics for {item_id} could not be read: {source}")]
  Read {
    item_id: String,
    #[source]
    source: StoreError,
  },
}

/// Why no question could be selected. Returned as a value, callers are expected to act on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Unavailable {
  /// The category has no questions at all.
  PoolExhausted,
  /// The question bank itself could not be read.
  CatalogUnavailable(String),
}

impl std::fmt::Display for Unavailable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Unavailable::PoolExhausted => write!(f, "no questions available in this category"),
      Unavailable::CatalogUnavailable(e) => write!(f, "question bank unavailable: {}", e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_unavailable_is_transient() {
    assert!(StoreError::Unavailable("timeout".into()).is_transient());
    assert!(!StoreError::Commit("constraint".into()).is_transient());
    assert!(!StoreError::Corrupt("bad row".into()).is_transient());
  }

  #[test]
  fn persistence_error_names_the_item() {
    let err = EngineError::Persistence {
      item_id: "q-1".into(),
      source: StoreError::Commit("disk full".into()),
    };
    assert_eq!(err.to_string(), "statistics for q-1 were not persisted: commit failed: disk full");
  }

  #[test]
  fn read_error_keeps_the_store_cause() {
    let err = EngineError::Read { item_id: "q-2".into(), source: StoreError::Unavailable("timeout".into()) };
    assert_eq!(err.to_string(), "statistics for q-2 could not be read: store unavailable: timeout");
  }
}
