//! Error types for `folio-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid monthly word limit: {0}")]
  InvalidLimit(i64),

  #[error("credit amount must be positive, got {0}")]
  NonPositiveCredit(i64),

  #[error("{0} credits are recorded by generation, not granted")]
  ReservedCreditKind(String),

  #[error("unknown writing status: {0:?}")]
  UnknownWritingStatus(String),

  #[error("unknown scene status: {0:?}")]
  UnknownSceneStatus(String),

  #[error("unknown credit kind: {0:?}")]
  UnknownCreditKind(String),

  #[error("invalid month key: {0:?}")]
  InvalidMonth(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
