//! Error type for `folio-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] folio_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("profile not found: {0}")]
  ProfileNotFound(uuid::Uuid),

  #[error("project not found: {0}")]
  ProjectNotFound(uuid::Uuid),

  #[error("scene not found: {0}")]
  SceneNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
