//! Error type for `folio-writer`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("project not found: {0}")]
  ProjectNotFound(Uuid),

  #[error("background writing is already running for project {0}")]
  AlreadyRunning(Uuid),

  #[error("project {0} has no unwritten scenes")]
  NothingToWrite(Uuid),

  #[error("continuation queue is closed")]
  QueueClosed,

  #[error("core error: {0}")]
  Core(#[from] folio_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
