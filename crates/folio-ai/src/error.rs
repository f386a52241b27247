//! Error type for `folio-ai`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Every attempt was answered with HTTP 429.
  #[error("rate limited by AI gateway after {attempts} attempts")]
  RateLimited { attempts: u32 },

  /// A non-2xx, non-429 answer. Not retried.
  #[error("AI gateway returned {status}: {message}")]
  Upstream { status: u16, message: String },

  #[error("AI gateway request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("AI gateway returned no completion text")]
  EmptyCompletion,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
