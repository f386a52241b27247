//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Always rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  /// The AI gateway rejected or failed a generation.
  #[error("{0}")]
  Upstream(String),

  #[error("{0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Upstream(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<folio_writer::Error> for ApiError {
  fn from(e: folio_writer::Error) -> Self {
    use folio_writer::Error as E;
    match e {
      E::ProjectNotFound(_) => ApiError::NotFound(e.to_string()),
      E::AlreadyRunning(_) | E::NothingToWrite(_) | E::Core(_) => {
        ApiError::BadRequest(e.to_string())
      }
      E::QueueClosed | E::Store(_) => ApiError::Internal(Box::new(e)),
    }
  }
}

impl From<folio_core::Error> for ApiError {
  fn from(e: folio_core::Error) -> Self { ApiError::BadRequest(e.to_string()) }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

pub(crate) fn store_error(e: impl std::error::Error + Send + Sync + 'static) -> ApiError {
  ApiError::Internal(Box::new(e))
}
