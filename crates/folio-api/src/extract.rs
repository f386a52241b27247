//! Extractors whose rejections render as [`ApiError`] JSON.

use axum::{
  Json,
  extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Option<ApiJson<T>>` is `None` when the request has no JSON content type.
impl<T, S> OptionalFromRequest<S> for ApiJson<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
    let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
    Ok(body.map(|Json(value)| Self(value)))
  }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
