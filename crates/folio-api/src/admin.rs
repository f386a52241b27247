//! Administrative handlers: credit grants, quotas and the monthly reset.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/admin/credits` | Body: `{"userId","amount","kind","note"?}`; returns 201 + grant |
//! | `GET`  | `/admin/users/:user_id/credits` | Grant history, oldest first |
//! | `PUT`  | `/admin/users/:user_id/limit` | Body: `{"monthlyWordLimit":N}`, `-1` = unlimited |
//! | `POST` | `/admin/reset-credits` | Body (optional): `{"cutoff"?}` |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use folio_ai::TextGenerator;
use folio_core::{
  ledger::{CreditGrant, CreditKind, NewCreditGrant, Profile, WordLimit},
  store::WritingStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ApiState,
  error::ApiError,
  extract::{ApiJson, ApiPath},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBody {
  pub user_id: Uuid,
  pub amount:  i64,
  pub kind:    CreditKind,
  pub note:    Option<String>,
}

/// `POST /admin/credits`
pub async fn add_credits<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiJson(body): ApiJson<CreditBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  let grant = NewCreditGrant::top_up(body.user_id, body.kind, body.amount, body.note)?;
  let recorded = state.driver.ledger().add_extra_credits(grant).await?;
  Ok((StatusCode::CREATED, Json(recorded)))
}

/// `GET /admin/users/:user_id/credits`
pub async fn list_credits<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<Vec<CreditGrant>>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  Ok(Json(state.driver.ledger().credit_grants(user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitBody {
  pub monthly_word_limit: WordLimit,
}

/// `PUT /admin/users/:user_id/limit`
pub async fn set_limit<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(user_id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<LimitBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  let profile = state
    .driver
    .ledger()
    .set_monthly_limit(user_id, body.monthly_word_limit)
    .await?;
  tracing::info!(%user_id, limit = ?profile.monthly_word_limit, "monthly limit changed");
  Ok(Json(profile))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetBody {
  #[serde(default)]
  pub cutoff: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
  pub reset: u64,
}

/// `POST /admin/reset-credits`
pub async fn reset_credits<S, G>(
  State(state): State<ApiState<S, G>>,
  body: Option<ApiJson<ResetBody>>,
) -> Result<Json<ResetResponse>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  let ResetBody { cutoff } = body.map(|ApiJson(b)| b).unwrap_or_default();
  let reset = state
    .driver
    .ledger()
    .reset_credits(cutoff, state.usage_retention_months)
    .await?;
  Ok(Json(ResetResponse { reset }))
}
