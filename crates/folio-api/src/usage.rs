//! Handlers for `/usage` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/usage/:user_id` | Current month's [`UsageSummary`] |
//! | `GET`  | `/usage/:user_id/can-generate` | `?words=N`; advisory only |
//! | `POST` | `/usage/consume` | Body: `{"userId":...,"wordCount":N}` |

use axum::{Json, extract::State};
use folio_ai::TextGenerator;
use folio_core::{ledger::UsageSummary, store::WritingStore};
use folio_writer::Consumption;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ApiState,
  error::ApiError,
  extract::{ApiJson, ApiPath, ApiQuery},
};

/// `GET /usage/:user_id`
pub async fn summary<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<UsageSummary>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  Ok(Json(state.driver.ledger().usage_summary(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CanGenerateParams {
  pub words: i64,
}

#[derive(Debug, Serialize)]
pub struct CanGenerate {
  pub allowed: bool,
}

/// `GET /usage/:user_id/can-generate?words=N`
pub async fn can_generate<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(user_id): ApiPath<Uuid>,
  ApiQuery(params): ApiQuery<CanGenerateParams>,
) -> Result<Json<CanGenerate>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  if params.words < 0 {
    return Err(ApiError::BadRequest("words must not be negative".into()));
  }
  let allowed = state
    .driver
    .ledger()
    .can_generate(user_id, params.words)
    .await?;
  Ok(Json(CanGenerate { allowed }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeBody {
  pub user_id:    Uuid,
  pub word_count: i64,
}

/// `POST /usage/consume`
pub async fn consume<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiJson(body): ApiJson<ConsumeBody>,
) -> Result<Json<Consumption>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  if body.word_count < 0 {
    return Err(ApiError::BadRequest("wordCount must not be negative".into()));
  }
  let consumption = state
    .driver
    .ledger()
    .consume(body.user_id, body.word_count)
    .await?;
  Ok(Json(consumption))
}
