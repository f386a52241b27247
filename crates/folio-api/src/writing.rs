//! Handlers for the background writing endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/start-background-write` | Body: `{"projectId":...}`; 400 if already running |
//! | `POST` | `/process-next-scene` | Runs one step inline; 500 with the gateway message on failure |

use axum::{Json, extract::State};
use folio_ai::TextGenerator;
use folio_core::store::WritingStore;
use folio_writer::{StartReceipt, StepOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, extract::ApiJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
  pub project_id: Uuid,
}

/// `POST /start-background-write`
pub async fn start<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiJson(body): ApiJson<ProjectRef>,
) -> Result<Json<StartReceipt>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  Ok(Json(state.driver.start(body.project_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
  pub project_id: Uuid,
  #[serde(flatten)]
  pub outcome:    StepOutcome,
}

/// `POST /process-next-scene`
pub async fn process_next_scene<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiJson(body): ApiJson<ProjectRef>,
) -> Result<Json<StepResponse>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  match state.driver.process_next_scene(body.project_id).await? {
    StepOutcome::Failed { message } => Err(ApiError::Upstream(message)),
    outcome => Ok(Json(StepResponse { project_id: body.project_id, outcome })),
  }
}
