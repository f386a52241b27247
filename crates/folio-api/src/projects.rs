//! Handlers for `/projects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/projects` | Body: [`NewProject`]; returns 201 + project |
//! | `GET`  | `/projects/:id` | Project with chapters and scenes; 404 if not found |
//! | `POST` | `/projects/:id/chapters` | Body: [`NewChapter`]; returns 201 + chapter |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use folio_ai::TextGenerator;
use folio_core::{
  project::{MAX_SCENE_WORDS, NewChapter, NewProject, ProjectView},
  store::WritingStore,
};
use uuid::Uuid;

use crate::{
  ApiState,
  error::{ApiError, store_error},
  extract::{ApiJson, ApiPath},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /projects`
pub async fn create<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiJson(body): ApiJson<NewProject>,
) -> Result<impl IntoResponse, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  if body.title.trim().is_empty() {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  let project = state
    .driver
    .store()
    .create_project(body)
    .await
    .map_err(store_error)?;
  Ok((StatusCode::CREATED, Json(project)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /projects/:id`
pub async fn get_one<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ProjectView>, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  let view = state
    .driver
    .store()
    .project_view(id)
    .await
    .map_err(store_error)?
    .ok_or_else(|| ApiError::NotFound(format!("project not found: {id}")))?;
  Ok(Json(view))
}

// ─── Chapters ─────────────────────────────────────────────────────────────────

fn validate_chapter(chapter: &NewChapter) -> Result<(), ApiError> {
  if chapter.title.trim().is_empty() {
    return Err(ApiError::BadRequest("chapter title must not be empty".into()));
  }
  for (i, scene) in chapter.scenes.iter().enumerate() {
    if scene.summary.trim().is_empty() {
      return Err(ApiError::BadRequest(format!("scene {i}: summary must not be empty")));
    }
    if !(1..=MAX_SCENE_WORDS).contains(&scene.target_words) {
      return Err(ApiError::BadRequest(format!(
        "scene {i}: targetWords must be between 1 and {MAX_SCENE_WORDS}, got {}",
        scene.target_words
      )));
    }
  }
  Ok(())
}

/// `POST /projects/:id/chapters`
pub async fn add_chapter<S, G>(
  State(state): State<ApiState<S, G>>,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<NewChapter>,
) -> Result<impl IntoResponse, ApiError>
where
  S: WritingStore,
  G: TextGenerator,
{
  validate_chapter(&body)?;
  let store = state.driver.store();
  store
    .get_project(id)
    .await
    .map_err(store_error)?
    .ok_or_else(|| ApiError::NotFound(format!("project not found: {id}")))?;

  let chapter = store.add_chapter(id, body).await.map_err(store_error)?;
  Ok((StatusCode::CREATED, Json(chapter)))
}
