//! JSON REST API for Folio.
//!
//! Exposes axum [`Router`]s backed by a [`folio_writer::Driver`] over any
//! [`folio_core::store::WritingStore`]. Auth, TLS, and transport concerns are
//! the caller's responsibility: [`admin_router`] in particular must be
//! mounted behind authentication.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .merge(folio_api::api_router(state.clone()))
//!   .merge(folio_api::admin_router(state).layer(auth))
//! ```

pub mod admin;
pub mod error;
pub mod extract;
pub mod projects;
pub mod usage;
pub mod writing;

use axum::{
  Router,
  routing::{get, post, put},
};
use folio_ai::TextGenerator;
use folio_core::store::WritingStore;
use folio_writer::Driver;

pub use error::ApiError;

/// Shared state for every handler.
pub struct ApiState<S, G> {
  pub driver:                 Driver<S, G>,
  /// How many months of usage records a credit reset keeps.
  pub usage_retention_months: u32,
}

impl<S, G> Clone for ApiState<S, G> {
  fn clone(&self) -> Self {
    Self {
      driver:                 self.driver.clone(),
      usage_retention_months: self.usage_retention_months,
    }
  }
}

/// Build the public API router.
///
/// The returned `Router<()>` can be merged into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(state: ApiState<S, G>) -> Router<()>
where
  S: WritingStore + 'static,
  G: TextGenerator + 'static,
{
  Router::new()
    // Background writing
    .route("/start-background-write", post(writing::start::<S, G>))
    .route("/process-next-scene", post(writing::process_next_scene::<S, G>))
    // Projects
    .route("/projects", post(projects::create::<S, G>))
    .route("/projects/{id}", get(projects::get_one::<S, G>))
    .route("/projects/{id}/chapters", post(projects::add_chapter::<S, G>))
    // Usage
    .route("/usage/consume", post(usage::consume::<S, G>))
    .route("/usage/{user_id}", get(usage::summary::<S, G>))
    .route("/usage/{user_id}/can-generate", get(usage::can_generate::<S, G>))
    .with_state(state)
}

/// Build the administrative router. Unauthenticated; wrap it.
pub fn admin_router<S, G>(state: ApiState<S, G>) -> Router<()>
where
  S: WritingStore + 'static,
  G: TextGenerator + 'static,
{
  Router::new()
    .route("/admin/credits", post(admin::add_credits::<S, G>))
    .route("/admin/users/{user_id}/credits", get(admin::list_credits::<S, G>))
    .route("/admin/users/{user_id}/limit", put(admin::set_limit::<S, G>))
    .route("/admin/reset-credits", post(admin::reset_credits::<S, G>))
    .with_state(state)
}
