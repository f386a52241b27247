//! The `WritingStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `folio-store-sqlite`).
//! Higher layers (`folio-writer`, `folio-api`) depend on this abstraction,
//! not on any concrete backend. Each mutating method is expected to be
//! atomic on its own; no method spans more than one logical step of a job.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  ledger::{CreditGrant, NewCreditGrant, Profile, WordLimit},
  project::{ChapterView, NewChapter, NewProject, Project, ProjectView, SceneTask, WritingStatus},
};

/// Abstraction over a Folio storage backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait WritingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  fn get_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// Return the profile for `user_id`, creating it with `default_limit` and
  /// an empty extra balance if it does not exist yet.
  fn ensure_profile(
    &self,
    user_id: Uuid,
    default_limit: WordLimit,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  /// Change the monthly quota of an existing profile.
  fn set_monthly_limit(
    &self,
    user_id: Uuid,
    limit: WordLimit,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Words generated by `user_id` during `month` (`YYYY-MM`); zero when no
  /// usage record exists.
  fn words_generated<'a>(
    &'a self,
    user_id: Uuid,
    month: &'a str,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  /// Atomically add `amount` to the usage record for `(user_id, month)`,
  /// creating it if needed. Returns the new total.
  fn increment_words_generated<'a>(
    &'a self,
    user_id: Uuid,
    month: &'a str,
    amount: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  /// Atomically draw up to `amount` words from the extra balance, never
  /// taking it below zero, and record an overflow-draw grant. Returns the
  /// amount actually drawn.
  fn use_extra_credits(
    &self,
    user_id: Uuid,
    amount: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Atomically add a top-up to the extra balance and record it.
  fn add_extra_credits(
    &self,
    grant: NewCreditGrant,
  ) -> impl Future<Output = Result<CreditGrant, Self::Error>> + Send + '_;

  /// All grants for `user_id`, oldest first.
  fn list_credit_grants(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CreditGrant>, Self::Error>> + Send + '_;

  /// Mark every profile last reset before `cutoff` as reset now and drop
  /// usage records for months before `oldest_kept_month`. Returns the number
  /// of profiles reset.
  fn reset_credits<'a>(
    &'a self,
    cutoff: DateTime<Utc>,
    oldest_kept_month: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Projects and outlines ─────────────────────────────────────────────

  fn create_project(
    &self,
    input: NewProject,
  ) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  fn get_project(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + '_;

  /// The project with all chapters and scenes in writing order.
  fn project_view(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<ProjectView>, Self::Error>> + Send + '_;

  /// Append a chapter (with its scene outline) to a project.
  fn add_chapter(
    &self,
    project_id: Uuid,
    input: NewChapter,
  ) -> impl Future<Output = Result<ChapterView, Self::Error>> + Send + '_;

  // ── Background writing ────────────────────────────────────────────────

  /// Move a project to `background_writing` unless a job is already active.
  ///
  /// A single conditional update: returns `false` without touching the row
  /// when the status is `background_writing` or `in_progress`.
  fn begin_background_write(
    &self,
    project_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set the writing status (and error message) and bump `updated_at`.
  fn set_writing_status(
    &self,
    project_id: Uuid,
    status: WritingStatus,
    error: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The first scene, in outline order, that is `pending` or `writing`.
  fn next_scene(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<SceneTask>, Self::Error>> + Send + '_;

  /// Number of scenes not yet `done`.
  fn unfinished_scene_count(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Mark a scene `writing` and its project `in_progress`.
  fn claim_scene(
    &self,
    project_id: Uuid,
    scene_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Persist generated text for a scene: mark it `done`, append the text to
  /// its chapter, and recompute chapter and project word counts.
  ///
  /// Returns the project's new word count, or `None` without writing
  /// anything if the scene was already `done`.
  fn complete_scene<'a>(
    &'a self,
    scene_id: Uuid,
    content: &'a str,
    word_count: i64,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  /// Active projects whose row has not changed since `before`.
  fn stalled_projects(
    &self,
    before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;
}
