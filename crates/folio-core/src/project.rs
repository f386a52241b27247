//! Projects, chapters, and the scene outlines a background job writes.
//!
//! A project's `writing_status` is the state machine of its background
//! writing job:
//!
//! ```text
//! idle -> background_writing -> in_progress (one scene per step) -> completed | error
//! ```
//!
//! Terminal projects (`completed`, `error`) may be started again; scenes that
//! are already `done` are not rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Statuses ────────────────────────────────────────────────────────────────

/// Position of a project in the background writing state machine.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WritingStatus {
  #[default]
  Idle,
  /// Accepted by `start`; no scene has been picked up yet.
  BackgroundWriting,
  /// A scene step is running or has been scheduled.
  InProgress,
  Completed,
  Error,
}

impl WritingStatus {
  /// A job is running; starting another must be rejected.
  pub fn is_active(&self) -> bool {
    matches!(self, Self::BackgroundWriting | Self::InProgress)
  }
}

/// Progress of a single planned scene.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SceneStatus {
  #[default]
  Pending,
  Writing,
  Done,
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub project_id:         Uuid,
  pub user_id:            Uuid,
  pub title:              String,
  pub genre:              Option<String>,
  pub description:        Option<String>,
  pub writing_status:     WritingStatus,
  pub writing_started_at: Option<DateTime<Utc>>,
  /// Message of the failure that moved the job to `error`.
  pub writing_error:      Option<String>,
  pub word_count:         i64,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub chapter_id: Uuid,
  pub project_id: Uuid,
  /// Zero-based order within the project.
  pub position:   i64,
  pub title:      String,
  /// Concatenated text of the chapter's finished scenes.
  pub content:    String,
  pub word_count: i64,
}

/// A planned unit of chapter content with a target length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
  pub scene_id:     Uuid,
  pub chapter_id:   Uuid,
  /// Zero-based order within the chapter.
  pub position:     i64,
  pub summary:      String,
  pub target_words: i64,
  pub status:       SceneStatus,
  pub content:      Option<String>,
  pub word_count:   i64,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::WritingStore::create_project`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  pub user_id:     Uuid,
  pub title:       String,
  pub genre:       Option<String>,
  pub description: Option<String>,
}

/// Largest `target_words` a single scene may ask for.
pub const MAX_SCENE_WORDS: i64 = 20_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScene {
  pub summary:      String,
  pub target_words: i64,
}

/// Input to [`crate::store::WritingStore::add_chapter`]. The chapter is
/// appended after the project's existing chapters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChapter {
  pub title:  String,
  #[serde(default)]
  pub scenes: Vec<NewScene>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
  #[serde(flatten)]
  pub chapter: Chapter,
  pub scenes:  Vec<Scene>,
}

/// A project with its full outline, in writing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
  #[serde(flatten)]
  pub project:  Project,
  pub chapters: Vec<ChapterView>,
}

/// Everything a driver step needs to write the next scene.
#[derive(Debug, Clone)]
pub struct SceneTask {
  pub project:       Project,
  pub chapter_title: String,
  pub scene:         Scene,
  /// Content of the last finished scene before this one, if any.
  pub previous_text: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_running_statuses_are_active() {
    assert!(WritingStatus::BackgroundWriting.is_active());
    assert!(WritingStatus::InProgress.is_active());
    assert!(!WritingStatus::Idle.is_active());
    assert!(!WritingStatus::Completed.is_active());
    assert!(!WritingStatus::Error.is_active());
  }

  #[test]
  fn statuses_use_snake_case_strings() {
    assert_eq!(WritingStatus::BackgroundWriting.as_ref(), "background_writing");
    assert_eq!("in_progress".parse::<WritingStatus>().unwrap(), WritingStatus::InProgress);
    assert_eq!(
      serde_json::to_string(&WritingStatus::InProgress).unwrap(),
      "\"in_progress\""
    );
    assert_eq!(SceneStatus::Done.to_string(), "done");
    assert!("finished".parse::<SceneStatus>().is_err());
  }
}
