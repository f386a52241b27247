//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored as their snake_case names.

use chrono::{DateTime, SecondsFormat, Utc};
use folio_core::{
  ledger::{CreditGrant, CreditKind, Profile, WordLimit},
  project::{Chapter, Project, Scene, SceneStatus, WritingStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width UTC form, so stored timestamps compare correctly as text.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_writing_status(s: &str) -> Result<WritingStatus> {
  s.parse()
    .map_err(|_| folio_core::Error::UnknownWritingStatus(s.to_owned()).into())
}

pub fn decode_scene_status(s: &str) -> Result<SceneStatus> {
  s.parse()
    .map_err(|_| folio_core::Error::UnknownSceneStatus(s.to_owned()).into())
}

pub fn decode_credit_kind(s: &str) -> Result<CreditKind> {
  s.parse()
    .map_err(|_| folio_core::Error::UnknownCreditKind(s.to_owned()).into())
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PROFILE_COLUMNS: &str =
  "user_id, monthly_word_limit, extra_words_balance, credits_reset_at, created_at";

/// Raw values read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:             String,
  pub monthly_word_limit:  i64,
  pub extra_words_balance: i64,
  pub credits_reset_at:    Option<String>,
  pub created_at:          String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:             row.get(0)?,
      monthly_word_limit:  row.get(1)?,
      extra_words_balance: row.get(2)?,
      credits_reset_at:    row.get(3)?,
      created_at:          row.get(4)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      user_id:             decode_uuid(&self.user_id)?,
      monthly_word_limit:  WordLimit::try_from(self.monthly_word_limit)?,
      extra_words_balance: self.extra_words_balance,
      credits_reset_at:    decode_opt_dt(self.credits_reset_at)?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

pub const GRANT_COLUMNS: &str = "grant_id, user_id, kind, amount, note, recorded_at";

/// Raw values read directly from a `credit_grants` row.
pub struct RawGrant {
  pub grant_id:    String,
  pub user_id:     String,
  pub kind:        String,
  pub amount:      i64,
  pub note:        Option<String>,
  pub recorded_at: String,
}

impl RawGrant {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      grant_id:    row.get(0)?,
      user_id:     row.get(1)?,
      kind:        row.get(2)?,
      amount:      row.get(3)?,
      note:        row.get(4)?,
      recorded_at: row.get(5)?,
    })
  }

  pub fn into_grant(self) -> Result<CreditGrant> {
    Ok(CreditGrant {
      grant_id:    decode_uuid(&self.grant_id)?,
      user_id:     decode_uuid(&self.user_id)?,
      kind:        decode_credit_kind(&self.kind)?,
      amount:      self.amount,
      note:        self.note,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

pub const PROJECT_COLUMNS: &str = "project_id, user_id, title, genre, description, \
   writing_status, writing_started_at, writing_error, word_count, created_at, updated_at";

/// Raw values read directly from a `projects` row.
pub struct RawProject {
  pub project_id:         String,
  pub user_id:            String,
  pub title:              String,
  pub genre:              Option<String>,
  pub description:        Option<String>,
  pub writing_status:     String,
  pub writing_started_at: Option<String>,
  pub writing_error:      Option<String>,
  pub word_count:         i64,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawProject {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      project_id:         row.get(0)?,
      user_id:            row.get(1)?,
      title:              row.get(2)?,
      genre:              row.get(3)?,
      description:        row.get(4)?,
      writing_status:     row.get(5)?,
      writing_started_at: row.get(6)?,
      writing_error:      row.get(7)?,
      word_count:         row.get(8)?,
      created_at:         row.get(9)?,
      updated_at:         row.get(10)?,
    })
  }

  pub fn into_project(self) -> Result<Project> {
    Ok(Project {
      project_id:         decode_uuid(&self.project_id)?,
      user_id:            decode_uuid(&self.user_id)?,
      title:              self.title,
      genre:              self.genre,
      description:        self.description,
      writing_status:     decode_writing_status(&self.writing_status)?,
      writing_started_at: decode_opt_dt(self.writing_started_at)?,
      writing_error:      self.writing_error,
      word_count:         self.word_count,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

pub const CHAPTER_COLUMNS: &str =
  "chapter_id, project_id, position, title, content, word_count";

/// Raw values read directly from a `chapters` row.
pub struct RawChapter {
  pub chapter_id: String,
  pub project_id: String,
  pub position:   i64,
  pub title:      String,
  pub content:    String,
  pub word_count: i64,
}

impl RawChapter {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chapter_id: row.get(0)?,
      project_id: row.get(1)?,
      position:   row.get(2)?,
      title:      row.get(3)?,
      content:    row.get(4)?,
      word_count: row.get(5)?,
    })
  }

  pub fn into_chapter(self) -> Result<Chapter> {
    Ok(Chapter {
      chapter_id: decode_uuid(&self.chapter_id)?,
      project_id: decode_uuid(&self.project_id)?,
      position:   self.position,
      title:      self.title,
      content:    self.content,
      word_count: self.word_count,
    })
  }
}

/// Always selected from `scenes s`; the prefix keeps joins with `chapters`
/// unambiguous.
pub const SCENE_COLUMNS: &str = "s.scene_id, s.chapter_id, s.position, s.summary, \
   s.target_words, s.status, s.content, s.word_count";

/// Raw values read directly from a `scenes` row.
pub struct RawScene {
  pub scene_id:     String,
  pub chapter_id:   String,
  pub position:     i64,
  pub summary:      String,
  pub target_words: i64,
  pub status:       String,
  pub content:      Option<String>,
  pub word_count:   i64,
}

impl RawScene {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      scene_id:     row.get(0)?,
      chapter_id:   row.get(1)?,
      position:     row.get(2)?,
      summary:      row.get(3)?,
      target_words: row.get(4)?,
      status:       row.get(5)?,
      content:      row.get(6)?,
      word_count:   row.get(7)?,
    })
  }

  pub fn into_scene(self) -> Result<Scene> {
    Ok(Scene {
      scene_id:     decode_uuid(&self.scene_id)?,
      chapter_id:   decode_uuid(&self.chapter_id)?,
      position:     self.position,
      summary:      self.summary,
      target_words: self.target_words,
      status:       decode_scene_status(&self.status)?,
      content:      self.content,
      word_count:   self.word_count,
    })
  }
}
