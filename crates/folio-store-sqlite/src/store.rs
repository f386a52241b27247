//! [`SqliteStore`], the SQLite implementation of [`WritingStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use folio_core::{
  ledger::{CreditGrant, CreditKind, NewCreditGrant, Profile, WordLimit},
  project::{
    Chapter, ChapterView, NewChapter, NewProject, Project, ProjectView, Scene,
    SceneStatus, SceneTask, WritingStatus,
  },
  store::WritingStore,
};

use crate::{
  encode::{
    CHAPTER_COLUMNS, GRANT_COLUMNS, PROFILE_COLUMNS, PROJECT_COLUMNS, RawChapter,
    RawGrant, RawProfile, RawProject, RawScene, SCENE_COLUMNS, decode_uuid,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Folio store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every
/// mutating method runs as one statement or one `IMMEDIATE` transaction on
/// the connection thread, which is the only mutual exclusion the ledger and
/// the writing driver rely on.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }
}

fn select_project(
  conn: &rusqlite::Connection,
  id_str: &str,
) -> rusqlite::Result<Option<RawProject>> {
  conn
    .query_row(
      &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
      rusqlite::params![id_str],
      RawProject::from_row,
    )
    .optional()
}

const ACTIVE_STATUSES: &str = "('background_writing', 'in_progress')";

// ─── WritingStore impl ───────────────────────────────────────────────────────

impl WritingStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    self.fetch_profile(user_id).await
  }

  async fn ensure_profile(
    &self,
    user_id:       Uuid,
    default_limit: WordLimit,
  ) -> Result<Profile> {
    let id_str    = encode_uuid(user_id);
    let limit_raw = i64::from(default_limit);
    let at_str    = encode_dt(Utc::now());

    let raw: RawProfile = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO profiles (user_id, monthly_word_limit, created_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, limit_raw, at_str],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
          rusqlite::params![id_str],
          RawProfile::from_row,
        )?)
      })
      .await?;

    raw.into_profile()
  }

  async fn set_monthly_limit(&self, user_id: Uuid, limit: WordLimit) -> Result<Profile> {
    let id_str    = encode_uuid(user_id);
    let limit_raw = i64::from(limit);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET monthly_word_limit = ?2 WHERE user_id = ?1",
          rusqlite::params![id_str, limit_raw],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ProfileNotFound(user_id));
    }
    self
      .fetch_profile(user_id)
      .await?
      .ok_or(Error::ProfileNotFound(user_id))
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn words_generated(&self, user_id: Uuid, month: &str) -> Result<i64> {
    let id_str = encode_uuid(user_id);
    let month  = month.to_owned();

    let words = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT words_generated FROM usage_records
               WHERE user_id = ?1 AND month = ?2",
              rusqlite::params![id_str, month],
              |r| r.get::<_, i64>(0),
            )
            .optional()?
            .unwrap_or(0),
        )
      })
      .await?;

    Ok(words)
  }

  async fn increment_words_generated(
    &self,
    user_id: Uuid,
    month:   &str,
    amount:  i64,
  ) -> Result<i64> {
    // The counter only ever grows, and a zero charge must not create a row.
    if amount <= 0 {
      return self.words_generated(user_id, month).await;
    }

    let id_str = encode_uuid(user_id);
    let month  = month.to_owned();

    let total = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO usage_records (user_id, month, words_generated)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (user_id, month)
           DO UPDATE SET words_generated = words_generated + excluded.words_generated
           RETURNING words_generated",
          rusqlite::params![id_str, month, amount],
          |r| r.get::<_, i64>(0),
        )?)
      })
      .await?;

    Ok(total)
  }

  async fn use_extra_credits(&self, user_id: Uuid, amount: i64) -> Result<i64> {
    if amount <= 0 {
      return Ok(0);
    }

    let id_str    = encode_uuid(user_id);
    let grant_str = encode_uuid(Uuid::new_v4());
    let at_str    = encode_dt(Utc::now());
    let kind_str  = CreditKind::OverflowDraw.as_ref().to_owned();

    let drawn: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance: Option<i64> = tx
          .query_row(
            "SELECT extra_words_balance FROM profiles WHERE user_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(balance) = balance else {
          return Ok(None);
        };

        let drawn = amount.min(balance.max(0));
        if drawn > 0 {
          tx.execute(
            "UPDATE profiles SET extra_words_balance = extra_words_balance - ?2
             WHERE user_id = ?1",
            rusqlite::params![id_str, drawn],
          )?;
          tx.execute(
            "INSERT INTO credit_grants (grant_id, user_id, kind, amount, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            rusqlite::params![grant_str, id_str, kind_str, -drawn, at_str],
          )?;
        }

        tx.commit()?;
        Ok(Some(drawn))
      })
      .await?;

    drawn.ok_or(Error::ProfileNotFound(user_id))
  }

  async fn add_extra_credits(&self, input: NewCreditGrant) -> Result<CreditGrant> {
    let grant = CreditGrant {
      grant_id:    Uuid::new_v4(),
      user_id:     input.user_id,
      kind:        input.kind,
      amount:      input.amount,
      note:        input.note,
      recorded_at: Utc::now(),
    };

    let grant_str = encode_uuid(grant.grant_id);
    let user_str  = encode_uuid(grant.user_id);
    let kind_str  = grant.kind.as_ref().to_owned();
    let amount    = grant.amount;
    let note      = grant.note.clone();
    let at_str    = encode_dt(grant.recorded_at);

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE profiles SET extra_words_balance = extra_words_balance + ?2
           WHERE user_id = ?1",
          rusqlite::params![user_str, amount],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO credit_grants (grant_id, user_id, kind, amount, note, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![grant_str, user_str, kind_str, amount, note, at_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::ProfileNotFound(grant.user_id));
    }
    Ok(grant)
  }

  async fn list_credit_grants(&self, user_id: Uuid) -> Result<Vec<CreditGrant>> {
    let id_str = encode_uuid(user_id);

    let raws: Vec<RawGrant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {GRANT_COLUMNS} FROM credit_grants
           WHERE user_id = ?1 ORDER BY recorded_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawGrant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGrant::into_grant).collect()
  }

  async fn reset_credits(
    &self,
    cutoff:            DateTime<Utc>,
    oldest_kept_month: &str,
  ) -> Result<u64> {
    let cutoff_str = encode_dt(cutoff);
    let now_str    = encode_dt(Utc::now());
    let oldest     = oldest_kept_month.to_owned();

    let (reset, purged) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reset = tx.execute(
          "UPDATE profiles SET credits_reset_at = ?2
           WHERE credits_reset_at IS NULL OR credits_reset_at < ?1",
          rusqlite::params![cutoff_str, now_str],
        )?;
        let purged = tx.execute(
          "DELETE FROM usage_records WHERE month < ?1",
          rusqlite::params![oldest],
        )?;
        tx.commit()?;
        Ok((reset, purged))
      })
      .await?;

    tracing::debug!(reset, purged, "reset monthly credits");
    Ok(reset as u64)
  }

  // ── Projects and outlines ─────────────────────────────────────────────────

  async fn create_project(&self, input: NewProject) -> Result<Project> {
    let now = Utc::now();
    let project = Project {
      project_id:         Uuid::new_v4(),
      user_id:            input.user_id,
      title:              input.title,
      genre:              input.genre,
      description:        input.description,
      writing_status:     WritingStatus::Idle,
      writing_started_at: None,
      writing_error:      None,
      word_count:         0,
      created_at:         now,
      updated_at:         now,
    };

    let id_str      = encode_uuid(project.project_id);
    let user_str    = encode_uuid(project.user_id);
    let title       = project.title.clone();
    let genre       = project.genre.clone();
    let description = project.description.clone();
    let status_str  = project.writing_status.as_ref().to_owned();
    let at_str      = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO projects (
             project_id, user_id, title, genre, description,
             writing_status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![id_str, user_str, title, genre, description, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(project)
  }

  async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
    let id_str = encode_uuid(project_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_project(conn, &id_str)?))
      .await?;

    raw.map(RawProject::into_project).transpose()
  }

  async fn project_view(&self, project_id: Uuid) -> Result<Option<ProjectView>> {
    let id_str = encode_uuid(project_id);

    let raw = self
      .conn
      .call(move |conn| {
        let Some(project) = select_project(conn, &id_str)? else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
          "SELECT {CHAPTER_COLUMNS} FROM chapters
           WHERE project_id = ?1 ORDER BY position"
        ))?;
        let chapters = stmt
          .query_map(rusqlite::params![id_str], RawChapter::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {SCENE_COLUMNS} FROM scenes s
           JOIN chapters c ON c.chapter_id = s.chapter_id
           WHERE c.project_id = ?1
           ORDER BY c.position, s.position"
        ))?;
        let scenes = stmt
          .query_map(rusqlite::params![id_str], RawScene::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((project, chapters, scenes)))
      })
      .await?;

    let Some((project, chapters, scenes)) = raw else {
      return Ok(None);
    };

    let mut by_chapter: HashMap<Uuid, Vec<Scene>> = HashMap::new();
    for raw in scenes {
      let scene = raw.into_scene()?;
      by_chapter.entry(scene.chapter_id).or_default().push(scene);
    }

    let chapters = chapters
      .into_iter()
      .map(|raw| {
        let chapter = raw.into_chapter()?;
        let scenes  = by_chapter.remove(&chapter.chapter_id).unwrap_or_default();
        Ok(ChapterView { chapter, scenes })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Some(ProjectView { project: project.into_project()?, chapters }))
  }

  async fn add_chapter(&self, project_id: Uuid, input: NewChapter) -> Result<ChapterView> {
    let chapter_id = Uuid::new_v4();
    let scenes: Vec<Scene> = input
      .scenes
      .into_iter()
      .enumerate()
      .map(|(i, s)| Scene {
        scene_id:     Uuid::new_v4(),
        chapter_id,
        position:     i as i64,
        summary:      s.summary,
        target_words: s.target_words,
        status:       SceneStatus::Pending,
        content:      None,
        word_count:   0,
      })
      .collect();

    let project_str = encode_uuid(project_id);
    let chapter_str = encode_uuid(chapter_id);
    let title       = input.title.clone();
    let at_str      = encode_dt(Utc::now());
    let scene_rows: Vec<(String, i64, String, i64)> = scenes
      .iter()
      .map(|s| (encode_uuid(s.scene_id), s.position, s.summary.clone(), s.target_words))
      .collect();

    let position: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let touched = tx.execute(
          "UPDATE projects SET updated_at = ?2 WHERE project_id = ?1",
          rusqlite::params![project_str, at_str],
        )?;
        if touched == 0 {
          return Ok(None);
        }

        let position: i64 = tx.query_row(
          "SELECT COALESCE(MAX(position) + 1, 0) FROM chapters WHERE project_id = ?1",
          rusqlite::params![project_str],
          |r| r.get(0),
        )?;
        tx.execute(
          "INSERT INTO chapters (chapter_id, project_id, position, title)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![chapter_str, project_str, position, title],
        )?;
        for (scene_str, scene_pos, summary, target) in scene_rows {
          tx.execute(
            "INSERT INTO scenes (scene_id, chapter_id, position, summary, target_words)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![scene_str, chapter_str, scene_pos, summary, target],
          )?;
        }
        tx.commit()?;
        Ok(Some(position))
      })
      .await?;

    let position = position.ok_or(Error::ProjectNotFound(project_id))?;

    Ok(ChapterView {
      chapter: Chapter {
        chapter_id,
        project_id,
        position,
        title: input.title,
        content: String::new(),
        word_count: 0,
      },
      scenes,
    })
  }

  // ── Background writing ────────────────────────────────────────────────────

  async fn begin_background_write(&self, project_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let id_str     = encode_uuid(project_id);
    let at_str     = encode_dt(at);
    let status_str = WritingStatus::BackgroundWriting.as_ref().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!(
            "UPDATE projects
             SET writing_status = ?2, writing_started_at = ?3,
                 writing_error = NULL, updated_at = ?3
             WHERE project_id = ?1 AND writing_status NOT IN {ACTIVE_STATUSES}"
          ),
          rusqlite::params![id_str, status_str, at_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn set_writing_status(
    &self,
    project_id: Uuid,
    status:     WritingStatus,
    error:      Option<String>,
  ) -> Result<()> {
    let id_str     = encode_uuid(project_id);
    let status_str = status.as_ref().to_owned();
    let at_str     = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE projects SET writing_status = ?2, writing_error = ?3, updated_at = ?4
           WHERE project_id = ?1",
          rusqlite::params![id_str, status_str, error, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ProjectNotFound(project_id));
    }
    Ok(())
  }

  async fn next_scene(&self, project_id: Uuid) -> Result<Option<SceneTask>> {
    let id_str = encode_uuid(project_id);

    type Found = (RawScene, String, Option<String>);

    let raw: Option<(RawProject, Option<Found>)> = self
      .conn
      .call(move |conn| {
        let Some(project) = select_project(conn, &id_str)? else {
          return Ok(None);
        };

        let next = conn
          .query_row(
            &format!(
              "SELECT {SCENE_COLUMNS}, c.title, c.position FROM scenes s
               JOIN chapters c ON c.chapter_id = s.chapter_id
               WHERE c.project_id = ?1 AND s.status IN ('pending', 'writing')
               ORDER BY c.position, s.position
               LIMIT 1"
            ),
            rusqlite::params![id_str],
            |row| {
              Ok((
                RawScene::from_row(row)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
              ))
            },
          )
          .optional()?;

        let Some((scene, chapter_title, chapter_pos)) = next else {
          return Ok(Some((project, None)));
        };

        let previous: Option<String> = conn
          .query_row(
            "SELECT s.content FROM scenes s
             JOIN chapters c ON c.chapter_id = s.chapter_id
             WHERE c.project_id = ?1 AND s.status = 'done'
               AND (c.position < ?2 OR (c.position = ?2 AND s.position < ?3))
             ORDER BY c.position DESC, s.position DESC
             LIMIT 1",
            rusqlite::params![id_str, chapter_pos, scene.position],
            |r| r.get(0),
          )
          .optional()?
          .flatten();

        Ok(Some((project, Some((scene, chapter_title, previous)))))
      })
      .await?;

    let (project, found) = raw.ok_or(Error::ProjectNotFound(project_id))?;
    let Some((scene, chapter_title, previous_text)) = found else {
      return Ok(None);
    };

    Ok(Some(SceneTask {
      project: project.into_project()?,
      chapter_title,
      scene: scene.into_scene()?,
      previous_text,
    }))
  }

  async fn unfinished_scene_count(&self, project_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(project_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM scenes s
           JOIN chapters c ON c.chapter_id = s.chapter_id
           WHERE c.project_id = ?1 AND s.status != 'done'",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count as u64)
  }

  async fn claim_scene(&self, project_id: Uuid, scene_id: Uuid) -> Result<()> {
    let project_str = encode_uuid(project_id);
    let scene_str   = encode_uuid(scene_id);
    let at_str      = encode_dt(Utc::now());

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE scenes SET status = 'writing' WHERE scene_id = ?1",
          rusqlite::params![scene_str],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        tx.execute(
          "UPDATE projects SET writing_status = 'in_progress', updated_at = ?2
           WHERE project_id = ?1",
          rusqlite::params![project_str, at_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::SceneNotFound(scene_id));
    }
    Ok(())
  }

  async fn complete_scene(
    &self,
    scene_id:   Uuid,
    content:    &str,
    word_count: i64,
  ) -> Result<Option<i64>> {
    let scene_str = encode_uuid(scene_id);
    let content   = content.to_owned();
    let at_str    = encode_dt(Utc::now());

    enum Outcome {
      Missing,
      AlreadyDone,
      Written(i64),
    }

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, String, String)> = tx
          .query_row(
            "SELECT s.chapter_id, c.project_id, s.status FROM scenes s
             JOIN chapters c ON c.chapter_id = s.chapter_id
             WHERE s.scene_id = ?1",
            rusqlite::params![scene_str],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;
        let Some((chapter_str, project_str, status)) = row else {
          return Ok(Outcome::Missing);
        };
        if status == SceneStatus::Done.as_ref() {
          return Ok(Outcome::AlreadyDone);
        }

        tx.execute(
          "UPDATE scenes SET status = 'done', content = ?2, word_count = ?3
           WHERE scene_id = ?1",
          rusqlite::params![scene_str, content, word_count],
        )?;
        tx.execute(
          "UPDATE chapters
           SET content = CASE WHEN content = '' THEN ?2
                              ELSE content || char(10) || char(10) || ?2 END,
               word_count = (SELECT COALESCE(SUM(word_count), 0) FROM scenes
                             WHERE chapter_id = ?1 AND status = 'done')
           WHERE chapter_id = ?1",
          rusqlite::params![chapter_str, content],
        )?;
        let total: i64 = tx.query_row(
          "UPDATE projects
           SET word_count = (SELECT COALESCE(SUM(word_count), 0) FROM chapters
                             WHERE project_id = ?1),
               updated_at = ?2
           WHERE project_id = ?1
           RETURNING word_count",
          rusqlite::params![project_str, at_str],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Outcome::Written(total))
      })
      .await?;

    match outcome {
      Outcome::Missing => Err(Error::SceneNotFound(scene_id)),
      Outcome::AlreadyDone => Ok(None),
      Outcome::Written(total) => Ok(Some(total)),
    }
  }

  async fn stalled_projects(&self, before: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let before_str = encode_dt(before);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT project_id FROM projects
           WHERE writing_status IN {ACTIVE_STATUSES} AND updated_at < ?1
           ORDER BY updated_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![before_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }
}
