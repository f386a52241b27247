//! SQL schema for the Folio SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id             TEXT PRIMARY KEY,
    monthly_word_limit  INTEGER NOT NULL,          -- -1 = unlimited
    extra_words_balance INTEGER NOT NULL DEFAULT 0,
    credits_reset_at    TEXT,
    created_at          TEXT NOT NULL,
    CHECK (extra_words_balance >= 0),
    CHECK (monthly_word_limit >= -1)
);

-- One counter per user per calendar month. Only ever incremented.
CREATE TABLE IF NOT EXISTS usage_records (
    user_id         TEXT NOT NULL,
    month           TEXT NOT NULL,                 -- YYYY-MM
    words_generated INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, month)
);

-- Append-only history of extra-balance changes.
CREATE TABLE IF NOT EXISTS credit_grants (
    grant_id    TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES profiles(user_id),
    kind        TEXT NOT NULL,   -- purchase | referral | admin_grant | overflow_draw
    amount      INTEGER NOT NULL,
    note        TEXT,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id         TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL,
    title              TEXT NOT NULL,
    genre              TEXT,
    description        TEXT,
    writing_status     TEXT NOT NULL DEFAULT 'idle',
    writing_started_at TEXT,
    writing_error      TEXT,
    word_count         INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    chapter_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(project_id),
    position   INTEGER NOT NULL,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL DEFAULT '',
    word_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (project_id, position)
);

CREATE TABLE IF NOT EXISTS scenes (
    scene_id     TEXT PRIMARY KEY,
    chapter_id   TEXT NOT NULL REFERENCES chapters(chapter_id),
    position     INTEGER NOT NULL,
    summary      TEXT NOT NULL,
    target_words INTEGER NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',  -- pending | writing | done
    content      TEXT,
    word_count   INTEGER NOT NULL DEFAULT 0,
    UNIQUE (chapter_id, position)
);

CREATE INDEX IF NOT EXISTS credit_grants_user_idx ON credit_grants(user_id);
CREATE INDEX IF NOT EXISTS projects_status_idx    ON projects(writing_status, updated_at);
CREATE INDEX IF NOT EXISTS chapters_project_idx   ON chapters(project_id);
CREATE INDEX IF NOT EXISTS scenes_chapter_idx     ON scenes(chapter_id);

PRAGMA user_version = 1;
";
