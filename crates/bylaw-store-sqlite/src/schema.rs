//! SQL schema for the Bylaw SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Never deleted; retired through `status` instead.
CREATE TABLE IF NOT EXISTS legislations (
    legislation_id     TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    jurisdiction       TEXT NOT NULL,
    legislation_type   TEXT NOT NULL,
    effective_from     TEXT NOT NULL,   -- YYYY-MM-DD
    effective_to       TEXT,
    status             TEXT NOT NULL DEFAULT 'draft',
    revision           INTEGER NOT NULL DEFAULT 0,
    current_version_id TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS branches (
    branch_id             TEXT PRIMARY KEY,
    legislation_id        TEXT NOT NULL REFERENCES legislations(legislation_id) ON DELETE CASCADE,
    name                  TEXT NOT NULL,
    description           TEXT,
    is_main               INTEGER NOT NULL DEFAULT 0,
    parent_branch_id      TEXT,            -- weak reference, may dangle
    base_version_id       TEXT,
    created_at            TEXT NOT NULL,
    state                 TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'merged'
    merged_at             TEXT,
    merged_by             TEXT,
    merged_into_branch_id TEXT,            -- weak reference, may dangle
    version_label         TEXT,
    is_applied            INTEGER NOT NULL DEFAULT 0,
    extra                 TEXT NOT NULL DEFAULT '{}',
    idempotency_key       TEXT,
    CHECK (state IN ('active', 'merged')),
    CHECK (state = 'active'
           OR (merged_at IS NOT NULL AND merged_by IS NOT NULL AND merged_into_branch_id IS NOT NULL)),
    CHECK (merged_into_branch_id IS NULL OR merged_into_branch_id != branch_id),
    CHECK (is_main = 0 OR (state = 'active' AND is_applied = 1))
);

CREATE UNIQUE INDEX IF NOT EXISTS branches_one_main_idx
    ON branches(legislation_id) WHERE is_main = 1;
CREATE UNIQUE INDEX IF NOT EXISTS branches_name_idx
    ON branches(legislation_id, name COLLATE NOCASE);
CREATE UNIQUE INDEX IF NOT EXISTS branches_idempotency_idx
    ON branches(legislation_id, idempotency_key) WHERE idempotency_key IS NOT NULL;

CREATE TABLE IF NOT EXISTS parameters (
    parameter_id TEXT PRIMARY KEY,
    branch_id    TEXT NOT NULL REFERENCES branches(branch_id) ON DELETE CASCADE,
    schedule_id  TEXT,
    rule_type    TEXT NOT NULL,
    operator     TEXT NOT NULL,
    land_use     TEXT,
    value        TEXT NOT NULL,
    unit         TEXT,
    note         TEXT,
    created_at   TEXT NOT NULL
);

-- Versions are append-only. Whether a version is current is read from
-- legislations.current_version_id; approval is read from version_reviews.
CREATE TABLE IF NOT EXISTS versions (
    version_id        TEXT PRIMARY KEY,
    legislation_id    TEXT NOT NULL REFERENCES legislations(legislation_id) ON DELETE CASCADE,
    label             TEXT NOT NULL,
    date              TEXT NOT NULL,
    author            TEXT NOT NULL,
    stage             TEXT NOT NULL,   -- 'draft' | 'published'
    original_value    TEXT NOT NULL DEFAULT '{}',
    amendment_value   TEXT NOT NULL DEFAULT '{}',
    approval_status   TEXT NOT NULL DEFAULT 'pending',
    consolidated_from TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS version_reviews (
    review_id   TEXT PRIMARY KEY,
    version_id  TEXT NOT NULL REFERENCES versions(version_id) ON DELETE CASCADE,
    decision    TEXT NOT NULL,
    reviewer    TEXT NOT NULL,
    note        TEXT,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schedules (
    schedule_id         TEXT PRIMARY KEY,
    legislation_id      TEXT NOT NULL REFERENCES legislations(legislation_id) ON DELETE CASCADE,
    name                TEXT NOT NULL,
    schedule_type       TEXT NOT NULL,
    description         TEXT,
    linked_schedule_id  TEXT,
    selected_layers     TEXT NOT NULL DEFAULT '[]',
    selected_boundaries TEXT NOT NULL DEFAULT '[]',
    polygons            TEXT NOT NULL DEFAULT '[]',
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS branches_legislation_idx ON branches(legislation_id);
CREATE INDEX IF NOT EXISTS parameters_branch_idx    ON parameters(branch_id);
CREATE INDEX IF NOT EXISTS versions_legislation_idx ON versions(legislation_id, date);
CREATE INDEX IF NOT EXISTS reviews_version_idx      ON version_reviews(version_id);
CREATE INDEX IF NOT EXISTS schedules_legislation_idx ON schedules(legislation_id);

PRAGMA user_version = 1;
";
