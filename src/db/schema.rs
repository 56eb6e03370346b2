//! Canonical relational schema (§6).
//!
//! Gitgres never issues `CREATE TABLE` itself — schema installation is an
//! external collaborator (the install script). This module keeps the
//! canonical DDL as a constant so tests can provision a throwaway database
//! against the same definition the driver assumes, and so the install
//! script has one source of truth to copy from.

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS repositories (
    id          SERIAL PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS objects (
    repo_id     INTEGER NOT NULL REFERENCES repositories(id),
    oid         BYTEA NOT NULL,
    type        SMALLINT NOT NULL CHECK (type BETWEEN 1 AND 4),
    size        INTEGER NOT NULL,
    content     BYTEA NOT NULL,
    PRIMARY KEY (repo_id, oid)
);
CREATE INDEX IF NOT EXISTS objects_oid_idx ON objects (oid);

CREATE TABLE IF NOT EXISTS refs (
    repo_id     INTEGER NOT NULL REFERENCES repositories(id),
    name        TEXT NOT NULL,
    oid         BYTEA,
    symbolic    TEXT,
    PRIMARY KEY (repo_id, name),
    CHECK ((oid IS NULL) <> (symbolic IS NULL))
);

CREATE TABLE IF NOT EXISTS reflog (
    id          BIGSERIAL PRIMARY KEY,
    repo_id     INTEGER NOT NULL REFERENCES repositories(id),
    ref_name    TEXT NOT NULL,
    old_oid     BYTEA,
    new_oid     BYTEA,
    committer   TEXT NOT NULL,
    timestamp_s BIGINT NOT NULL,
    tz_offset   TEXT NOT NULL,
    message     TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS reflog_repo_ref_id_idx ON reflog (repo_id, ref_name, id);
"#;
