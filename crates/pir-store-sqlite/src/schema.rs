//! SQL schema for the PIR SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per document. The id is the key, never part of data_json.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    doc_id      TEXT NOT NULL,
    data_json   TEXT NOT NULL,   -- storage-form JSON object
    written_at  TEXT NOT NULL,   -- ISO 8601 UTC; last write
    PRIMARY KEY (collection, doc_id)
);

CREATE TABLE IF NOT EXISTS accounts (
    uid           TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    display_name  TEXT,
    claims_json   TEXT,            -- JSON-encoded Claims or NULL
    created_at    TEXT NOT NULL
);

PRAGMA user_version = 1;
";
