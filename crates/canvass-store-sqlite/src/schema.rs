//! SQL schema for the Canvass SQLite store.
//!
//! Executed once at connection startup. The partial unique indexes on
//! `incidents` and `confirmations` are the serialization primitive for
//! the "one open incident / one active confirmation per person"
//! invariants: a concurrent second insert loses at commit time.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS actors (
    actor_id       TEXT PRIMARY KEY,
    display_name   TEXT NOT NULL,
    role           TEXT NOT NULL,   -- 'admin' | 'coordinator' | 'leader' | 'validator' | 'confirmer' | 'auditor'
    coordinator_id TEXT REFERENCES actors(actor_id),
    created_at     TEXT NOT NULL
);

-- Validator/confirmer → leader grants, populated out-of-band.
CREATE TABLE IF NOT EXISTS leader_assignments (
    actor_id  TEXT NOT NULL REFERENCES actors(actor_id),
    leader_id TEXT NOT NULL REFERENCES actors(actor_id),
    UNIQUE (actor_id, leader_id)
);

CREATE TABLE IF NOT EXISTS persons (
    person_id       TEXT PRIMARY KEY,
    full_name       TEXT NOT NULL,
    document_kind   TEXT NOT NULL,
    document_number TEXT NOT NULL UNIQUE,
    state           TEXT NOT NULL,
    prior_state     TEXT,            -- non-null only under an open incident
                                     -- or as post-reversal bookkeeping
    registered_by   TEXT NOT NULL REFERENCES actors(actor_id),
    location_id     TEXT,
    station_id      TEXT,
    table_number    INTEGER,
    imported        INTEGER NOT NULL DEFAULT 0,
    import_batch_id TEXT,
    verified_by     TEXT,
    verified_at     TEXT,
    confirmed_by    TEXT,
    confirmed_at    TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS incidents (
    incident_id TEXT PRIMARY KEY,
    person_id   TEXT NOT NULL REFERENCES persons(person_id),
    observation TEXT NOT NULL,
    resolved    INTEGER NOT NULL DEFAULT 0,
    raised_by   TEXT NOT NULL,
    raised_at   TEXT NOT NULL,
    resolved_by TEXT,
    resolved_at TEXT
);

-- At most one unresolved incident per person.
CREATE UNIQUE INDEX IF NOT EXISTS incidents_open_idx
    ON incidents(person_id) WHERE resolved = 0;

CREATE TABLE IF NOT EXISTS confirmations (
    confirmation_id TEXT PRIMARY KEY,
    person_id       TEXT NOT NULL REFERENCES persons(person_id),
    evidence_url    TEXT NOT NULL,
    evidence_path   TEXT NOT NULL,
    evidence_hash   TEXT NOT NULL,
    confirmed_by    TEXT NOT NULL,
    confirmed_at    TEXT NOT NULL,
    reversed        INTEGER NOT NULL DEFAULT 0,
    reversed_by     TEXT,
    reversed_at     TEXT
);

-- At most one active (non-reversed) confirmation per person.
CREATE UNIQUE INDEX IF NOT EXISTS confirmations_active_idx
    ON confirmations(person_id) WHERE reversed = 0;

CREATE TABLE IF NOT EXISTS import_batches (
    batch_id   TEXT PRIMARY KEY,
    file_name  TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    total      INTEGER NOT NULL,
    inserted   INTEGER NOT NULL,
    updated    INTEGER NOT NULL,
    failed     INTEGER NOT NULL,
    omitted    TEXT NOT NULL DEFAULT '[]',   -- JSON array of omitted rows
    errors     TEXT NOT NULL DEFAULT '[]'    -- JSON array of row errors
);

-- Read-only code tables, seeded administratively.
CREATE TABLE IF NOT EXISTS locations (
    code        TEXT PRIMARY KEY,
    location_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stations (
    code       TEXT PRIMARY KEY,
    station_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS persons_leader_idx       ON persons(registered_by);
CREATE INDEX IF NOT EXISTS persons_state_idx        ON persons(state);
CREATE INDEX IF NOT EXISTS incidents_person_idx     ON incidents(person_id);
CREATE INDEX IF NOT EXISTS confirmations_person_idx ON confirmations(person_id);

PRAGMA user_version = 1;
";
