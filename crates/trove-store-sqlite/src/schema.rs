//! Tables, indexes and seed rows of a catalog database.
//!
//! [`SqliteStore`](crate::SqliteStore) runs [`SCHEMA`] and then [`BOOTSTRAP`]
//! every time it opens a file. The schema revision is recorded in
//! `user_version`.

/// Entity, link, provenance and journal tables. Re-running it is harmless.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tag (
    id       TEXT PRIMARY KEY,
    name     TEXT,
    summary  TEXT,
    icon     BLOB
);

CREATE TABLE IF NOT EXISTS thing (
    url          TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    summary      TEXT,
    category_id  TEXT NOT NULL REFERENCES tag(id)
);

CREATE TABLE IF NOT EXISTS collection (
    id       TEXT PRIMARY KEY,
    url      TEXT,
    summary  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS collection_thing (
    collection_id  TEXT NOT NULL REFERENCES collection(id),
    thing_id       TEXT NOT NULL REFERENCES thing(url),
    PRIMARY KEY (collection_id, thing_id)
);

CREATE TABLE IF NOT EXISTS thing_tag (
    thing_id  TEXT NOT NULL REFERENCES thing(url),
    tag_id    TEXT NOT NULL REFERENCES tag(id),
    PRIMARY KEY (thing_id, tag_id)
);

-- id and hash are derived from body before insertion, never set by hand.
CREATE TABLE IF NOT EXISTS package (
    id           TEXT PRIMARY KEY,
    hash         TEXT NOT NULL,
    body         TEXT NOT NULL,   -- canonical JSON
    ingested_at  TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at   TEXT NOT NULL
);

-- Provenance: which package derived which rows. A derived row is removed
-- when the last package claiming it lets go of it.
CREATE TABLE IF NOT EXISTS package_thing (
    package_id  TEXT NOT NULL REFERENCES package(id),
    thing_id    TEXT NOT NULL REFERENCES thing(url),
    PRIMARY KEY (package_id, thing_id)
);

CREATE TABLE IF NOT EXISTS package_thing_tag (
    package_id  TEXT NOT NULL REFERENCES package(id),
    thing_id    TEXT NOT NULL,
    tag_id      TEXT NOT NULL,
    PRIMARY KEY (package_id, thing_id, tag_id),
    FOREIGN KEY (thing_id, tag_id) REFERENCES thing_tag(thing_id, tag_id)
);

CREATE TABLE IF NOT EXISTS package_collection_thing (
    package_id     TEXT NOT NULL REFERENCES package(id),
    collection_id  TEXT NOT NULL,
    thing_id       TEXT NOT NULL,
    PRIMARY KEY (package_id, collection_id, thing_id),
    FOREIGN KEY (collection_id, thing_id)
        REFERENCES collection_thing(collection_id, thing_id)
);

-- Append-only journal; outlives retired packages, hence no foreign key.
CREATE TABLE IF NOT EXISTS package_event (
    event_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    package_id   TEXT NOT NULL,
    hash         TEXT NOT NULL,
    kind         TEXT NOT NULL,   -- 'created' | 'updated' | 'retired'
    recorded_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS thing_category_idx       ON thing(category_id);
CREATE INDEX IF NOT EXISTS thing_tag_tag_idx        ON thing_tag(tag_id);
CREATE INDEX IF NOT EXISTS collection_thing_thing_idx ON collection_thing(thing_id);
CREATE INDEX IF NOT EXISTS package_thing_thing_idx  ON package_thing(thing_id);
CREATE INDEX IF NOT EXISTS package_event_package_idx ON package_event(package_id);

PRAGMA user_version = 1;
";

/// Seed rows every store starts with. Run after [`SCHEMA`] on every open;
/// `INSERT OR IGNORE` makes it a no-op once seeded.
pub const BOOTSTRAP: &str =
  "INSERT OR IGNORE INTO tag (id, name, summary) VALUES (?1, ?2, ?3)";
