//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and package bodies as canonical
//! JSON. Entity rows map column-for-column; the `*_COLUMNS` constants fix the
//! order the row mappers expect.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use trove_core::{
  entity::{Collection, Tag, Thing},
  identity::{ContentHash, canonical_json},
  package::{Package, PackageEvent, PackageEventKind, StoredPackage},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── PackageEventKind ────────────────────────────────────────────────────────

pub fn encode_event_kind(k: PackageEventKind) -> &'static str {
  match k {
    PackageEventKind::Created => "created",
    PackageEventKind::Updated => "updated",
    PackageEventKind::Retired => "retired",
  }
}

pub fn decode_event_kind(s: &str) -> Result<PackageEventKind> {
  match s {
    "created" => Ok(PackageEventKind::Created),
    "updated" => Ok(PackageEventKind::Updated),
    "retired" => Ok(PackageEventKind::Retired),
    other => Err(Error::Decode(format!("unknown event kind: {other:?}"))),
  }
}

// ─── Package body ────────────────────────────────────────────────────────────

pub fn encode_body(package: &Package) -> String { canonical_json(package.body()) }

// ─── Entity rows ─────────────────────────────────────────────────────────────

pub const TAG_COLUMNS: &str = "tag.id, tag.name, tag.summary, tag.icon";

pub fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
  Ok(Tag {
    id:      row.get(0)?,
    name:    row.get(1)?,
    summary: row.get(2)?,
    icon:    row.get(3)?,
  })
}

pub const THING_COLUMNS: &str =
  "thing.url, thing.name, thing.summary, thing.category_id";

pub fn thing_from_row(row: &Row<'_>) -> rusqlite::Result<Thing> {
  Ok(Thing {
    url:         row.get(0)?,
    name:        row.get(1)?,
    summary:     row.get(2)?,
    category_id: row.get(3)?,
  })
}

pub const COLLECTION_COLUMNS: &str =
  "collection.id, collection.url, collection.summary";

pub fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
  Ok(Collection {
    id:      row.get(0)?,
    url:     row.get(1)?,
    summary: row.get(2)?,
  })
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub const PACKAGE_COLUMNS: &str = "id, hash, body, ingested_at, updated_at";

/// Raw strings read directly from a `package` row.
pub struct RawPackage {
  pub id:          String,
  pub hash:        String,
  pub body:        String,
  pub ingested_at: String,
  pub updated_at:  String,
}

impl RawPackage {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      hash:        row.get(1)?,
      body:        row.get(2)?,
      ingested_at: row.get(3)?,
      updated_at:  row.get(4)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredPackage> {
    let body = serde_json::from_str(&self.body)?;
    Ok(StoredPackage {
      package:     Package::restore(self.id, ContentHash::from_hex(self.hash), body),
      ingested_at: decode_dt(&self.ingested_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub const EVENT_COLUMNS: &str = "package_id, hash, kind, recorded_at";

/// Raw strings read directly from a `package_event` row.
pub struct RawEvent {
  pub package_id:  String,
  pub hash:        String,
  pub kind:        String,
  pub recorded_at: String,
}

impl RawEvent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      package_id:  row.get(0)?,
      hash:        row.get(1)?,
      kind:        row.get(2)?,
      recorded_at: row.get(3)?,
    })
  }

  pub fn into_event(self) -> Result<PackageEvent> {
    Ok(PackageEvent {
      package_id:  self.package_id,
      hash:        ContentHash::from_hex(self.hash),
      kind:        decode_event_kind(&self.kind)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
