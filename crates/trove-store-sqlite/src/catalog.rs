//! Synchronous catalog writes against an open connection or transaction.
//!
//! These run on the `tokio_rusqlite` thread, inside the closure passed to
//! `Connection::call`. Every function checks referential integrity itself
//! before touching a row so that violations surface as catalog errors naming
//! the offending key; the schema's foreign keys are a second line.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, Params, params};
use trove_core::{
  Error as CatalogError,
  entity::{Collection, MISCELLANEOUS, Tag, Thing},
  error::EntityKind,
  package::{Package, PackageEventKind},
  store::{InsertMode, OnConflict},
};

use crate::{
  Result,
  encode::{encode_body, encode_dt, encode_event_kind},
  schema::BOOTSTRAP,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub fn exists(conn: &Connection, sql: &str, params: impl Params) -> Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

pub fn count(conn: &Connection, sql: &str, params: impl Params) -> Result<usize> {
  Ok(conn.query_row(sql, params, |r| r.get::<_, usize>(0))?)
}

pub fn tag_exists(conn: &Connection, id: &str) -> Result<bool> {
  exists(conn, "SELECT 1 FROM tag WHERE id = ?1", [id])
}

pub fn thing_exists(conn: &Connection, url: &str) -> Result<bool> {
  exists(conn, "SELECT 1 FROM thing WHERE url = ?1", [url])
}

pub fn collection_exists(conn: &Connection, id: &str) -> Result<bool> {
  exists(conn, "SELECT 1 FROM collection WHERE id = ?1", [id])
}

/// Whether any package claims the thing.
pub fn thing_claimed(conn: &Connection, url: &str) -> Result<bool> {
  exists(conn, "SELECT 1 FROM package_thing WHERE thing_id = ?1", [url])
}

/// Whether any package claims the membership.
pub fn membership_claimed(
  conn: &Connection,
  collection_id: &str,
  thing_url: &str,
) -> Result<bool> {
  exists(
    conn,
    "SELECT 1 FROM package_collection_thing WHERE collection_id = ?1 AND thing_id = ?2",
    [collection_id, thing_url],
  )
}

/// Whether any package claims the thing tag.
pub fn thing_tag_claimed(conn: &Connection, thing_url: &str, tag_id: &str) -> Result<bool> {
  exists(
    conn,
    "SELECT 1 FROM package_thing_tag WHERE thing_id = ?1 AND tag_id = ?2",
    [thing_url, tag_id],
  )
}

fn pair_key(left: &str, right: &str) -> String { format!("({left}, {right})") }

// ─── Bootstrap ───────────────────────────────────────────────────────────────

/// Seed the fallback tag. Safe to run on every open.
pub fn bootstrap(conn: &Connection) -> Result<()> {
  let misc = Tag::miscellaneous();
  let seeded = conn.execute(BOOTSTRAP, params![misc.id, misc.name, misc.summary])?;
  if seeded > 0 {
    tracing::debug!("seeded fallback tag {MISCELLANEOUS:?}");
  }
  Ok(())
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Returns whether a row was written. With `OnConflict::Ignore` an existing
/// tag keeps its metadata; `Replace` overwrites name, summary and icon.
pub fn upsert_tag(conn: &Connection, tag: &Tag, on_conflict: OnConflict) -> Result<bool> {
  let sql = match on_conflict {
    OnConflict::Ignore => {
      "INSERT INTO tag (id, name, summary, icon) VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (id) DO NOTHING"
    }
    OnConflict::Replace => {
      "INSERT INTO tag (id, name, summary, icon) VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (id) DO UPDATE SET
         name    = excluded.name,
         summary = excluded.summary,
         icon    = excluded.icon"
    }
  };
  let written = conn.execute(sql, params![tag.id, tag.name, tag.summary, tag.icon])?;
  Ok(written > 0)
}

pub fn upsert_thing(
  conn: &Connection,
  thing: &Thing,
  on_conflict: OnConflict,
) -> Result<()> {
  if !tag_exists(conn, &thing.category_id)? {
    return Err(
      CatalogError::missing_reference(
        EntityKind::Tag,
        &thing.category_id,
        format_args!("thing {:?}", thing.url),
      )
      .into(),
    );
  }

  let sql = match on_conflict {
    OnConflict::Ignore => {
      "INSERT INTO thing (url, name, summary, category_id)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (url) DO NOTHING"
    }
    OnConflict::Replace => {
      "INSERT INTO thing (url, name, summary, category_id)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (url) DO UPDATE SET
         name        = excluded.name,
         summary     = excluded.summary,
         category_id = excluded.category_id"
    }
  };
  conn.execute(
    sql,
    params![thing.url, thing.name, thing.summary, thing.category_id],
  )?;
  Ok(())
}

pub fn upsert_collection(
  conn: &Connection,
  collection: &Collection,
  on_conflict: OnConflict,
) -> Result<()> {
  let sql = match on_conflict {
    OnConflict::Ignore => {
      "INSERT INTO collection (id, url, summary) VALUES (?1, ?2, ?3)
       ON CONFLICT (id) DO NOTHING"
    }
    OnConflict::Replace => {
      "INSERT INTO collection (id, url, summary) VALUES (?1, ?2, ?3)
       ON CONFLICT (id) DO UPDATE SET
         url     = excluded.url,
         summary = excluded.summary"
    }
  };
  conn.execute(sql, params![collection.id, collection.url, collection.summary])?;
  Ok(())
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// Returns whether a new membership row was written.
pub fn add_membership(
  conn: &Connection,
  collection_id: &str,
  thing_url: &str,
  mode: InsertMode,
) -> Result<bool> {
  let key = pair_key(collection_id, thing_url);
  if !collection_exists(conn, collection_id)? {
    return Err(
      CatalogError::missing_reference(
        EntityKind::Collection,
        collection_id,
        format_args!("membership {key}"),
      )
      .into(),
    );
  }
  if !thing_exists(conn, thing_url)? {
    return Err(
      CatalogError::missing_reference(
        EntityKind::Thing,
        thing_url,
        format_args!("membership {key}"),
      )
      .into(),
    );
  }

  let inserted = conn.execute(
    "INSERT OR IGNORE INTO collection_thing (collection_id, thing_id) VALUES (?1, ?2)",
    [collection_id, thing_url],
  )?;
  if inserted == 0 && mode == InsertMode::Strict {
    return Err(
      CatalogError::DuplicateMembership {
        entity: EntityKind::Membership,
        left:   collection_id.to_owned(),
        right:  thing_url.to_owned(),
      }
      .into(),
    );
  }
  Ok(inserted > 0)
}

/// Returns whether a new thing-tag row was written.
pub fn add_thing_tag(
  conn: &Connection,
  thing_url: &str,
  tag_id: &str,
  mode: InsertMode,
) -> Result<bool> {
  let key = pair_key(thing_url, tag_id);
  if !thing_exists(conn, thing_url)? {
    return Err(
      CatalogError::missing_reference(
        EntityKind::Thing,
        thing_url,
        format_args!("thing tag {key}"),
      )
      .into(),
    );
  }
  if !tag_exists(conn, tag_id)? {
    return Err(
      CatalogError::missing_reference(
        EntityKind::Tag,
        tag_id,
        format_args!("thing tag {key}"),
      )
      .into(),
    );
  }

  let inserted = conn.execute(
    "INSERT OR IGNORE INTO thing_tag (thing_id, tag_id) VALUES (?1, ?2)",
    [thing_url, tag_id],
  )?;
  if inserted == 0 && mode == InsertMode::Strict {
    return Err(
      CatalogError::DuplicateMembership {
        entity: EntityKind::ThingTag,
        left:   thing_url.to_owned(),
        right:  tag_id.to_owned(),
      }
      .into(),
    );
  }
  Ok(inserted > 0)
}

pub fn remove_membership(
  conn: &Connection,
  collection_id: &str,
  thing_url: &str,
) -> Result<()> {
  let key = pair_key(collection_id, thing_url);
  let claims = count(
    conn,
    "SELECT count(*) FROM package_collection_thing
     WHERE collection_id = ?1 AND thing_id = ?2",
    [collection_id, thing_url],
  )?;
  if claims > 0 {
    return Err(
      CatalogError::still_referenced(
        EntityKind::Membership,
        key,
        format_args!("{claims} package(s)"),
      )
      .into(),
    );
  }

  let removed = conn.execute(
    "DELETE FROM collection_thing WHERE collection_id = ?1 AND thing_id = ?2",
    [collection_id, thing_url],
  )?;
  if removed == 0 {
    return Err(CatalogError::not_found(EntityKind::Membership, key).into());
  }
  Ok(())
}

pub fn remove_thing_tag(conn: &Connection, thing_url: &str, tag_id: &str) -> Result<()> {
  let key = pair_key(thing_url, tag_id);
  let claims = count(
    conn,
    "SELECT count(*) FROM package_thing_tag WHERE thing_id = ?1 AND tag_id = ?2",
    [thing_url, tag_id],
  )?;
  if claims > 0 {
    return Err(
      CatalogError::still_referenced(
        EntityKind::ThingTag,
        key,
        format_args!("{claims} package(s)"),
      )
      .into(),
    );
  }

  let removed = conn.execute(
    "DELETE FROM thing_tag WHERE thing_id = ?1 AND tag_id = ?2",
    [thing_url, tag_id],
  )?;
  if removed == 0 {
    return Err(CatalogError::not_found(EntityKind::ThingTag, key).into());
  }
  Ok(())
}

// ─── Referential deletes ─────────────────────────────────────────────────────

pub fn delete_tag(conn: &Connection, id: &str) -> Result<()> {
  if id == MISCELLANEOUS {
    return Err(CatalogError::ReservedTag(id.to_owned()).into());
  }
  if !tag_exists(conn, id)? {
    return Err(CatalogError::not_found(EntityKind::Tag, id).into());
  }

  let things = count(conn, "SELECT count(*) FROM thing WHERE category_id = ?1", [id])?;
  let links = count(conn, "SELECT count(*) FROM thing_tag WHERE tag_id = ?1", [id])?;
  if things + links > 0 {
    return Err(
      CatalogError::still_referenced(
        EntityKind::Tag,
        id,
        format_args!("{things} thing(s) and {links} thing tag(s)"),
      )
      .into(),
    );
  }

  conn.execute("DELETE FROM tag WHERE id = ?1", [id])?;
  Ok(())
}

pub fn delete_thing(conn: &Connection, url: &str) -> Result<()> {
  if !thing_exists(conn, url)? {
    return Err(CatalogError::not_found(EntityKind::Thing, url).into());
  }

  let memberships =
    count(conn, "SELECT count(*) FROM collection_thing WHERE thing_id = ?1", [url])?;
  let links = count(conn, "SELECT count(*) FROM thing_tag WHERE thing_id = ?1", [url])?;
  let packages =
    count(conn, "SELECT count(*) FROM package_thing WHERE thing_id = ?1", [url])?;
  if memberships + links + packages > 0 {
    return Err(
      CatalogError::still_referenced(
        EntityKind::Thing,
        url,
        format_args!(
          "{memberships} membership(s), {links} thing tag(s) and {packages} package(s)"
        ),
      )
      .into(),
    );
  }

  conn.execute("DELETE FROM thing WHERE url = ?1", [url])?;
  Ok(())
}

pub fn delete_collection(conn: &Connection, id: &str) -> Result<()> {
  if !collection_exists(conn, id)? {
    return Err(CatalogError::not_found(EntityKind::Collection, id).into());
  }

  let members = count(
    conn,
    "SELECT count(*) FROM collection_thing WHERE collection_id = ?1",
    [id],
  )?;
  if members > 0 {
    return Err(
      CatalogError::still_referenced(
        EntityKind::Collection,
        id,
        format_args!("{members} membership(s)"),
      )
      .into(),
    );
  }

  conn.execute("DELETE FROM collection WHERE id = ?1", [id])?;
  Ok(())
}

// ─── Packages ────────────────────────────────────────────────────────────────

/// The stored hash for a package id, if any.
pub fn package_hash(conn: &Connection, id: &str) -> Result<Option<String>> {
  Ok(
    conn
      .query_row("SELECT hash FROM package WHERE id = ?1", [id], |r| r.get(0))
      .optional()?,
  )
}

/// Insert a package row. Returns `false` when the identical package is
/// already stored.
pub fn insert_package(
  conn: &Connection,
  package: &Package,
  now: DateTime<Utc>,
) -> Result<bool> {
  match package_hash(conn, package.id())? {
    Some(existing) if existing == package.hash().as_str() => Ok(false),
    Some(existing) => Err(
      CatalogError::UniqueConstraintViolation {
        id: package.id().to_owned(),
        existing,
        incoming: package.hash().to_string(),
      }
      .into(),
    ),
    None => {
      let at = encode_dt(now);
      conn.execute(
        "INSERT INTO package (id, hash, body, ingested_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![package.id(), package.hash().as_str(), encode_body(package), at],
      )?;
      record_event(conn, package.id(), package.hash().as_str(), PackageEventKind::Created, now)?;
      Ok(true)
    }
  }
}

/// Swap the body of an already stored package.
pub fn replace_package(
  conn: &Connection,
  package: &Package,
  now: DateTime<Utc>,
) -> Result<()> {
  let updated = conn.execute(
    "UPDATE package SET hash = ?2, body = ?3, updated_at = ?4 WHERE id = ?1",
    params![
      package.id(),
      package.hash().as_str(),
      encode_body(package),
      encode_dt(now)
    ],
  )?;
  if updated == 0 {
    return Err(CatalogError::not_found(EntityKind::Package, package.id()).into());
  }
  record_event(conn, package.id(), package.hash().as_str(), PackageEventKind::Updated, now)
}

pub fn record_event(
  conn: &Connection,
  package_id: &str,
  hash: &str,
  kind: PackageEventKind,
  now: DateTime<Utc>,
) -> Result<()> {
  conn.execute(
    "INSERT INTO package_event (package_id, hash, kind, recorded_at)
     VALUES (?1, ?2, ?3, ?4)",
    params![package_id, hash, encode_event_kind(kind), encode_dt(now)],
  )?;
  Ok(())
}
