//! Synchronous read queries backing the `CatalogQuery` implementation.

use rusqlite::{Connection, OptionalExtension as _, Params, Row};
use trove_core::{
  Error as CatalogError,
  entity::{Collection, Tag, Thing},
  error::EntityKind,
  package::{PackageEvent, StoredPackage},
  store::{CatalogStats, ThingFilter},
};

use crate::{
  Result,
  catalog::{count, thing_exists},
  encode::{
    COLLECTION_COLUMNS, EVENT_COLUMNS, PACKAGE_COLUMNS, RawEvent, RawPackage,
    TAG_COLUMNS, THING_COLUMNS, collection_from_row, tag_from_row, thing_from_row,
  },
};

fn collect<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Vec<T>>
where
  P: Params,
  F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(params, f)?.collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── Things ──────────────────────────────────────────────────────────────────

pub fn list_things(conn: &Connection, filter: &ThingFilter) -> Result<Vec<Thing>> {
  let sql = format!(
    "SELECT {THING_COLUMNS}
     FROM thing
     WHERE (?1 IS NULL
            OR thing.category_id = ?1
            OR EXISTS (SELECT 1 FROM thing_tag tt
                       WHERE tt.thing_id = thing.url AND tt.tag_id = ?1))
       AND (?2 IS NULL
            OR EXISTS (SELECT 1 FROM collection_thing ct
                       WHERE ct.thing_id = thing.url AND ct.collection_id = ?2))
     ORDER BY thing.name, thing.url"
  );
  collect(
    conn,
    &sql,
    rusqlite::params![filter.tag_id, filter.collection_id],
    thing_from_row,
  )
}

pub fn get_thing(conn: &Connection, url: &str) -> Result<Thing> {
  let sql = format!("SELECT {THING_COLUMNS} FROM thing WHERE url = ?1");
  conn
    .query_row(&sql, [url], thing_from_row)
    .optional()?
    .ok_or_else(|| CatalogError::not_found(EntityKind::Thing, url).into())
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn get_tag(conn: &Connection, id: &str) -> Result<Tag> {
  let sql = format!("SELECT {TAG_COLUMNS} FROM tag WHERE id = ?1");
  conn
    .query_row(&sql, [id], tag_from_row)
    .optional()?
    .ok_or_else(|| CatalogError::not_found(EntityKind::Tag, id).into())
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>> {
  let sql = format!("SELECT {TAG_COLUMNS} FROM tag ORDER BY tag.id");
  collect(conn, &sql, [], tag_from_row)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Tag>> {
  let sql = format!(
    "SELECT {TAG_COLUMNS} FROM tag
     WHERE EXISTS (SELECT 1 FROM thing WHERE thing.category_id = tag.id)
     ORDER BY tag.id"
  );
  collect(conn, &sql, [], tag_from_row)
}

pub fn list_tags_for_thing(conn: &Connection, url: &str) -> Result<Vec<Tag>> {
  require_thing(conn, url)?;
  let sql = format!(
    "SELECT {TAG_COLUMNS} FROM tag
     JOIN thing_tag ON thing_tag.tag_id = tag.id
     WHERE thing_tag.thing_id = ?1
     ORDER BY tag.id"
  );
  collect(conn, &sql, [url], tag_from_row)
}

// ─── Collections ─────────────────────────────────────────────────────────────

pub fn get_collection(conn: &Connection, id: &str) -> Result<Collection> {
  let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collection WHERE id = ?1");
  conn
    .query_row(&sql, [id], collection_from_row)
    .optional()?
    .ok_or_else(|| CatalogError::not_found(EntityKind::Collection, id).into())
}

pub fn list_collections(conn: &Connection) -> Result<Vec<Collection>> {
  let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collection ORDER BY collection.id");
  collect(conn, &sql, [], collection_from_row)
}

pub fn list_collections_for_thing(conn: &Connection, url: &str) -> Result<Vec<Collection>> {
  require_thing(conn, url)?;
  let sql = format!(
    "SELECT {COLLECTION_COLUMNS} FROM collection
     JOIN collection_thing ON collection_thing.collection_id = collection.id
     WHERE collection_thing.thing_id = ?1
     ORDER BY collection.id"
  );
  collect(conn, &sql, [url], collection_from_row)
}

fn require_thing(conn: &Connection, url: &str) -> Result<()> {
  if thing_exists(conn, url)? {
    Ok(())
  } else {
    Err(CatalogError::not_found(EntityKind::Thing, url).into())
  }
}

// ─── Packages ────────────────────────────────────────────────────────────────

pub fn get_package(conn: &Connection, id: &str) -> Result<StoredPackage> {
  let sql = format!("SELECT {PACKAGE_COLUMNS} FROM package WHERE id = ?1");
  conn
    .query_row(&sql, [id], RawPackage::from_row)
    .optional()?
    .ok_or_else(|| CatalogError::not_found(EntityKind::Package, id))?
    .into_stored()
}

pub fn list_packages(conn: &Connection) -> Result<Vec<StoredPackage>> {
  let sql = format!("SELECT {PACKAGE_COLUMNS} FROM package ORDER BY id");
  collect(conn, &sql, [], RawPackage::from_row)?
    .into_iter()
    .map(RawPackage::into_stored)
    .collect()
}

pub fn package_history(conn: &Connection, id: &str) -> Result<Vec<PackageEvent>> {
  let sql = format!(
    "SELECT {EVENT_COLUMNS} FROM package_event WHERE package_id = ?1 ORDER BY event_id"
  );
  collect(conn, &sql, [id], RawEvent::from_row)?
    .into_iter()
    .map(RawEvent::into_event)
    .collect()
}

// ─── Stats ───────────────────────────────────────────────────────────────────

pub fn stats(conn: &Connection) -> Result<CatalogStats> {
  Ok(CatalogStats {
    tags:        count(conn, "SELECT count(*) FROM tag", [])?,
    things:      count(conn, "SELECT count(*) FROM thing", [])?,
    collections: count(conn, "SELECT count(*) FROM collection", [])?,
    memberships: count(conn, "SELECT count(*) FROM collection_thing", [])?,
    thing_tags:  count(conn, "SELECT count(*) FROM thing_tag", [])?,
    packages:    count(conn, "SELECT count(*) FROM package", [])?,
  })
}
