//! The ingestion pipeline: package in, derived catalog rows out.
//!
//! One call handles one descriptor inside one `IMMEDIATE` transaction. If any
//! step fails the transaction is dropped un-committed, so none of the
//! descriptor's tags, things or links become visible.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use trove_core::{
  Error as CatalogError,
  descriptor::Descriptor,
  entity::Tag,
  error::EntityKind,
  identity::IdField,
  ingest::{IngestOutcome, IngestStatus},
  package::{Package, PackageEventKind},
  store::{InsertMode, OnConflict},
};

use crate::{Result, catalog};

/// Ingestion policy, taken from [`CatalogConfig`](crate::CatalogConfig).
#[derive(Debug, Clone)]
pub struct Policy {
  pub id_field:      IdField,
  /// Whether a known id with a new hash replaces the stored package.
  pub allow_updates: bool,
}

pub fn ingest(conn: &mut Connection, body: Value, policy: &Policy) -> Result<IngestOutcome> {
  let package = Package::from_body(body, &policy.id_field)?;
  ingest_package(conn, &package, policy).map_err(|e| e.in_package(package.id()))
}

fn ingest_package(
  conn: &mut Connection,
  package: &Package,
  policy: &Policy,
) -> Result<IngestOutcome> {
  let descriptor = package.descriptor()?;
  let outcome = |status| IngestOutcome {
    package_id: package.id().to_owned(),
    hash: package.hash().clone(),
    status,
    things: descriptor.things.len(),
  };

  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let now = Utc::now();

  let (status, released) = match catalog::package_hash(&tx, package.id())? {
    Some(existing) if existing == package.hash().as_str() => {
      return Ok(outcome(IngestStatus::Unchanged));
    }
    Some(existing) if !policy.allow_updates => {
      return Err(
        CatalogError::UniqueConstraintViolation {
          id: package.id().to_owned(),
          existing,
          incoming: package.hash().to_string(),
        }
        .into(),
      );
    }
    Some(_) => {
      catalog::replace_package(&tx, package, now)?;
      (IngestStatus::Updated, release_derived(&tx, package.id())?)
    }
    None => {
      catalog::insert_package(&tx, package, now)?;
      (IngestStatus::Created, Claims::default())
    }
  };

  derive(&tx, package.id(), &descriptor, &released)?;
  tx.commit()?;
  Ok(outcome(status))
}

/// The rows a package claimed before its claims were released.
#[derive(Debug, Default)]
struct Claims {
  things:      HashSet<String>,
  thing_tags:  HashSet<(String, String)>,
  memberships: HashSet<(String, String)>,
}

/// Materialise the rows a descriptor declares and claim those the package
/// owns: rows it creates now, rows it claimed before an update, and rows
/// another package already claims. A row that existed unclaimed was made by
/// hand and stays unclaimed, so releasing the package never removes it.
fn derive(
  conn: &Connection,
  package_id: &str,
  descriptor: &Descriptor,
  previous: &Claims,
) -> Result<()> {
  for tag in &descriptor.tags {
    catalog::upsert_tag(conn, tag, OnConflict::Ignore)?;
  }

  for declared in &descriptor.things {
    let thing = &declared.thing;
    let url = thing.url.as_str();

    catalog::upsert_tag(conn, &Tag::new(&thing.category_id), OnConflict::Ignore)?;
    let owned = !catalog::thing_exists(conn, url)?
      || previous.things.contains(url)
      || catalog::thing_claimed(conn, url)?;
    catalog::upsert_thing(conn, thing, OnConflict::Replace)?;
    if owned {
      conn.execute(
        "INSERT OR IGNORE INTO package_thing (package_id, thing_id) VALUES (?1, ?2)",
        [package_id, url],
      )?;
    }

    for tag_id in &declared.tags {
      catalog::upsert_tag(conn, &Tag::new(tag_id), OnConflict::Ignore)?;
      let inserted = catalog::add_thing_tag(conn, url, tag_id, InsertMode::Idempotent)?;
      let owned = inserted
        || previous.thing_tags.contains(&(url.to_owned(), tag_id.clone()))
        || catalog::thing_tag_claimed(conn, url, tag_id)?;
      if owned {
        conn.execute(
          "INSERT OR IGNORE INTO package_thing_tag (package_id, thing_id, tag_id)
           VALUES (?1, ?2, ?3)",
          [package_id, url, tag_id.as_str()],
        )?;
      }
    }

    for collection_id in &declared.collections {
      let inserted =
        catalog::add_membership(conn, collection_id, url, InsertMode::Idempotent)?;
      let owned = inserted
        || previous.memberships.contains(&(collection_id.clone(), url.to_owned()))
        || catalog::membership_claimed(conn, collection_id, url)?;
      if owned {
        conn.execute(
          "INSERT OR IGNORE INTO package_collection_thing
             (package_id, collection_id, thing_id)
           VALUES (?1, ?2, ?3)",
          [package_id, collection_id.as_str(), url],
        )?;
      }
    }
  }
  Ok(())
}

/// Drop the package's claims and every derived row nobody else claims.
/// Returns the claims that were dropped.
///
/// Tags are never removed: they may be referenced elsewhere and carry
/// metadata the package did not necessarily provide.
fn release_derived(conn: &Connection, package_id: &str) -> Result<Claims> {
  let memberships = claimed_pairs(
    conn,
    "SELECT collection_id, thing_id FROM package_collection_thing WHERE package_id = ?1",
    package_id,
  )?;
  conn.execute(
    "DELETE FROM package_collection_thing WHERE package_id = ?1",
    [package_id],
  )?;
  for (collection_id, thing_id) in &memberships {
    conn.execute(
      "DELETE FROM collection_thing
       WHERE collection_id = ?1 AND thing_id = ?2
         AND NOT EXISTS (
           SELECT 1 FROM package_collection_thing
           WHERE collection_id = ?1 AND thing_id = ?2
         )",
      [collection_id, thing_id],
    )?;
  }

  let thing_tags = claimed_pairs(
    conn,
    "SELECT thing_id, tag_id FROM package_thing_tag WHERE package_id = ?1",
    package_id,
  )?;
  conn.execute("DELETE FROM package_thing_tag WHERE package_id = ?1", [package_id])?;
  for (thing_id, tag_id) in &thing_tags {
    conn.execute(
      "DELETE FROM thing_tag
       WHERE thing_id = ?1 AND tag_id = ?2
         AND NOT EXISTS (
           SELECT 1 FROM package_thing_tag WHERE thing_id = ?1 AND tag_id = ?2
         )",
      [thing_id, tag_id],
    )?;
  }

  let things: HashSet<String> = {
    let mut stmt =
      conn.prepare("SELECT thing_id FROM package_thing WHERE package_id = ?1")?;
    stmt
      .query_map([package_id], |r| r.get(0))?
      .collect::<rusqlite::Result<_>>()?
  };
  conn.execute("DELETE FROM package_thing WHERE package_id = ?1", [package_id])?;
  for url in &things {
    // Hand-made links keep an otherwise orphaned thing alive.
    conn.execute(
      "DELETE FROM thing
       WHERE url = ?1
         AND NOT EXISTS (SELECT 1 FROM package_thing    WHERE thing_id = ?1)
         AND NOT EXISTS (SELECT 1 FROM thing_tag        WHERE thing_id = ?1)
         AND NOT EXISTS (SELECT 1 FROM collection_thing WHERE thing_id = ?1)",
      [url],
    )?;
  }

  Ok(Claims { things, thing_tags, memberships })
}

fn claimed_pairs(
  conn: &Connection,
  sql: &str,
  package_id: &str,
) -> Result<HashSet<(String, String)>> {
  let mut stmt = conn.prepare(sql)?;
  let pairs = stmt
    .query_map([package_id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;
  Ok(pairs)
}

/// Remove a package, its claims and the rows only it derived.
pub fn retire(conn: &mut Connection, package_id: &str) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let Some(hash) = catalog::package_hash(&tx, package_id)? else {
    return Err(CatalogError::not_found(EntityKind::Package, package_id).into());
  };

  release_derived(&tx, package_id)?;
  tx.execute("DELETE FROM package WHERE id = ?1", [package_id])?;
  catalog::record_event(&tx, package_id, &hash, PackageEventKind::Retired, Utc::now())?;
  tx.commit()?;
  Ok(())
}
