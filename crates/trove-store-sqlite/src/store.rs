//! [`SqliteStore`], the SQLite implementation of [`CatalogStore`], and
//! [`SqliteReader`], its read-only façade.

use std::path::Path;

use serde_json::Value;
use trove_core::{
  entity::{Collection, Tag, Thing},
  identity::extract_id,
  ingest::{BatchEntry, BatchReport, IngestOutcome, IngestStatus},
  package::{Package, PackageEvent, StoredPackage},
  store::{CatalogQuery, CatalogStats, CatalogStore, InsertMode, OnConflict, ThingFilter},
};

use crate::{
  CatalogConfig, Result, catalog,
  ingest::{self, Policy},
  query,
  schema::SCHEMA,
};

// ─── Reader ──────────────────────────────────────────────────────────────────

/// Read-only handle on a catalog; implements only [`CatalogQuery`].
///
/// Hand this to renderers and exporters. Cloning is cheap and every clone
/// shares the store's connection.
#[derive(Clone)]
pub struct SqliteReader {
  conn: tokio_rusqlite::Connection,
}

impl SqliteReader {
  /// Run a read on the connection thread.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(&*conn))).await?
  }
}

impl CatalogQuery for SqliteReader {
  type Error = crate::Error;

  async fn list_things(&self, filter: ThingFilter) -> Result<Vec<Thing>> {
    self.read(move |conn| query::list_things(conn, &filter)).await
  }

  async fn get_thing(&self, url: &str) -> Result<Thing> {
    let url = url.to_owned();
    self.read(move |conn| query::get_thing(conn, &url)).await
  }

  async fn get_tag(&self, id: &str) -> Result<Tag> {
    let id = id.to_owned();
    self.read(move |conn| query::get_tag(conn, &id)).await
  }

  async fn get_collection(&self, id: &str) -> Result<Collection> {
    let id = id.to_owned();
    self.read(move |conn| query::get_collection(conn, &id)).await
  }

  async fn list_tags(&self) -> Result<Vec<Tag>> { self.read(query::list_tags).await }

  async fn list_collections(&self) -> Result<Vec<Collection>> {
    self.read(query::list_collections).await
  }

  async fn list_categories(&self) -> Result<Vec<Tag>> {
    self.read(query::list_categories).await
  }

  async fn list_tags_for_thing(&self, url: &str) -> Result<Vec<Tag>> {
    let url = url.to_owned();
    self.read(move |conn| query::list_tags_for_thing(conn, &url)).await
  }

  async fn list_collections_for_thing(&self, url: &str) -> Result<Vec<Collection>> {
    let url = url.to_owned();
    self
      .read(move |conn| query::list_collections_for_thing(conn, &url))
      .await
  }

  async fn get_package(&self, id: &str) -> Result<StoredPackage> {
    let id = id.to_owned();
    self.read(move |conn| query::get_package(conn, &id)).await
  }

  async fn list_packages(&self) -> Result<Vec<StoredPackage>> {
    self.read(query::list_packages).await
  }

  async fn package_history(&self, id: &str) -> Result<Vec<PackageEvent>> {
    let id = id.to_owned();
    self.read(move |conn| query::package_history(conn, &id)).await
  }

  async fn stats(&self) -> Result<CatalogStats> { self.read(query::stats).await }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Trove catalog backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// run on the connection's single thread, which serialises writers.
#[derive(Clone)]
pub struct SqliteStore {
  reader: SqliteReader,
  policy: Policy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default settings.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, CatalogConfig::default().policy()?).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, CatalogConfig::default().policy()?).await
  }

  /// Open the store described by `config`.
  pub async fn open_with(config: &CatalogConfig) -> Result<Self> {
    let policy = config.policy()?;
    let conn = if config.is_in_memory() {
      tokio_rusqlite::Connection::open_in_memory().await?
    } else {
      tokio_rusqlite::Connection::open(&config.store_path).await?
    };
    tracing::info!(
      path = %config.store_path.display(),
      id_field = %policy.id_field,
      allow_updates = policy.allow_updates,
      "opening catalog"
    );
    Self::init(conn, policy).await
  }

  async fn init(conn: tokio_rusqlite::Connection, policy: Policy) -> Result<Self> {
    let store = Self { reader: SqliteReader { conn }, policy };
    store.init_schema().await?;
    Ok(store)
  }

  /// Create the schema, then run the bootstrap seeding. Runs outside a
  /// transaction: SQLite ignores `foreign_keys` and rejects a `journal_mode`
  /// change inside one.
  async fn init_schema(&self) -> Result<()> {
    self
      .reader
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(catalog::bootstrap(conn))
      })
      .await?
  }

  /// A read-only handle on this catalog.
  pub fn reader(&self) -> SqliteReader { self.reader.clone() }

  /// Run `f` inside one `IMMEDIATE` transaction on the connection thread.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self
      .reader
      .conn
      .call(move |conn| Ok(in_transaction(conn, f)))
      .await?
  }
}

fn in_transaction<T>(
  conn: &mut rusqlite::Connection,
  f: impl FnOnce(&rusqlite::Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
  let value = f(&*tx)?;
  tx.commit()?;
  Ok(value)
}

// ─── CatalogQuery impl ───────────────────────────────────────────────────────

impl CatalogQuery for SqliteStore {
  type Error = crate::Error;

  async fn list_things(&self, filter: ThingFilter) -> Result<Vec<Thing>> {
    self.reader.list_things(filter).await
  }

  async fn get_thing(&self, url: &str) -> Result<Thing> { self.reader.get_thing(url).await }

  async fn get_tag(&self, id: &str) -> Result<Tag> { self.reader.get_tag(id).await }

  async fn get_collection(&self, id: &str) -> Result<Collection> {
    self.reader.get_collection(id).await
  }

  async fn list_tags(&self) -> Result<Vec<Tag>> { self.reader.list_tags().await }

  async fn list_collections(&self) -> Result<Vec<Collection>> {
    self.reader.list_collections().await
  }

  async fn list_categories(&self) -> Result<Vec<Tag>> {
    self.reader.list_categories().await
  }

  async fn list_tags_for_thing(&self, url: &str) -> Result<Vec<Tag>> {
    self.reader.list_tags_for_thing(url).await
  }

  async fn list_collections_for_thing(&self, url: &str) -> Result<Vec<Collection>> {
    self.reader.list_collections_for_thing(url).await
  }

  async fn get_package(&self, id: &str) -> Result<StoredPackage> {
    self.reader.get_package(id).await
  }

  async fn list_packages(&self) -> Result<Vec<StoredPackage>> {
    self.reader.list_packages().await
  }

  async fn package_history(&self, id: &str) -> Result<Vec<PackageEvent>> {
    self.reader.package_history(id).await
  }

  async fn stats(&self) -> Result<CatalogStats> { self.reader.stats().await }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  // ── Entities ──────────────────────────────────────────────────────────────

  async fn upsert_tag(&self, tag: Tag) -> Result<()> {
    let id = tag.id.clone();
    let inserted = self
      .write(move |conn| catalog::upsert_tag(conn, &tag, OnConflict::Ignore))
      .await?;
    if !inserted {
      tracing::trace!(tag = %id, "tag already present; left unchanged");
    }
    Ok(())
  }

  async fn replace_tag(&self, tag: Tag) -> Result<()> {
    let id = tag.id.clone();
    self
      .write(move |conn| catalog::upsert_tag(conn, &tag, OnConflict::Replace))
      .await?;
    tracing::debug!(tag = %id, "tag metadata replaced");
    Ok(())
  }

  async fn upsert_thing(&self, thing: Thing, on_conflict: OnConflict) -> Result<()> {
    self
      .write(move |conn| catalog::upsert_thing(conn, &thing, on_conflict))
      .await
  }

  async fn upsert_collection(
    &self,
    collection: Collection,
    on_conflict: OnConflict,
  ) -> Result<()> {
    self
      .write(move |conn| catalog::upsert_collection(conn, &collection, on_conflict))
      .await
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  async fn add_membership(
    &self,
    collection_id: &str,
    thing_url: &str,
    mode: InsertMode,
  ) -> Result<()> {
    let (collection_id, thing_url) = (collection_id.to_owned(), thing_url.to_owned());
    self
      .write(move |conn| {
        catalog::add_membership(conn, &collection_id, &thing_url, mode).map(drop)
      })
      .await
  }

  async fn add_thing_tag(&self, thing_url: &str, tag_id: &str, mode: InsertMode) -> Result<()> {
    let (thing_url, tag_id) = (thing_url.to_owned(), tag_id.to_owned());
    self
      .write(move |conn| catalog::add_thing_tag(conn, &thing_url, &tag_id, mode).map(drop))
      .await
  }

  async fn remove_membership(&self, collection_id: &str, thing_url: &str) -> Result<()> {
    let (collection_id, thing_url) = (collection_id.to_owned(), thing_url.to_owned());
    self
      .write(move |conn| catalog::remove_membership(conn, &collection_id, &thing_url))
      .await
  }

  async fn remove_thing_tag(&self, thing_url: &str, tag_id: &str) -> Result<()> {
    let (thing_url, tag_id) = (thing_url.to_owned(), tag_id.to_owned());
    self
      .write(move |conn| catalog::remove_thing_tag(conn, &thing_url, &tag_id))
      .await
  }

  // ── Deletes ───────────────────────────────────────────────────────────────

  async fn delete_tag(&self, id: &str) -> Result<()> {
    let id = id.to_owned();
    self.write(move |conn| catalog::delete_tag(conn, &id)).await
  }

  async fn delete_thing(&self, url: &str) -> Result<()> {
    let url = url.to_owned();
    self.write(move |conn| catalog::delete_thing(conn, &url)).await
  }

  async fn delete_collection(&self, id: &str) -> Result<()> {
    let id = id.to_owned();
    self.write(move |conn| catalog::delete_collection(conn, &id)).await
  }

  // ── Packages ──────────────────────────────────────────────────────────────

  async fn insert_package(&self, package: Package) -> Result<()> {
    let id = package.id().to_owned();
    let inserted = self
      .write(move |conn| catalog::insert_package(conn, &package, chrono::Utc::now()))
      .await?;
    if inserted {
      tracing::info!(package = %id, "package stored");
    }
    Ok(())
  }

  async fn ingest(&self, body: Value) -> Result<IngestOutcome> {
    let policy = self.policy.clone();
    let outcome = self
      .reader
      .conn
      .call(move |conn| Ok(ingest::ingest(conn, body, &policy)))
      .await??;

    match outcome.status {
      IngestStatus::Unchanged => {
        tracing::debug!(package = %outcome.package_id, "package unchanged; skipped");
      }
      status => tracing::info!(
        package = %outcome.package_id,
        hash = %outcome.hash,
        things = outcome.things,
        ?status,
        "package ingested"
      ),
    }
    Ok(outcome)
  }

  async fn ingest_batch(&self, bodies: Vec<Value>) -> BatchReport<crate::Error> {
    let mut entries = Vec::with_capacity(bodies.len());
    for (index, body) in bodies.into_iter().enumerate() {
      let package_id = extract_id(&body, &self.policy.id_field).ok();
      let result = self.ingest(body).await;
      if let Err(e) = &result {
        tracing::warn!(index, package = ?package_id, error = %e, "descriptor rejected");
      }
      entries.push(BatchEntry { index, package_id, result });
    }
    BatchReport { entries }
  }

  async fn retire_package(&self, id: &str) -> Result<()> {
    let owned = id.to_owned();
    self
      .reader
      .conn
      .call(move |conn| Ok(ingest::retire(conn, &owned)))
      .await??;
    tracing::info!(package = %id, "package retired");
    Ok(())
  }
}
