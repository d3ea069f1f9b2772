//! The `CatalogQuery` and `CatalogStore` traits and supporting types.
//!
//! `CatalogQuery` is the read-only façade handed to renderers and exporters.
//! `CatalogStore` adds the writes: direct catalog edits and package
//! ingestion. Backends (e.g. `trove-store-sqlite`) implement both.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::{
  entity::{Collection, Tag, Thing},
  ingest::{BatchReport, IngestOutcome},
  package::{Package, PackageEvent, StoredPackage},
};

// ─── Parameters ──────────────────────────────────────────────────────────────

/// Filter for [`CatalogQuery::list_things`]. Both filters combine with AND.
#[derive(Debug, Clone, Default)]
pub struct ThingFilter {
  /// Matches the primary category or any secondary tag.
  pub tag_id:        Option<String>,
  pub collection_id: Option<String>,
}

impl ThingFilter {
  pub fn tagged(tag_id: impl Into<String>) -> Self {
    Self { tag_id: Some(tag_id.into()), collection_id: None }
  }

  pub fn in_collection(collection_id: impl Into<String>) -> Self {
    Self { tag_id: None, collection_id: Some(collection_id.into()) }
  }
}

/// What to do when an upserted row's key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
  /// Keep the stored row.
  #[default]
  Ignore,
  /// Overwrite the stored row.
  Replace,
}

/// How link inserts treat an existing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
  /// A duplicate pair is a successful no-op.
  #[default]
  Idempotent,
  /// A duplicate pair fails with `DuplicateMembership`.
  Strict,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CatalogStats {
  pub tags:        usize,
  pub things:      usize,
  pub collections: usize,
  pub memberships: usize,
  pub thing_tags:  usize,
  pub packages:    usize,
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Read-only access to a catalog.
///
/// Every call runs a fresh query; no cursor state is kept between calls, and
/// a call never observes a half-applied ingestion.
pub trait CatalogQuery: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Things matching `filter`, ordered by name then URL.
  fn list_things(
    &self,
    filter: ThingFilter,
  ) -> impl Future<Output = Result<Vec<Thing>, Self::Error>> + Send + '_;

  /// Fails with `NotFound` when no thing has this URL.
  fn get_thing<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Thing, Self::Error>> + Send + 'a;

  /// Fails with `NotFound` when the tag does not exist.
  fn get_tag<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + 'a;

  /// Fails with `NotFound` when the collection does not exist.
  fn get_collection<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Collection, Self::Error>> + Send + 'a;

  fn list_tags(
    &self,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  fn list_collections(
    &self,
  ) -> impl Future<Output = Result<Vec<Collection>, Self::Error>> + Send + '_;

  /// Tags used as the primary category of at least one thing.
  fn list_categories(
    &self,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  /// Secondary tags of a thing (its category is on the thing itself).
  fn list_tags_for_thing<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + 'a;

  fn list_collections_for_thing<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Vec<Collection>, Self::Error>> + Send + 'a;

  /// Fails with `NotFound` when no package has this id.
  fn get_package<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<StoredPackage, Self::Error>> + Send + 'a;

  fn list_packages(
    &self,
  ) -> impl Future<Output = Result<Vec<StoredPackage>, Self::Error>> + Send + '_;

  /// Journal of a package id, oldest first. Retired ids keep their history.
  fn package_history<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Vec<PackageEvent>, Self::Error>> + Send + 'a;

  fn stats(
    &self,
  ) -> impl Future<Output = Result<CatalogStats, Self::Error>> + Send + '_;
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// A catalog that can be edited and fed packages.
///
/// Referential integrity is enforced on every write: a row can only reference
/// rows that exist, and a row cannot be deleted while anything references it.
pub trait CatalogStore: CatalogQuery {
  /// Insert `tag` unless its id exists; an existing tag is left unchanged.
  fn upsert_tag(
    &self,
    tag: Tag,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert `tag`, or overwrite the name, summary and icon of the stored tag
  /// with the same id. Things and links referencing it are untouched.
  fn replace_tag(
    &self,
    tag: Tag,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert `thing`, resolving a URL clash with `on_conflict`.
  ///
  /// Fails with `ForeignKeyViolation` when the category tag does not exist.
  fn upsert_thing(
    &self,
    thing: Thing,
    on_conflict: OnConflict,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn upsert_collection(
    &self,
    collection: Collection,
    on_conflict: OnConflict,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Put a thing into a collection.
  fn add_membership<'a>(
    &'a self,
    collection_id: &'a str,
    thing_url: &'a str,
    mode: InsertMode,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Attach a secondary tag to a thing.
  fn add_thing_tag<'a>(
    &'a self,
    thing_url: &'a str,
    tag_id: &'a str,
    mode: InsertMode,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_membership<'a>(
    &'a self,
    collection_id: &'a str,
    thing_url: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_thing_tag<'a>(
    &'a self,
    thing_url: &'a str,
    tag_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fails with `ForeignKeyViolation` while things or links reference the tag.
  fn delete_tag<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fails with `ForeignKeyViolation` while links or packages reference the
  /// thing.
  fn delete_thing<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fails with `ForeignKeyViolation` while the collection has members.
  fn delete_collection<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Store a package without deriving rows from it.
  ///
  /// Idempotent when the same id and hash are stored already; fails with
  /// `UniqueConstraintViolation` when the id is stored with another hash.
  fn insert_package(
    &self,
    package: Package,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Ingest one descriptor atomically: store it and (re-)derive its rows.
  fn ingest(
    &self,
    body: Value,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  /// Ingest each descriptor in its own transaction, reporting per descriptor.
  fn ingest_batch(
    &self,
    bodies: Vec<Value>,
  ) -> impl Future<Output = BatchReport<Self::Error>> + Send + '_;

  /// Remove a package and every row derived only from it.
  fn retire_package<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
