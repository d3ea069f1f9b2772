//! Integration tests for `SqliteStore` against an in-memory database.

use serde_json::{Value, json};
use trove_core::{
  Error as CatalogError,
  entity::{Collection, MISCELLANEOUS, Tag, Thing},
  error::EntityKind,
  identity::IdField,
  ingest::IngestStatus,
  package::{Package, PackageEventKind},
  store::{CatalogQuery, CatalogStore, InsertMode, OnConflict, ThingFilter},
};

use crate::{CatalogConfig, Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn catalog_err(e: &Error) -> &CatalogError {
  e.catalog()
    .unwrap_or_else(|| panic!("expected a catalog error, got {e:?}"))
}

fn urls(things: &[Thing]) -> Vec<&str> { things.iter().map(|t| t.url.as_str()).collect() }

fn pkg1() -> Value {
  json!({
    "id": "pkg1",
    "things": [{ "url": "https://x", "name": "X", "category": "tools" }]
  })
}

// ─── Bootstrap ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_has_fallback_tag() {
  let s = store().await;

  let misc = s.get_tag(MISCELLANEOUS).await.unwrap();
  assert_eq!(misc, Tag::miscellaneous());

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.tags, 1);
  assert_eq!(stats.things, 0);
  assert_eq!(stats.packages, 0);
}

#[tokio::test]
async fn reopening_a_file_keeps_data_and_seeds_once() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("catalog.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.ingest(pkg1()).await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let stats = s.stats().await.unwrap();
  assert_eq!(stats.tags, 2, "miscellaneous + tools, no duplicate seed");
  assert_eq!(stats.things, 1);
  assert_eq!(stats.packages, 1);

  let again = s.ingest(pkg1()).await.unwrap();
  assert_eq!(again.status, IngestStatus::Unchanged);
}

// ─── Tags ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_tag_ignores_existing() {
  let s = store().await;

  s.upsert_tag(Tag::new("cli").with_name("CLI")).await.unwrap();
  s.upsert_tag(Tag::new("cli").with_name("Command line"))
    .await
    .unwrap();

  let tag = s.get_tag("cli").await.unwrap();
  assert_eq!(tag.name.as_deref(), Some("CLI"));
}

#[tokio::test]
async fn replace_tag_overwrites_metadata_of_a_used_tag() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();

  s.replace_tag(
    Tag::new("tools")
      .with_name("Tools")
      .with_summary("Things that make things"),
  )
  .await
  .unwrap();

  let tools = s.get_tag("tools").await.unwrap();
  assert_eq!(tools.label(), "Tools");
  assert_eq!(tools.summary.as_deref(), Some("Things that make things"));
  assert_eq!(s.get_thing("https://x").await.unwrap().category_id, "tools");

  s.replace_tag(Tag::new("fresh")).await.unwrap();
  assert!(s.get_tag("fresh").await.is_ok());
}

#[tokio::test]
async fn tag_icon_roundtrip() {
  let s = store().await;
  let icon = vec![0x89, b'P', b'N', b'G'];

  s.upsert_tag(Tag::new("art").with_icon(icon.clone()))
    .await
    .unwrap();

  assert_eq!(s.get_tag("art").await.unwrap().icon, Some(icon));
}

#[tokio::test]
async fn get_missing_entities_is_not_found() {
  let s = store().await;

  let err = s.get_tag("nope").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Tag, key } if key == "nope"
  ));

  let err = s.get_collection("nope").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Collection, .. }
  ));

  let err = s.get_thing("https://nope").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Thing, .. }
  ));

  let err = s.get_package("nope").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Package, .. }
  ));
}

// ─── Things ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_thing_requires_category() {
  let s = store().await;

  let err = s
    .upsert_thing(Thing::new("https://x", "X", "missing"), OnConflict::Replace)
    .await
    .unwrap_err();

  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Tag, key, .. } if key == "missing"
  ));
  assert_eq!(s.stats().await.unwrap().things, 0);
}

#[tokio::test]
async fn upsert_thing_conflict_policy() {
  let s = store().await;
  s.upsert_thing(Thing::new("https://x", "X", MISCELLANEOUS), OnConflict::Ignore)
    .await
    .unwrap();

  s.upsert_thing(Thing::new("https://x", "Ignored", MISCELLANEOUS), OnConflict::Ignore)
    .await
    .unwrap();
  assert_eq!(s.get_thing("https://x").await.unwrap().name, "X");

  s.upsert_thing(
    Thing::new("https://x", "Replaced", MISCELLANEOUS).with_summary("new"),
    OnConflict::Replace,
  )
  .await
  .unwrap();
  let thing = s.get_thing("https://x").await.unwrap();
  assert_eq!(thing.name, "Replaced");
  assert_eq!(thing.summary.as_deref(), Some("new"));
}

// ─── Links ───────────────────────────────────────────────────────────────────

async fn store_with_thing_and_collection() -> SqliteStore {
  let s = store().await;
  s.upsert_thing(Thing::new("https://x", "X", MISCELLANEOUS), OnConflict::Ignore)
    .await
    .unwrap();
  s.upsert_collection(Collection::new("g1", "Group one"), OnConflict::Ignore)
    .await
    .unwrap();
  s
}

#[tokio::test]
async fn membership_requires_both_rows() {
  let s = store_with_thing_and_collection().await;

  let err = s
    .add_membership("missing", "https://x", InsertMode::Idempotent)
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Collection, .. }
  ));

  let err = s
    .add_membership("g1", "https://missing", InsertMode::Idempotent)
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Thing, .. }
  ));

  assert_eq!(s.stats().await.unwrap().memberships, 0);
}

#[tokio::test]
async fn membership_duplicates_follow_insert_mode() {
  let s = store_with_thing_and_collection().await;

  s.add_membership("g1", "https://x", InsertMode::Idempotent)
    .await
    .unwrap();
  s.add_membership("g1", "https://x", InsertMode::Idempotent)
    .await
    .unwrap();
  assert_eq!(s.stats().await.unwrap().memberships, 1);

  let err = s
    .add_membership("g1", "https://x", InsertMode::Strict)
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::DuplicateMembership { entity: EntityKind::Membership, .. }
  ));
}

#[tokio::test]
async fn thing_tags_follow_insert_mode() {
  let s = store_with_thing_and_collection().await;
  s.upsert_tag(Tag::new("cli")).await.unwrap();

  let err = s
    .add_thing_tag("https://x", "missing", InsertMode::Idempotent)
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Tag, .. }
  ));

  s.add_thing_tag("https://x", "cli", InsertMode::Strict)
    .await
    .unwrap();
  s.add_thing_tag("https://x", "cli", InsertMode::Idempotent)
    .await
    .unwrap();
  let err = s
    .add_thing_tag("https://x", "cli", InsertMode::Strict)
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::DuplicateMembership { entity: EntityKind::ThingTag, .. }
  ));

  let tags = s.list_tags_for_thing("https://x").await.unwrap();
  assert_eq!(tags, vec![Tag::new("cli")]);
}

#[tokio::test]
async fn removing_a_missing_link_is_not_found() {
  let s = store_with_thing_and_collection().await;

  let err = s.remove_membership("g1", "https://x").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Membership, .. }
  ));

  let err = s.remove_thing_tag("https://x", "cli").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::ThingTag, .. }
  ));
}

// ─── Referential deletes ─────────────────────────────────────────────────────

#[tokio::test]
async fn delete_tag_checks_references() {
  let s = store().await;
  s.upsert_tag(Tag::new("tools")).await.unwrap();
  s.upsert_tag(Tag::new("unused")).await.unwrap();
  s.upsert_thing(Thing::new("https://x", "X", "tools"), OnConflict::Ignore)
    .await
    .unwrap();

  let err = s.delete_tag("tools").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Tag, .. }
  ));

  let err = s.delete_tag(MISCELLANEOUS).await.unwrap_err();
  assert!(matches!(catalog_err(&err), CatalogError::ReservedTag(_)));

  let err = s.delete_tag("nope").await.unwrap_err();
  assert!(matches!(catalog_err(&err), CatalogError::NotFound { .. }));

  s.delete_tag("unused").await.unwrap();
  assert!(s.get_tag("unused").await.is_err());
  assert!(s.get_tag("tools").await.is_ok());
}

#[tokio::test]
async fn delete_thing_and_collection_require_removing_dependents_first() {
  let s = store_with_thing_and_collection().await;
  s.add_membership("g1", "https://x", InsertMode::Idempotent)
    .await
    .unwrap();

  let err = s.delete_thing("https://x").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Thing, .. }
  ));
  let err = s.delete_collection("g1").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Collection, .. }
  ));

  s.remove_membership("g1", "https://x").await.unwrap();
  s.delete_thing("https://x").await.unwrap();
  s.delete_collection("g1").await.unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!((stats.things, stats.collections, stats.memberships), (0, 0, 0));
}

// ─── Packages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_package_is_idempotent_and_rejects_conflicts() {
  let s = store().await;
  let field = IdField::default();

  let v1 = Package::from_body(json!({ "id": "p", "n": 1 }), &field).unwrap();
  let v2 = Package::from_body(json!({ "id": "p", "n": 2 }), &field).unwrap();

  s.insert_package(v1.clone()).await.unwrap();
  s.insert_package(v1.clone()).await.unwrap();

  let err = s.insert_package(v2.clone()).await.unwrap_err();
  match catalog_err(&err) {
    CatalogError::UniqueConstraintViolation { id, existing, incoming } => {
      assert_eq!(id, "p");
      assert_eq!(existing, v1.hash().as_str());
      assert_eq!(incoming, v2.hash().as_str());
    }
    other => panic!("unexpected error: {other:?}"),
  }

  let stored = s.get_package("p").await.unwrap();
  assert_eq!(stored.package.hash(), v1.hash());
  assert_eq!(stored.package.body(), v1.body());
  assert_eq!(s.list_packages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stored_packages_expose_their_metadata() {
  let s = store().await;
  s.ingest(json!({
    "id": "awesome",
    "title": "Awesome things",
    "licenses": [{ "name": "CC0-1.0", "path": "https://cc0" }],
    "things": [{ "url": "https://x", "name": "X" }]
  }))
  .await
  .unwrap();

  let meta = s.get_package("awesome").await.unwrap().meta().unwrap();
  assert_eq!(meta.title.as_deref(), Some("Awesome things"));
  assert_eq!(meta.licences.len(), 1);
  assert_eq!(format!("{:#}", meta.licences[0]), "[CC0-1.0](https://cc0)");
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_derives_tag_and_thing() {
  let s = store().await;

  let outcome = s.ingest(pkg1()).await.unwrap();
  assert_eq!(outcome.package_id, "pkg1");
  assert_eq!(outcome.status, IngestStatus::Created);
  assert_eq!(outcome.things, 1);

  s.get_tag("tools").await.unwrap();
  let thing = s.get_thing("https://x").await.unwrap();
  assert_eq!(thing.category_id, "tools");

  let tools = s.list_things(ThingFilter::tagged("tools")).await.unwrap();
  assert_eq!(tools, vec![Thing::new("https://x", "X", "tools")]);
}

#[tokio::test]
async fn reingesting_identical_content_is_a_no_op() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();
  let before = s.stats().await.unwrap();

  let outcome = s.ingest(pkg1()).await.unwrap();
  assert_eq!(outcome.status, IngestStatus::Unchanged);
  assert_eq!(s.stats().await.unwrap(), before);

  let history = s.package_history("pkg1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].kind, PackageEventKind::Created);
}

#[tokio::test]
async fn key_order_does_not_count_as_a_change() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();

  let reordered: Value = serde_json::from_str(
    r#"{"things":[{"category":"tools","name":"X","url":"https://x"}],"id":"pkg1"}"#,
  )
  .unwrap();
  let outcome = s.ingest(reordered).await.unwrap();
  assert_eq!(outcome.status, IngestStatus::Unchanged);
}

#[tokio::test]
async fn thing_without_category_falls_back_to_miscellaneous() {
  let s = store().await;
  s.ingest(json!({
    "id": "p",
    "things": [{ "url": "https://x", "name": "X" }]
  }))
  .await
  .unwrap();

  let misc = s
    .list_things(ThingFilter::tagged(MISCELLANEOUS))
    .await
    .unwrap();
  assert_eq!(urls(&misc), vec!["https://x"]);
}

#[tokio::test]
async fn ingest_with_missing_collection_commits_nothing() {
  let s = store().await;
  let before = s.stats().await.unwrap();

  let err = s
    .ingest(json!({
      "id": "pkg1",
      "things": [{ "url": "https://x", "name": "X", "category": "tools",
                   "collections": ["G1"] }]
    }))
    .await
    .unwrap_err();

  assert!(matches!(&err, Error::Ingestion { package, .. } if package == "pkg1"));
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Collection, key, .. } if key == "G1"
  ));

  assert_eq!(s.stats().await.unwrap(), before);
  assert!(s.get_tag("tools").await.is_err());
  assert!(s.get_package("pkg1").await.is_err());
  assert!(s.package_history("pkg1").await.unwrap().is_empty());
}

#[tokio::test]
async fn failure_late_in_derivation_rolls_back_earlier_rows() {
  let s = store().await;
  s.upsert_collection(Collection::new("g1", "Group one"), OnConflict::Ignore)
    .await
    .unwrap();
  let before = s.stats().await.unwrap();

  let err = s
    .ingest(json!({
      "id": "p",
      "tags": [{ "id": "declared", "name": "Declared" }],
      "things": [
        { "url": "https://a", "name": "A", "category": "tools",
          "tags": ["cli"], "collections": ["g1"] },
        { "url": "https://b", "name": "B", "collections": ["missing"] }
      ]
    }))
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { .. }
  ));

  assert_eq!(s.stats().await.unwrap(), before);
  for tag in ["declared", "tools", "cli"] {
    assert!(s.get_tag(tag).await.is_err(), "{tag} leaked");
  }
  assert!(s.get_thing("https://a").await.is_err());
}

#[tokio::test]
async fn malformed_descriptors_are_rejected() {
  let s = store().await;

  let err = s.ingest(json!({ "things": [] })).await.unwrap_err();
  assert!(matches!(err, Error::Catalog(CatalogError::MalformedDescriptor(_))));

  let err = s
    .ingest(json!({ "id": "p", "things": [{ "url": "https://x" }] }))
    .await
    .unwrap_err();
  assert!(matches!(&err, Error::Ingestion { package, .. } if package == "p"));
  assert!(matches!(
    catalog_err(&err),
    CatalogError::MalformedDescriptor(_)
  ));

  assert_eq!(s.stats().await.unwrap().packages, 0);
}

#[tokio::test]
async fn derivation_links_tags_and_collections() {
  let s = store().await;
  s.upsert_collection(
    Collection::new("g1", "Group one").with_url("https://lists/g1"),
    OnConflict::Ignore,
  )
  .await
  .unwrap();

  s.ingest(json!({
    "id": "p",
    "tags": [{ "id": "cli", "name": "Command line", "summary": "Terminal tools" }],
    "things": [
      { "url": "https://t", "name": "T", "category": "tools",
        "tags": ["cli", "rust"], "collections": ["g1"] },
      { "url": "https://u", "name": "U", "category": "libs" }
    ]
  }))
  .await
  .unwrap();

  let in_g1 = s.list_things(ThingFilter::in_collection("g1")).await.unwrap();
  assert_eq!(urls(&in_g1), vec!["https://t"]);

  let tools = s.list_things(ThingFilter::tagged("tools")).await.unwrap();
  assert_eq!(urls(&tools), vec!["https://t"]);

  // Secondary tags count for the tag filter too.
  let cli = s.list_things(ThingFilter::tagged("cli")).await.unwrap();
  assert_eq!(urls(&cli), vec!["https://t"]);

  let both = s
    .list_things(ThingFilter {
      tag_id:        Some("libs".into()),
      collection_id: Some("g1".into()),
    })
    .await
    .unwrap();
  assert!(both.is_empty());

  let all = s.list_things(ThingFilter::default()).await.unwrap();
  assert_eq!(urls(&all), vec!["https://t", "https://u"]);

  let tags = s.list_tags_for_thing("https://t").await.unwrap();
  let tag_ids: Vec<&str> = tags.iter().map(|t| t.id.as_str()).collect();
  assert_eq!(tag_ids, vec!["cli", "rust"]);
  assert_eq!(tags[0].name.as_deref(), Some("Command line"));

  let collections = s.list_collections_for_thing("https://t").await.unwrap();
  assert_eq!(collections.len(), 1);
  assert_eq!(collections[0].url.as_deref(), Some("https://lists/g1"));
  assert!(s.list_collections_for_thing("https://u").await.unwrap().is_empty());

  let categories: Vec<String> = s
    .list_categories()
    .await
    .unwrap()
    .into_iter()
    .map(|t| t.id)
    .collect();
  assert_eq!(categories, vec!["libs", "tools"]);
}

#[tokio::test]
async fn changed_content_updates_derived_rows() {
  let s = store().await;
  s.upsert_collection(Collection::new("g1", "Group one"), OnConflict::Ignore)
    .await
    .unwrap();

  s.ingest(json!({
    "id": "p",
    "things": [
      { "url": "https://a", "name": "Alpha", "category": "tools",
        "tags": ["old"], "collections": ["g1"] },
      { "url": "https://b", "name": "Beta", "category": "tools" }
    ]
  }))
  .await
  .unwrap();

  let outcome = s
    .ingest(json!({
      "id": "p",
      "things": [
        { "url": "https://a", "name": "Alpha 2", "category": "tools" },
        { "url": "https://c", "name": "Gamma", "category": "libs" }
      ]
    }))
    .await
    .unwrap();
  assert_eq!(outcome.status, IngestStatus::Updated);

  assert_eq!(s.get_thing("https://a").await.unwrap().name, "Alpha 2");
  assert!(s.get_thing("https://b").await.is_err());
  assert!(s.get_thing("https://c").await.is_ok());
  assert!(s.list_tags_for_thing("https://a").await.unwrap().is_empty());
  assert!(
    s.list_things(ThingFilter::in_collection("g1"))
      .await
      .unwrap()
      .is_empty()
  );
  // Tags survive their last use.
  assert!(s.get_tag("old").await.is_ok());

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.packages, 1);
  assert_eq!(stats.things, 2);

  let kinds: Vec<PackageEventKind> = s
    .package_history("p")
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.kind)
    .collect();
  assert_eq!(kinds, vec![PackageEventKind::Created, PackageEventKind::Updated]);

  let stored = s.get_package("p").await.unwrap();
  assert_eq!(stored.package.hash(), &outcome.hash);
  assert!(stored.updated_at >= stored.ingested_at);
}

#[tokio::test]
async fn rows_shared_with_another_package_survive_an_update() {
  let s = store().await;
  s.ingest(json!({
    "id": "p1",
    "things": [
      { "url": "https://shared", "name": "Shared", "tags": ["common"] },
      { "url": "https://own", "name": "Own" }
    ]
  }))
  .await
  .unwrap();
  s.ingest(json!({
    "id": "p2",
    "things": [{ "url": "https://shared", "name": "Shared", "tags": ["common"] }]
  }))
  .await
  .unwrap();

  s.ingest(json!({
    "id": "p1",
    "things": [{ "url": "https://own", "name": "Own" }]
  }))
  .await
  .unwrap();

  assert!(s.get_thing("https://shared").await.is_ok());
  let tags = s.list_tags_for_thing("https://shared").await.unwrap();
  assert_eq!(tags.len(), 1);

  s.retire_package("p2").await.unwrap();
  assert!(s.get_thing("https://shared").await.is_err());
  assert!(s.get_thing("https://own").await.is_ok());
}

#[tokio::test]
async fn updates_can_be_refused_by_configuration() {
  let config = CatalogConfig { allow_updates: false, ..CatalogConfig::default() };
  let s = SqliteStore::open_with(&config).await.unwrap();

  s.ingest(pkg1()).await.unwrap();
  let before = s.stats().await.unwrap();

  let err = s
    .ingest(json!({
      "id": "pkg1",
      "things": [{ "url": "https://y", "name": "Y" }]
    }))
    .await
    .unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::UniqueConstraintViolation { id, .. } if id == "pkg1"
  ));

  assert_eq!(s.stats().await.unwrap(), before);
  assert!(s.get_thing("https://y").await.is_err());
  assert_eq!(s.package_history("pkg1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn custom_id_pointer() {
  let config = CatalogConfig { id_pointer: "/meta/name".into(), ..CatalogConfig::default() };
  let s = SqliteStore::open_with(&config).await.unwrap();

  let outcome = s
    .ingest(json!({
      "meta": { "name": "awesome" },
      "things": [{ "url": "https://x", "name": "X" }]
    }))
    .await
    .unwrap();
  assert_eq!(outcome.package_id, "awesome");
  assert!(s.get_package("awesome").await.is_ok());
}

// ─── Retirement ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn retire_package_removes_derived_rows() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();

  s.retire_package("pkg1").await.unwrap();

  assert!(s.get_package("pkg1").await.is_err());
  assert!(s.get_thing("https://x").await.is_err());
  assert!(s.get_tag("tools").await.is_ok());

  let kinds: Vec<PackageEventKind> = s
    .package_history("pkg1")
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.kind)
    .collect();
  assert_eq!(kinds, vec![PackageEventKind::Created, PackageEventKind::Retired]);

  let err = s.retire_package("pkg1").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::NotFound { entity: EntityKind::Package, .. }
  ));

  // A retired id can be ingested again from scratch.
  let outcome = s.ingest(pkg1()).await.unwrap();
  assert_eq!(outcome.status, IngestStatus::Created);
}

#[tokio::test]
async fn package_rows_are_protected_until_retired() {
  let s = store().await;
  s.upsert_collection(Collection::new("g1", "Group one"), OnConflict::Ignore)
    .await
    .unwrap();
  s.ingest(json!({
    "id": "p",
    "things": [{ "url": "https://x", "name": "X", "tags": ["cli"], "collections": ["g1"] }]
  }))
  .await
  .unwrap();

  let err = s.delete_thing("https://x").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Thing, .. }
  ));
  let err = s.remove_thing_tag("https://x", "cli").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::ThingTag, .. }
  ));
  let err = s.remove_membership("g1", "https://x").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Membership, .. }
  ));
}

#[tokio::test]
async fn hand_made_links_keep_a_thing_after_retirement() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();
  s.upsert_collection(Collection::new("mine", "Hand picked"), OnConflict::Ignore)
    .await
    .unwrap();
  s.add_membership("mine", "https://x", InsertMode::Strict)
    .await
    .unwrap();

  s.retire_package("pkg1").await.unwrap();

  let kept = s.list_things(ThingFilter::in_collection("mine")).await.unwrap();
  assert_eq!(urls(&kept), vec!["https://x"]);
}

/// Hand-made rows a package later declares: tag `tools`, collection `g1`,
/// things `https://h` and `https://k`, and `https://h` in `g1`.
async fn store_with_hand_made_rows() -> SqliteStore {
  let s = store().await;
  s.upsert_tag(Tag::new("tools")).await.unwrap();
  s.upsert_collection(Collection::new("g1", "Group one"), OnConflict::Ignore)
    .await
    .unwrap();
  for url in ["https://h", "https://k"] {
    s.upsert_thing(Thing::new(url, "Hand made", "tools"), OnConflict::Ignore)
      .await
      .unwrap();
  }
  s.add_membership("g1", "https://h", InsertMode::Strict)
    .await
    .unwrap();
  s
}

fn declares_hand_made_rows() -> Value {
  json!({
    "id": "p",
    "things": [
      { "url": "https://h", "name": "H", "category": "tools",
        "tags": ["cli"], "collections": ["g1"] },
      { "url": "https://k", "name": "K", "category": "tools" }
    ]
  })
}

#[tokio::test]
async fn retirement_keeps_rows_that_predate_the_package() {
  let s = store_with_hand_made_rows().await;
  s.ingest(declares_hand_made_rows()).await.unwrap();

  s.retire_package("p").await.unwrap();

  let in_g1 = s.list_things(ThingFilter::in_collection("g1")).await.unwrap();
  assert_eq!(urls(&in_g1), vec!["https://h"]);
  assert!(s.get_thing("https://h").await.is_ok());
  assert!(s.get_thing("https://k").await.is_ok());
  // The package created this link, so it goes with the package.
  assert!(s.list_tags_for_thing("https://h").await.unwrap().is_empty());

  // Nothing claims them any more, so they can be removed by hand again.
  s.remove_membership("g1", "https://h").await.unwrap();
  s.delete_thing("https://h").await.unwrap();
  s.delete_thing("https://k").await.unwrap();
}

#[tokio::test]
async fn updates_keep_rows_that_predate_the_package() {
  let s = store_with_hand_made_rows().await;
  s.ingest(declares_hand_made_rows()).await.unwrap();

  let outcome = s
    .ingest(json!({
      "id": "p",
      "things": [{ "url": "https://other", "name": "Other" }]
    }))
    .await
    .unwrap();
  assert_eq!(outcome.status, IngestStatus::Updated);

  let in_g1 = s.list_things(ThingFilter::in_collection("g1")).await.unwrap();
  assert_eq!(urls(&in_g1), vec!["https://h"]);
  assert!(s.get_thing("https://k").await.is_ok());
  assert!(s.list_tags_for_thing("https://h").await.unwrap().is_empty());
  assert_eq!(s.stats().await.unwrap().things, 3);
}

#[tokio::test]
async fn an_update_keeps_ownership_of_rows_the_package_created() {
  let s = store().await;
  s.ingest(pkg1()).await.unwrap();
  s.upsert_collection(Collection::new("mine", "Hand picked"), OnConflict::Ignore)
    .await
    .unwrap();
  s.add_membership("mine", "https://x", InsertMode::Strict)
    .await
    .unwrap();

  s.ingest(json!({
    "id": "pkg1",
    "things": [{ "url": "https://x", "name": "X renamed", "category": "tools" }]
  }))
  .await
  .unwrap();

  s.remove_membership("mine", "https://x").await.unwrap();
  let err = s.delete_thing("https://x").await.unwrap_err();
  assert!(matches!(
    catalog_err(&err),
    CatalogError::ForeignKeyViolation { entity: EntityKind::Thing, .. }
  ));

  s.retire_package("pkg1").await.unwrap();
  assert!(s.get_thing("https://x").await.is_err());
}

// ─── Batches ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_reports_each_descriptor() {
  let s = store().await;

  let report = s
    .ingest_batch(vec![
      json!({ "id": "a", "things": [{ "url": "https://a", "name": "A" }] }),
      json!({ "things": [] }),
      json!({ "id": "b", "things": [{ "url": "https://b", "name": "B",
                                      "collections": ["nope"] }] }),
      json!({ "id": "c", "things": [{ "url": "https://c", "name": "C" }] }),
    ])
    .await;

  assert_eq!(report.entries.len(), 4);
  assert!(!report.is_success());

  let ok: Vec<&str> = report.succeeded().map(|o| o.package_id.as_str()).collect();
  assert_eq!(ok, vec!["a", "c"]);

  let failed: Vec<(usize, Option<&str>)> = report
    .failed()
    .map(|e| (e.index, e.package_id.as_deref()))
    .collect();
  assert_eq!(failed, vec![(1, None), (2, Some("b"))]);

  let Err(err) = &report.entries[2].result else { panic!("expected failure") };
  assert!(matches!(
    catalog_err(err),
    CatalogError::ForeignKeyViolation { .. }
  ));

  assert!(s.get_thing("https://a").await.is_ok());
  assert!(s.get_thing("https://b").await.is_err());
  assert!(s.get_thing("https://c").await.is_ok());
}

// ─── Read-only façade ────────────────────────────────────────────────────────

/// Stand-in for an external renderer: it only sees `CatalogQuery`.
async fn render_index<Q: CatalogQuery>(catalog: &Q) -> Result<Vec<String>, Q::Error> {
  let mut lines = Vec::new();
  for category in catalog.list_categories().await? {
    lines.push(format!("## {}", category.label()));
    for thing in catalog.list_things(ThingFilter::tagged(&category.id)).await? {
      lines.push(format!("- [{}]({})", thing.name, thing.url));
    }
  }
  Ok(lines)
}

#[tokio::test]
async fn reader_sees_committed_state() {
  let s = store().await;
  let reader = s.reader();

  s.upsert_tag(Tag::new("tools").with_name("Tools")).await.unwrap();
  s.ingest(pkg1()).await.unwrap();

  assert_eq!(reader.get_tag("tools").await.unwrap().label(), "Tools");
  assert_eq!(reader.stats().await.unwrap(), s.stats().await.unwrap());
  assert_eq!(reader.list_tags().await.unwrap().len(), 2);
  assert!(reader.list_collections().await.unwrap().is_empty());

  let lines = render_index(&reader).await.unwrap();
  assert_eq!(lines, vec!["## Tools", "- [X](https://x)"]);
}
