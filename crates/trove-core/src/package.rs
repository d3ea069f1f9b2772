//! Packages: immutable, content-addressed descriptors.
//!
//! A package is the authoritative source from which catalog rows are derived.
//! Its `id` and `hash` are computed from its body and cannot be set
//! independently; the only way to change a package is to store a new body
//! under the same id (an update) or to retire it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  Error, Result,
  descriptor::Descriptor,
  entity::non_empty,
  identity::{ContentHash, IdField, identify},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
  id:   String,
  hash: ContentHash,
  body: Value,
}

impl Package {
  /// Derive a package from its body.
  ///
  /// Fails with `MalformedDescriptor` when the id is missing or when the
  /// optional metadata fields have the wrong shape.
  pub fn from_body(body: Value, field: &IdField) -> Result<Self> {
    let (id, hash) = identify(&body, field)?;
    PackageMeta::from_body(&body)?;
    Ok(Self { id, hash, body })
  }

  /// Parse a JSON document and derive a package from it.
  pub fn parse(text: &str, field: &IdField) -> Result<Self> {
    let body = serde_json::from_str(text)
      .map_err(|e| Error::MalformedDescriptor(e.to_string()))?;
    Self::from_body(body, field)
  }

  /// Rebuild a package read back from storage.
  ///
  /// Backends must only pass values they obtained from a derived package;
  /// the id and hash are not re-checked against the body.
  pub fn restore(id: String, hash: ContentHash, body: Value) -> Self {
    Self { id, hash, body }
  }

  pub fn id(&self) -> &str { &self.id }

  pub fn hash(&self) -> &ContentHash { &self.hash }

  pub fn body(&self) -> &Value { &self.body }

  /// Decode the body into the things, tags and collection links it declares.
  pub fn descriptor(&self) -> Result<Descriptor> { Descriptor::from_body(&self.body) }

  /// Title, licences, contributors and the other package-level metadata.
  pub fn meta(&self) -> Result<PackageMeta> { PackageMeta::from_body(&self.body) }
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Package-level metadata. Every field is optional; exporters use it to
/// credit the sources a catalog was built from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageMeta {
  pub name:         Option<String>,
  pub title:        Option<String>,
  pub description:  Option<String>,
  pub homepage:     Option<String>,
  pub licences:     Vec<Licence>,
  pub contributors: Vec<Contributor>,
  pub keywords:     Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Licence {
  /// Short identifier, e.g. `CC0-1.0`.
  pub name:  String,
  pub path:  Option<String>,
  pub title: Option<String>,
}

impl fmt::Display for Licence {
  /// `{:#}` renders a Markdown link when the licence has a path.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.path {
      Some(path) if f.alternate() => write!(f, "[{}]({path})", self.name),
      _ => f.write_str(&self.name),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
  pub title:        String,
  pub path:         Option<String>,
  pub email:        Option<String>,
  pub organization: Option<String>,
  pub role:         Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMeta {
  name:         Option<String>,
  title:        Option<String>,
  description:  Option<String>,
  homepage:     Option<String>,
  #[serde(alias = "licences")]
  licenses:     Vec<RawLicence>,
  contributors: Vec<RawContributor>,
  keywords:     Vec<String>,
}

#[derive(Deserialize)]
struct RawLicence {
  name:  String,
  path:  Option<String>,
  title: Option<String>,
}

#[derive(Deserialize)]
struct RawContributor {
  title:        String,
  path:         Option<String>,
  email:        Option<String>,
  organization: Option<String>,
  role:         Option<String>,
}

impl PackageMeta {
  /// Read the metadata fields of a package body, ignoring everything else.
  pub fn from_body(body: &Value) -> Result<Self> {
    if !body.is_object() {
      return Err(Error::MalformedDescriptor(
        "package body must be a JSON object".to_owned(),
      ));
    }
    let raw = RawMeta::deserialize(body)
      .map_err(|e| Error::MalformedDescriptor(format!("package metadata: {e}")))?;

    let licences = raw
      .licenses
      .into_iter()
      .map(|l| {
        let name = non_empty(Some(l.name)).ok_or_else(|| {
          Error::MalformedDescriptor("licence `name` is required".to_owned())
        })?;
        Ok(Licence { name, path: non_empty(l.path), title: non_empty(l.title) })
      })
      .collect::<Result<Vec<_>>>()?;

    let contributors = raw
      .contributors
      .into_iter()
      .map(|c| {
        let title = non_empty(Some(c.title)).ok_or_else(|| {
          Error::MalformedDescriptor("contributor `title` is required".to_owned())
        })?;
        Ok(Contributor {
          title,
          path: non_empty(c.path),
          email: non_empty(c.email),
          organization: non_empty(c.organization),
          role: non_empty(c.role),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      name: non_empty(raw.name),
      title: non_empty(raw.title),
      description: non_empty(raw.description),
      homepage: non_empty(raw.homepage),
      licences,
      contributors,
      keywords: raw.keywords.into_iter().filter_map(|k| non_empty(Some(k))).collect(),
    })
  }
}

/// A package as held by the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredPackage {
  pub package:     Package,
  pub ingested_at: DateTime<Utc>,
  /// When the body was last replaced; equal to `ingested_at` until then.
  pub updated_at:  DateTime<Utc>,
}

impl StoredPackage {
  pub fn meta(&self) -> Result<PackageMeta> { self.package.meta() }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageEventKind {
  Created,
  Updated,
  Retired,
}

/// One entry of a package's journal. Unchanged re-ingestion is not journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEvent {
  pub package_id:  String,
  pub hash:        ContentHash,
  pub kind:        PackageEventKind,
  pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn id_and_hash_are_derived_from_the_body() {
    let body = json!({ "id": "pkg1", "things": [] });
    let pkg = Package::from_body(body.clone(), &IdField::default()).unwrap();

    assert_eq!(pkg.id(), "pkg1");
    assert_eq!(pkg.hash(), &crate::identity::content_hash(&body));
    assert_eq!(pkg.body(), &body);
  }

  #[test]
  fn metadata_is_read_from_the_body() {
    let pkg = Package::from_body(
      json!({
        "id": "awesome",
        "title": "Awesome things",
        "description": " ",
        "licenses": [{ "name": "CC0-1.0", "path": "https://cc0" }],
        "contributors": [{ "title": "Ada", "role": "author" }],
        "keywords": ["rust", ""]
      }),
      &IdField::default(),
    )
    .unwrap();

    let meta = pkg.meta().unwrap();
    assert_eq!(meta.title.as_deref(), Some("Awesome things"));
    assert_eq!(meta.description, None);
    assert_eq!(meta.keywords, vec!["rust"]);
    assert_eq!(meta.contributors[0].role.as_deref(), Some("author"));
    assert_eq!(meta.licences[0].to_string(), "CC0-1.0");
    assert_eq!(format!("{:#}", meta.licences[0]), "[CC0-1.0](https://cc0)");
  }

  #[test]
  fn metadata_is_optional() {
    let pkg = Package::from_body(json!({ "id": "p" }), &IdField::default()).unwrap();
    assert_eq!(pkg.meta().unwrap(), PackageMeta::default());
  }

  #[test]
  fn misshapen_metadata_is_malformed() {
    for body in [
      json!({ "id": "p", "licenses": "MIT" }),
      json!({ "id": "p", "licences": [{ "name": "" }] }),
      json!({ "id": "p", "contributors": [{ "email": "a@b" }] }),
    ] {
      assert!(matches!(
        Package::from_body(body, &IdField::default()),
        Err(Error::MalformedDescriptor(_))
      ));
    }
  }

  #[test]
  fn parse_rejects_invalid_json() {
    let err = Package::parse("{ not json", &IdField::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedDescriptor(_)));
  }
}
