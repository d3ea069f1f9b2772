//! The descriptor format, i.e. what a package body declares.
//!
//! ```json
//! {
//!   "id": "awesome-rust",
//!   "tags": [{ "id": "tools", "name": "Tools" }],
//!   "things": [{
//!     "url": "https://example.org", "name": "Example",
//!     "category": "tools", "tags": ["cli"], "collections": ["favourites"]
//!   }]
//! }
//! ```
//!
//! Every field other than the package id is optional. A thing without a
//! `category` is filed under [`MISCELLANEOUS`]. Package-level metadata
//! (title, licences, contributors) is read into [`PackageMeta`]; other
//! unknown fields are ignored.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::{
  Error, Result,
  entity::{MISCELLANEOUS, Tag, Thing, non_empty, validate_tag_id},
  package::PackageMeta,
};

/// A thing together with the links it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredThing {
  pub thing:       Thing,
  /// Secondary tags, in declaration order, without duplicates.
  pub tags:        Vec<String>,
  /// Ids of collections the thing joins. They must already exist.
  pub collections: Vec<String>,
}

/// The normalised content of a package body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
  pub meta:   PackageMeta,
  /// Tags declared with metadata at the package level.
  pub tags:   Vec<Tag>,
  pub things: Vec<DeclaredThing>,
}

#[derive(Deserialize)]
struct RawDescriptor {
  #[serde(default)]
  tags:   Vec<RawTag>,
  #[serde(default)]
  things: Vec<RawThing>,
}

#[derive(Deserialize)]
struct RawTag {
  id:      String,
  name:    Option<String>,
  summary: Option<String>,
}

#[derive(Deserialize)]
struct RawThing {
  url:         Option<String>,
  name:        Option<String>,
  summary:     Option<String>,
  category:    Option<String>,
  #[serde(default)]
  tags:        Vec<String>,
  #[serde(default)]
  collections: Vec<String>,
}

impl Descriptor {
  pub fn from_body(body: &Value) -> Result<Self> {
    if !body.is_object() {
      return Err(Error::MalformedDescriptor(
        "package body must be a JSON object".to_owned(),
      ));
    }
    let raw = RawDescriptor::deserialize(body)
      .map_err(|e| Error::MalformedDescriptor(e.to_string()))?;

    let tags = raw
      .tags
      .into_iter()
      .map(|t| {
        let id = t.id.trim().to_owned();
        validate_tag_id(&id)?;
        Ok(Tag {
          id,
          name: non_empty(t.name),
          summary: non_empty(t.summary),
          icon: None,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut things = Vec::with_capacity(raw.things.len());
    for (i, t) in raw.things.into_iter().enumerate() {
      let declared = t.normalise(i)?;
      if !seen.insert(declared.thing.url.clone()) {
        return Err(Error::MalformedDescriptor(format!(
          "thing {:?} is declared more than once",
          declared.thing.url
        )));
      }
      things.push(declared);
    }

    Ok(Self { meta: PackageMeta::from_body(body)?, tags, things })
  }

  /// Every tag id the descriptor mentions, categories included.
  pub fn tag_ids(&self) -> impl Iterator<Item = &str> {
    self.tags.iter().map(|t| t.id.as_str()).chain(self.things.iter().flat_map(
      |d| {
        std::iter::once(d.thing.category_id.as_str())
          .chain(d.tags.iter().map(String::as_str))
      },
    ))
  }
}

impl RawThing {
  fn normalise(self, index: usize) -> Result<DeclaredThing> {
    let url = non_empty(self.url).ok_or_else(|| {
      Error::MalformedDescriptor(format!("things[{index}]: `url` is required"))
    })?;
    let name = non_empty(self.name).ok_or_else(|| {
      Error::MalformedDescriptor(format!("thing {url:?}: `name` is required"))
    })?;
    let category_id =
      non_empty(self.category).unwrap_or_else(|| MISCELLANEOUS.to_owned());
    validate_tag_id(&category_id)?;

    let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
    for tag in self.tags {
      let tag = tag.trim().to_owned();
      validate_tag_id(&tag)?;
      if !tags.contains(&tag) {
        tags.push(tag);
      }
    }

    let mut collections: Vec<String> = Vec::with_capacity(self.collections.len());
    for collection in self.collections.into_iter().filter_map(|c| non_empty(Some(c))) {
      if !collections.contains(&collection) {
        collections.push(collection);
      }
    }

    Ok(DeclaredThing {
      thing: Thing {
        url,
        name,
        summary: non_empty(self.summary),
        category_id,
      },
      tags,
      collections,
    })
  }
}
