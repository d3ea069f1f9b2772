//! Catalog entities: tags, things and collections.
//!
//! A thing is identified by its URL and carries exactly one primary category
//! (a tag) plus any number of secondary tags. Collections group things. The
//! many-to-many links between them live in the store, never on the entities.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The fallback classifier every store is seeded with.
pub const MISCELLANEOUS: &str = "miscellaneous";

// ─── Tag ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub id:      String,
  /// Display label; renderers fall back to `id`.
  pub name:    Option<String>,
  pub summary: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon:    Option<Vec<u8>>,
}

impl Tag {
  /// A bare tag with no label, summary or icon.
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), name: None, summary: None, icon: None }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
    self.summary = Some(summary.into());
    self
  }

  pub fn with_icon(mut self, icon: Vec<u8>) -> Self {
    self.icon = Some(icon);
    self
  }

  /// The seeded fallback tag.
  pub fn miscellaneous() -> Self {
    Self::new(MISCELLANEOUS)
      .with_name("Miscellaneous")
      .with_summary("Things that do not fit any other category.")
  }

  /// The label to show for this tag.
  pub fn label(&self) -> &str { self.name.as_deref().unwrap_or(&self.id) }
}

/// Check that `id` is a valid tag name: non-empty, made of lowercase ASCII
/// letters, digits, `.`, `_`, `-` and `/`.
pub fn validate_tag_id(id: &str) -> Result<()> {
  let valid = !id.is_empty()
    && id.chars().all(|c| {
      matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-' | '/')
    });
  if valid {
    Ok(())
  } else {
    Err(Error::MalformedDescriptor(format!(
      "tag id {id:?} must only contain lowercase letters, digits, `.`, `_`, \
       `-` and `/`"
    )))
  }
}

// ─── Thing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thing {
  /// Location of the resource; doubles as its identity.
  pub url:         String,
  pub name:        String,
  pub summary:     Option<String>,
  pub category_id: String,
}

impl Thing {
  pub fn new(
    url: impl Into<String>,
    name: impl Into<String>,
    category_id: impl Into<String>,
  ) -> Self {
    Self {
      url:         url.into(),
      name:        name.into(),
      summary:     None,
      category_id: category_id.into(),
    }
  }

  pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
    self.summary = Some(summary.into());
    self
  }
}

// ─── Collection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
  pub id:      String,
  /// Where the curated list originally lives, if anywhere.
  pub url:     Option<String>,
  pub summary: String,
}

impl Collection {
  pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
    Self { id: id.into(), url: None, summary: summary.into() }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }
}

/// Trim `value`, mapping empty or whitespace-only strings to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}
