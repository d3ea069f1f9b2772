//! Catalog configuration.
//!
//! Loaded from an optional TOML file layered under `TROVE_*` environment
//! variables, e.g. `TROVE_STORE_PATH=catalog.db`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use trove_core::identity::IdField;

use crate::{Error, Result, ingest::Policy};

/// The special store path that selects an in-memory database.
pub const MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// SQLite file, or [`MEMORY`].
  pub store_path:    PathBuf,
  /// JSON pointer to the package id inside a descriptor body.
  pub id_pointer:    String,
  /// Whether re-ingesting a known id with a different body updates it.
  /// When `false` such a descriptor fails as a unique-constraint violation.
  pub allow_updates: bool,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      store_path:    PathBuf::from(MEMORY),
      id_pointer:    IdField::default().as_str().to_owned(),
      allow_updates: true,
    }
  }
}

impl CatalogConfig {
  /// Read `path` (if it exists) and then the environment.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("TROVE"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn is_in_memory(&self) -> bool { self.store_path.as_os_str() == MEMORY }

  pub(crate) fn policy(&self) -> Result<Policy> {
    let id_field = IdField::new(&self.id_pointer).map_err(Error::Catalog)?;
    Ok(Policy { id_field, allow_updates: self.allow_updates })
  }
}
