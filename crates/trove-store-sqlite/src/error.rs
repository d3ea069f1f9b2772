//! Error type for `trove-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Catalog(#[from] trove_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored column could not be decoded (timestamp, event kind).
  #[error("decode error: {0}")]
  Decode(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  /// A descriptor failed to ingest; nothing it declared was committed.
  #[error("ingesting package {package:?} failed: {source}")]
  Ingestion {
    package: String,
    #[source]
    source:  Box<Error>,
  },
}

impl Error {
  /// The catalog error behind this one, looking through ingestion context.
  pub fn catalog(&self) -> Option<&trove_core::Error> {
    match self {
      Self::Catalog(e) => Some(e),
      Self::Ingestion { source, .. } => source.catalog(),
      _ => None,
    }
  }

  pub(crate) fn in_package(self, package: &str) -> Self {
    match self {
      already @ Self::Ingestion { .. } => already,
      other => Self::Ingestion {
        package: package.to_owned(),
        source:  Box::new(other),
      },
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
