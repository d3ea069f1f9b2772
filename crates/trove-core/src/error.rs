//! Error types for `trove-core`.

use std::fmt;

use thiserror::Error;

/// The kind of catalog row an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Tag,
  Thing,
  Collection,
  Membership,
  ThingTag,
  Package,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Tag => "tag",
      Self::Thing => "thing",
      Self::Collection => "collection",
      Self::Membership => "collection membership",
      Self::ThingTag => "thing tag",
      Self::Package => "package",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// The descriptor could not be parsed or lacks a required field.
  #[error("malformed descriptor: {0}")]
  MalformedDescriptor(String),

  /// A row references (or is referenced by) a row that makes the operation
  /// impossible: a missing target on insert, or live dependents on delete.
  #[error("foreign key violation: {entity} {key:?} {detail}")]
  ForeignKeyViolation {
    entity: EntityKind,
    key:    String,
    detail: String,
  },

  /// Two different bodies claim the same package id.
  #[error(
    "package {id:?} already stored with hash {existing}, refusing {incoming}"
  )]
  UniqueConstraintViolation {
    id:       String,
    existing: String,
    incoming: String,
  },

  #[error("{entity} ({left:?}, {right:?}) already exists")]
  DuplicateMembership {
    entity: EntityKind,
    left:   String,
    right:  String,
  },

  #[error("{entity} not found: {key:?}")]
  NotFound { entity: EntityKind, key: String },

  #[error("tag {0:?} is reserved and cannot be deleted")]
  ReservedTag(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn not_found(entity: EntityKind, key: impl Into<String>) -> Self {
    Self::NotFound { entity, key: key.into() }
  }

  pub fn missing_reference(
    entity: EntityKind,
    key: impl Into<String>,
    referrer: impl fmt::Display,
  ) -> Self {
    Self::ForeignKeyViolation {
      entity,
      key: key.into(),
      detail: format!("does not exist (referenced by {referrer})"),
    }
  }

  pub fn still_referenced(
    entity: EntityKind,
    key: impl Into<String>,
    dependents: impl fmt::Display,
  ) -> Self {
    Self::ForeignKeyViolation {
      entity,
      key: key.into(),
      detail: format!("is still referenced by {dependents}"),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
