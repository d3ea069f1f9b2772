//! Ingestion results.

use serde::Serialize;

use crate::identity::ContentHash;

/// What ingesting one descriptor did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
  /// A new package id; its rows were derived.
  Created,
  /// A known id with a new body; its rows were re-derived.
  Updated,
  /// A known id and hash; nothing was written.
  Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
  pub package_id: String,
  pub hash:       ContentHash,
  pub status:     IngestStatus,
  /// Number of things the descriptor declares.
  pub things:     usize,
}

/// The result for one descriptor of a batch.
#[derive(Debug)]
pub struct BatchEntry<E> {
  /// Position of the descriptor in the submitted batch.
  pub index:      usize,
  /// `None` when the id could not be extracted from the body.
  pub package_id: Option<String>,
  pub result:     Result<IngestOutcome, E>,
}

/// Per-descriptor results of a batch ingestion. A failing descriptor never
/// prevents the others from being ingested.
#[derive(Debug)]
pub struct BatchReport<E> {
  pub entries: Vec<BatchEntry<E>>,
}

impl<E> BatchReport<E> {
  pub fn succeeded(&self) -> impl Iterator<Item = &IngestOutcome> {
    self.entries.iter().filter_map(|e| e.result.as_ref().ok())
  }

  pub fn failed(&self) -> impl Iterator<Item = &BatchEntry<E>> {
    self.entries.iter().filter(|e| e.result.is_err())
  }

  pub fn is_success(&self) -> bool { self.entries.iter().all(|e| e.result.is_ok()) }
}
