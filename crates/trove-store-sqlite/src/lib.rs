//! SQLite backend for the Trove catalog.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write, and every ingestion as a
//! whole, is one SQLite transaction on that thread.

mod catalog;
mod encode;
mod ingest;
mod query;
mod schema;
mod store;

pub mod error;
pub mod settings;

pub use error::{Error, Result};
pub use settings::CatalogConfig;
pub use store::{SqliteReader, SqliteStore};

#[cfg(test)]
mod tests;
