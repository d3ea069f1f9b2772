//! Core types and trait definitions for the Trove catalog.
//!
//! This crate holds the catalog's entity model, the descriptor format that
//! packages arrive in, and the content-addressing helpers. It has no database
//! dependency; storage backends (e.g. `trove-store-sqlite`) implement the
//! traits in [`store`].

// Native `async fn` in traits; the store traits spell out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod descriptor;
pub mod entity;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod package;
pub mod store;

pub use error::{Error, Result};
