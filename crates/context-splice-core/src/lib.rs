//! # Context Splice Core
//!
//! Shared, WASM-safe logic for Context Splice: suggestion reconciliation,
//! code-block extraction, content hashing, the embedding cache, and the
//! nearest-file retrieval pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Embedding providers, persistent stores and
//! file enumeration are injected through the traits in [`embedding`],
//! [`store`] and [`corpus`].

pub mod cache;
pub mod corpus;
pub mod embedding;
pub mod extract;
pub mod hash;
pub mod nearest;
pub mod reconcile;
pub mod store;

pub use reconcile::{reconcile, reconcile_detailed, Reconciliation};
