//! # Context Splice
//!
//! The reusable core of an AI coding assistant: making model suggestions
//! safe to apply, and making retrieval context cheap to build.
//!
//! ## Architecture
//!
//! ```text
//!  model response ──▶ extract ──▶ reconcile ──▶ minimal edit
//!
//!  ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//!  │ FsCorpus    │──▶│ NearestFileIndex │◀─▶│  SQLite  │
//!  │ walk+globs  │   │ hash → embed →   │   │ kv cache │
//!  └─────────────┘   │ rank → context   │   └──────────┘
//!                    └────────┬─────────┘
//!                             ▼
//!                      OpenAI / Ollama
//! ```
//!
//! The algorithms live in `context-splice-core`; this crate supplies the
//! collaborators (configuration, SQLite store, filesystem corpus, HTTP
//! embedding providers) and the `splice` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! splice init
//! splice reconcile --document src/lib.rs --candidate answer.md --start 41
//! splice nearest "where are retries configured?" --list
//! splice cache stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus_fs`] | Filesystem corpus |
//! | [`providers`] | Embedding provider implementations |
//! | [`sqlite_store`] | SQLite key-value store |
//! | [`reconcile_cmd`] | `splice reconcile` |
//! | [`nearest_cmd`] | `splice nearest`, `splice cache` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod corpus_fs;
pub mod db;
pub mod migrate;
pub mod nearest_cmd;
pub mod providers;
pub mod reconcile_cmd;
pub mod sqlite_store;
