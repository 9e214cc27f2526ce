//! Genome Store - keyed record persistence for the Agent Genome Watcher.
//!
//! Every pipeline component persists through the same narrow contract:
//! get-by-key, put-by-key (idempotent overwrite), and ordered prefix scans,
//! partitioned into a small fixed set of collections.
//!
//! ```text
//! posts ─────┐
//! analyses ──┤
//! events ────┼── Store ──┬── SqliteStore (durable, WAL)
//! questions ─┤           └── MemoryStore (tests, dry runs)
//! agents ────┘
//! ```
//!
//! The `analyses` collection doubles as the analyze-once cache. Nothing in
//! this crate evicts records.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Collection, Record, Store, StoreExt};
