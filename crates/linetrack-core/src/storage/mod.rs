//! # Storage Module
//!
//! Disk-backed cycle storage.
//!
//! `RedbStore` implements [`CycleStore`](crate::store::CycleStore) on top of
//! the redb embedded database, so cycle logs survive between runs and a
//! `report` invocation can analyze what an earlier `run` recorded.

mod redb_store;

pub use redb_store::RedbStore;
