//! SQLite backend for the Canvass record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Every multi-row atomic unit of
//! the [`canvass_core::store::PersonStore`] contract runs inside one SQLite
//! transaction; the uniqueness invariants are partial unique indexes.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
