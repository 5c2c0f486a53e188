//! Database module: row mappers and the SQLite content store.
//!
//! This module is split into two submodules:
//! - `model`: row mappers and stored document shapes.
//! - `repo`: the pool helpers and `SqliteStore`, which implements the
//!   storage traits from [`crate::store`].
//!
//! External modules should import from `content_stager::db`.

pub mod model;
pub mod repo;

pub use repo::*;
