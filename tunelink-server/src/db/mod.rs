//! Database access for tunelink-server
//!
//! Free async functions over the shared SQLite pool, one module per table
//! family. Schema creation lives in `tunelink_common::db::init`.

pub mod matches;
pub mod messages;
pub mod profiles;
pub mod users;

pub use profiles::{ProfileStore, SqliteProfileStore};
