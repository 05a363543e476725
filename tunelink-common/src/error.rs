//! Errors raised by the shared Tunelink layer
//!
//! Only failures this crate can produce itself live here. Request-level
//! outcomes (not found, forbidden, bad input) belong to the service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Opening the pool or applying the schema failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder, database folder or config file could not be accessed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file did not parse
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored timestamp is not in the storage format
    #[error("Invalid stored timestamp {text:?}: {reason}")]
    InvalidTimestamp { text: String, reason: String },
}
