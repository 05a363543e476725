//! # Tunelink Common Library
//!
//! Shared code for the Tunelink services including:
//! - Database models and schema initialization
//! - Realtime wire types (inbound client events, outbound payloads)
//! - Identity token verification
//! - Configuration loading
//! - Timestamp utilities

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
