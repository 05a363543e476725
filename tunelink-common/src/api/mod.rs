//! API module for shared HTTP/realtime functionality
//!
//! Contains only pure functions and shared types. The service crate wraps
//! them with framework-specific extractors (Axum, etc.).

pub mod auth;

pub use auth::{issue_token, parse_bearer, ApiAuthError, Claims, TokenVerifier};
