//! HTTP and realtime endpoints

pub mod auth;
pub mod conversations;
pub mod health;
pub mod history;
pub mod matches;
pub mod ws;

pub use auth::AuthUser;
pub use conversations::list_conversations;
pub use health::health_routes;
pub use history::message_history;
pub use matches::{list_matches, recompute_matches};
pub use ws::ws_handler;
