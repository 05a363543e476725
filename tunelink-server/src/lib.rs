//! tunelink-server library interface
//!
//! Compatibility matching plus realtime chat between matched users. Exposed
//! as a library so integration tests can build the router and drive it
//! directly.

pub mod api;
pub mod config;
pub mod conversations;
pub mod db;
pub mod error;
pub mod matching;
pub mod pagination;
pub mod registry;
pub mod router;
pub mod session;

pub use crate::error::{Error, Result};

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tunelink_common::api::TokenVerifier;
use tunelink_common::time::MonotonicClock;

use crate::config::RealtimeSettings;
use crate::db::{ProfileStore, SqliteProfileStore};
use crate::matching::MatchingEngine;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Application state shared across handlers and realtime sessions
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Identity token verification
    pub verifier: TokenVerifier,
    /// Live realtime channels, one registry per process
    pub registry: Arc<ConnectionRegistry>,
    pub router: MessageRouter,
    pub engine: Arc<MatchingEngine>,
    pub realtime: RealtimeSettings,
}

impl AppState {
    /// State backed entirely by the service database
    pub fn new(db: SqlitePool, verifier: TokenVerifier, realtime: RealtimeSettings) -> Self {
        let profiles = Arc::new(SqliteProfileStore::new(db.clone()));
        Self::with_profile_store(db, verifier, realtime, profiles)
    }

    /// State with a caller-supplied profile source for the matching engine
    pub fn with_profile_store(
        db: SqlitePool,
        verifier: TokenVerifier,
        realtime: RealtimeSettings,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::new(db.clone(), Arc::clone(&registry), Arc::new(MonotonicClock::new()));
        let engine = Arc::new(MatchingEngine::new(db.clone(), profiles));

        Self {
            db,
            verifier,
            registry,
            router,
            engine,
            realtime,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/api/matches", get(api::list_matches))
        .route("/api/matches/recompute", post(api::recompute_matches))
        .route("/api/matches/:match_id/messages", get(api::message_history))
        .route("/api/conversations", get(api::list_conversations))
        .route("/ws", get(api::ws_handler))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
