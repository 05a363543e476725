//! Test helper utilities shared by tunelink-server integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use sqlx::SqlitePool;
use tempfile::TempDir;
use tunelink_common::api::{issue_token, TokenVerifier};
use tunelink_common::db::{init_database, ListeningProfile, MatchId, UserId};
use tunelink_server::config::RealtimeSettings;
use tunelink_server::db::profiles::replace_profile;
use tunelink_server::registry::ConnectionRegistry;
use tunelink_server::{build_router, AppState};

pub const SECRET: &str = "integration-test-secret";

/// Fresh file-backed database; keep the TempDir alive for the test's duration
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("tunelink.db"))
        .await
        .expect("database should initialize");
    (temp_dir, pool)
}

pub async fn create_test_state() -> (TempDir, AppState) {
    create_test_state_with(RealtimeSettings::default()).await
}

pub async fn create_test_state_with(realtime: RealtimeSettings) -> (TempDir, AppState) {
    let (temp_dir, pool) = create_test_db().await;
    let state = AppState::new(pool, TokenVerifier::hs256(SECRET, None), realtime);
    (temp_dir, state)
}

pub fn token_for(user_id: UserId) -> String {
    issue_token(SECRET, user_id, chrono::Duration::minutes(10), None).unwrap()
}

pub fn expired_token_for(user_id: UserId) -> String {
    issue_token(SECRET, user_id, chrono::Duration::minutes(-10), None).unwrap()
}

/// Create a user with the given listening profile
pub async fn seed_profile(pool: &SqlitePool, user_id: UserId, artists: &[i64], tracks: &[i64], genres: &[i64]) {
    let profile = ListeningProfile::new(
        artists.iter().copied(),
        tracks.iter().copied(),
        genres.iter().copied(),
    );
    replace_profile(pool, user_id, &profile).await.unwrap();
}

pub async fn seed_user(pool: &SqlitePool, user_id: UserId) {
    seed_profile(pool, user_id, &[], &[], &[]).await;
}

/// Insert a match row with a fixed id
pub async fn seed_match(pool: &SqlitePool, match_id: MatchId, a: UserId, b: UserId, score: f64) {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    sqlx::query("INSERT INTO matches (id, user_low, user_high, score) VALUES (?, ?, ?, ?)")
        .bind(match_id)
        .bind(low)
        .bind(high)
        .bind(score)
        .execute(pool)
        .await
        .unwrap();
}

/// Serve the router on an ephemeral port
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll until `user_id` has exactly `expected` live channels
pub async fn wait_for_connections(registry: &ConnectionRegistry, user_id: UserId, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.connection_count(user_id) != expected {
        if tokio::time::Instant::now() > deadline {
            panic!(
                "user {} has {} connections, expected {}",
                user_id,
                registry.connection_count(user_id),
                expected
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
