//! User identity rows
//!
//! Users are created by the identity service; this module only needs point
//! lookups plus an insert hook for ingestion and tests.

use sqlx::SqlitePool;
use tunelink_common::db::UserId;

use crate::error::Result;

pub async fn user_exists(pool: &SqlitePool, user_id: UserId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Insert a user if absent
pub async fn create_user(pool: &SqlitePool, user_id: UserId, display_name: Option<&str>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (id, display_name) VALUES (?, ?)")
        .bind(user_id)
        .bind(display_name)
        .execute(pool)
        .await?;

    Ok(())
}
