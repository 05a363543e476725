//! Match edge repository
//!
//! Each undirected edge is one row keyed by its canonical `(user_low,
//! user_high)` pair, so "edges touching user u" is a single predicate on
//! either column.
//!
//! A recompute goes through [`replace_edges_for_user`], which swaps a user's
//! whole edge set inside one transaction. Pairs that survive keep their row
//! (and therefore their match id and message history); only their score is
//! refreshed.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tunelink_common::db::{Match, MatchEdge, MatchId, UserId};

use crate::error::{Error, Result};

fn row_to_match(row: &SqliteRow) -> Match {
    Match {
        id: row.get("id"),
        user_low: row.get("user_low"),
        user_high: row.get("user_high"),
        score: row.get("score"),
    }
}

/// Delete every edge touching `user_id`, returning the number removed
pub async fn delete_edges_for_user(conn: &mut SqliteConnection, user_id: UserId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM matches WHERE user_low = ? OR user_high = ?")
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Upsert edges by canonical pair
pub async fn insert_edges(conn: &mut SqliteConnection, edges: &[MatchEdge]) -> Result<()> {
    for edge in edges {
        sqlx::query(
            r#"
            INSERT INTO matches (user_low, user_high, score, created_at, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(user_low, user_high) DO UPDATE SET
                score = excluded.score,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(edge.user_low)
        .bind(edge.user_high)
        .bind(edge.score)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Atomically make `edges` the complete edge set of `user_id`
///
/// Other sessions see either the old set or the new one, never an empty or
/// mixed window. Every edge must involve `user_id`.
pub async fn replace_edges_for_user(
    pool: &SqlitePool,
    user_id: UserId,
    edges: &[MatchEdge],
) -> Result<()> {
    let mut peers = BTreeSet::new();
    for edge in edges {
        match edge.peer_of(user_id) {
            Some(peer) if peer != user_id => {
                peers.insert(peer);
            }
            _ => {
                return Err(Error::Validation(format!(
                    "edge ({}, {}) does not connect user {} to a peer",
                    edge.user_low, edge.user_high, user_id
                )))
            }
        }
    }

    // Statements here all write, so the transaction takes the write lock on
    // its first statement and never has to upgrade from a read snapshot.
    let mut tx = pool.begin().await?;

    if peers.is_empty() {
        delete_edges_for_user(&mut *tx, user_id).await?;
    } else {
        // One JSON array parameter keeps the statement under SQLite's bound
        // variable limit however many peers there are
        let keep = id_list(peers.iter())?;
        sqlx::query(
            r#"
            DELETE FROM matches
            WHERE (user_low = ? AND user_high NOT IN (SELECT value FROM json_each(?)))
               OR (user_high = ? AND user_low NOT IN (SELECT value FROM json_each(?)))
            "#,
        )
        .bind(user_id)
        .bind(keep.as_str())
        .bind(user_id)
        .bind(keep.as_str())
        .execute(&mut *tx)
        .await?;

        insert_edges(&mut *tx, edges).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Render ids as a JSON array for `json_each`
pub(crate) fn id_list<'a>(ids: impl Iterator<Item = &'a i64>) -> Result<String> {
    serde_json::to_string(&ids.collect::<Vec<_>>())
        .map_err(|e| Error::Internal(format!("failed to encode id list: {}", e)))
}

/// All edges touching `user_id`, best score first, ties by ascending peer id
pub async fn list_edges_for_user(pool: &SqlitePool, user_id: UserId) -> Result<Vec<Match>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_low, user_high, score
        FROM matches
        WHERE user_low = ? OR user_high = ?
        ORDER BY score DESC,
                 CASE WHEN user_low = ? THEN user_high ELSE user_low END ASC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_match).collect())
}

pub async fn get_match(pool: &SqlitePool, match_id: MatchId) -> Result<Option<Match>> {
    let row = sqlx::query("SELECT id, user_low, user_high, score FROM matches WHERE id = ?")
        .bind(match_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(row_to_match))
}
