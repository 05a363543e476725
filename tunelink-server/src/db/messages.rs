//! Message persistence
//!
//! `sent_at` and `read_at` are stored as fixed-width UTC text (see
//! `tunelink_common::time`), so ordering by the column is chronological.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tunelink_common::db::{MatchId, Message, UserId};
use tunelink_common::time::{from_storage, to_storage};

use crate::db::matches::id_list;
use crate::error::Result;

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let sent_at: String = row.get("sent_at");
    let read_at: Option<String> = row.get("read_at");

    Ok(Message {
        id: row.get("id"),
        match_id: row.get("match_id"),
        sender_id: row.get("sender_id"),
        body: row.get("body"),
        sent_at: from_storage(&sent_at)?,
        read_at: read_at.as_deref().map(from_storage).transpose()?,
    })
}

/// Persist a new message and return it with its assigned id
pub async fn insert_message(
    pool: &SqlitePool,
    match_id: MatchId,
    sender_id: UserId,
    body: &str,
    sent_at: DateTime<Utc>,
) -> Result<Message> {
    let result = sqlx::query(
        "INSERT INTO messages (match_id, sender_id, body, sent_at) VALUES (?, ?, ?, ?)",
    )
    .bind(match_id)
    .bind(sender_id)
    .bind(body)
    .bind(to_storage(&sent_at))
    .execute(pool)
    .await?;

    Ok(Message {
        id: result.last_insert_rowid(),
        match_id,
        sender_id,
        body: body.to_string(),
        sent_at,
        read_at: None,
    })
}

/// Stamp `read_at` on the peer's unread messages in a match
///
/// Returns the number of rows updated; zero when everything was already read.
pub async fn mark_read(
    pool: &SqlitePool,
    match_id: MatchId,
    reader_id: UserId,
    read_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET read_at = ?
        WHERE match_id = ? AND sender_id != ? AND read_at IS NULL
        "#,
    )
    .bind(to_storage(&read_at))
    .bind(match_id)
    .bind(reader_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn count_messages(pool: &SqlitePool, match_id: MatchId) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE match_id = ?")
        .bind(match_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One page of a match's history, newest first
pub async fn history_page(
    pool: &SqlitePool,
    match_id: MatchId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        r#"
        SELECT id, match_id, sender_id, body, sent_at, read_at
        FROM messages
        WHERE match_id = ?
        ORDER BY sent_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(match_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_message).collect()
}

/// Most recent message of each listed match; matches without messages are absent
pub async fn latest_messages(
    pool: &SqlitePool,
    match_ids: &[MatchId],
) -> Result<HashMap<MatchId, Message>> {
    if match_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT id, match_id, sender_id, body, sent_at, read_at
        FROM (
            SELECT m.*,
                   ROW_NUMBER() OVER (
                       PARTITION BY match_id ORDER BY sent_at DESC, id DESC
                   ) AS recency
            FROM messages m
            WHERE match_id IN (SELECT value FROM json_each(?))
        )
        WHERE recency = 1
        "#,
    )
    .bind(id_list(match_ids.iter())?)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row_to_message(row).map(|m| (m.match_id, m)))
        .collect()
}
