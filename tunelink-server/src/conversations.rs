//! Conversation index
//!
//! Read model joining a user's match edges with the newest message of each
//! match.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tunelink_common::db::{MatchId, Message, MessageId, UserId};
use tunelink_common::time::serde_utc;

use crate::db::{matches, messages};
use crate::error::Result;

/// Newest message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePreview {
    pub message_id: MessageId,
    pub message_text: String,
    #[serde(with = "serde_utc")]
    pub sent_at: DateTime<Utc>,
    /// Whether the requesting user sent it
    pub sent_by_me: bool,
}

impl MessagePreview {
    fn for_viewer(message: Message, viewer: UserId) -> Self {
        Self {
            message_id: message.id,
            sent_by_me: message.sender_id == viewer,
            message_text: message.body,
            sent_at: message.sent_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub match_id: MatchId,
    pub other_participant: UserId,
    pub score: f64,
    pub last_message: Option<MessagePreview>,
}

/// One entry per match of `user_id`
///
/// Conversations with messages come first, most recent activity first; the
/// rest follow in match ranking order.
pub async fn list_conversations(pool: &SqlitePool, user_id: UserId) -> Result<Vec<Conversation>> {
    let edges = matches::list_edges_for_user(pool, user_id).await?;

    let mut seen = HashSet::new();
    let edges: Vec<_> = edges.into_iter().filter(|m| seen.insert(m.id)).collect();

    let ids: Vec<MatchId> = edges.iter().map(|m| m.id).collect();
    let mut latest = messages::latest_messages(pool, &ids).await?;

    let mut conversations: Vec<Conversation> = edges
        .into_iter()
        .filter_map(|m| {
            let other_participant = m.other_participant(user_id)?;
            Some(Conversation {
                match_id: m.id,
                other_participant,
                score: m.score,
                last_message: latest
                    .remove(&m.id)
                    .map(|message| MessagePreview::for_viewer(message, user_id)),
            })
        })
        .collect();

    // Stable sort keeps ranking order among equal keys
    conversations.sort_by(|a, b| {
        let a_at = a.last_message.as_ref().map(|p| p.sent_at);
        let b_at = b.last_message.as_ref().map(|p| p.sent_at);
        b_at.cmp(&a_at)
    });

    Ok(conversations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tunelink_common::db::init::create_schema;
    use tunelink_common::time::MonotonicClock;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (id) VALUES (1), (2), (3), (4)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO matches (id, user_low, user_high, score) VALUES (10, 1, 2, 80.0), (11, 1, 3, 50.0), (12, 1, 4, 30.0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_previews_and_ordering() {
        let pool = setup_test_db().await;
        let clock = MonotonicClock::new();

        messages::insert_message(&pool, 11, 3, "hey", clock.now()).await.unwrap();
        messages::insert_message(&pool, 12, 1, "first", clock.now()).await.unwrap();
        messages::insert_message(&pool, 11, 1, "hey back", clock.now()).await.unwrap();

        let conversations = list_conversations(&pool, 1).await.unwrap();
        let order: Vec<MatchId> = conversations.iter().map(|c| c.match_id).collect();
        assert_eq!(order, vec![11, 12, 10]);

        let latest = conversations[0].last_message.as_ref().unwrap();
        assert_eq!(latest.message_text, "hey back");
        assert!(latest.sent_by_me);
        assert_eq!(conversations[0].other_participant, 3);

        assert!(conversations[2].last_message.is_none());
    }

    #[tokio::test]
    async fn test_peer_view_flags_sender() {
        let pool = setup_test_db().await;
        messages::insert_message(&pool, 10, 1, "hi", Utc::now()).await.unwrap();

        let conversations = list_conversations(&pool, 2).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].other_participant, 1);
        assert!(!conversations[0].last_message.as_ref().unwrap().sent_by_me);
    }

    #[tokio::test]
    async fn test_user_without_matches() {
        let pool = setup_test_db().await;
        assert!(list_conversations(&pool, 99).await.unwrap().is_empty());
    }
}
