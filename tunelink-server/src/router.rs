//! Message router
//!
//! Applies decoded client events on behalf of a bound user: checks match
//! membership, persists, then fans out through the connection registry.
//! Registry locks are never held while the database is touched.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use tunelink_common::db::{Match, MatchId, UserId};
use tunelink_common::events::{ClientEvent, MessagePayload, ReadReceipt, ServerEvent};
use tunelink_common::time::MonotonicClock;

use crate::db::{matches, messages};
use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;

/// Longest accepted message body, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// What a successfully handled event produced
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Sent(MessagePayload),
    /// Number of messages newly marked read
    Read(u64),
}

#[derive(Clone)]
pub struct MessageRouter {
    pool: SqlitePool,
    registry: Arc<ConnectionRegistry>,
    clock: Arc<MonotonicClock>,
}

impl MessageRouter {
    pub fn new(pool: SqlitePool, registry: Arc<ConnectionRegistry>, clock: Arc<MonotonicClock>) -> Self {
        Self {
            pool,
            registry,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn handle(&self, user_id: UserId, event: ClientEvent) -> Result<Handled> {
        match event {
            ClientEvent::Message {
                match_id,
                message_text,
            } => self
                .send_message(user_id, match_id, &message_text)
                .await
                .map(Handled::Sent),
            ClientEvent::Read { match_id } => {
                self.mark_read(user_id, match_id).await.map(Handled::Read)
            }
        }
    }

    /// Persist a message and deliver it to both participants
    ///
    /// The sender's own channels receive it too, so every device shows the
    /// same history with the same id. Membership is checked before the text,
    /// so a non-participant always gets `Forbidden`.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        match_id: MatchId,
        text: &str,
    ) -> Result<MessagePayload> {
        let session = self.authorize(sender_id, match_id).await?;
        validate_text(text)?;

        let message =
            messages::insert_message(&self.pool, match_id, sender_id, text, self.clock.now()).await?;
        let payload = MessagePayload::from(message);

        let event = ServerEvent::Message(payload.clone());
        for participant in [session.user_low, session.user_high] {
            let delivered = self.registry.broadcast(participant, &event);
            debug!(
                match_id,
                message_id = payload.message_id,
                participant,
                delivered,
                "Message fan-out"
            );
        }

        Ok(payload)
    }

    /// Mark the peer's messages read and tell the peer
    ///
    /// Repeating the call is a no-op that still succeeds; no receipt is sent
    /// when nothing changed.
    pub async fn mark_read(&self, reader_id: UserId, match_id: MatchId) -> Result<u64> {
        let session = self.authorize(reader_id, match_id).await?;

        let read_at = self.clock.now();
        let updated = messages::mark_read(&self.pool, match_id, reader_id, read_at).await?;

        if updated > 0 {
            if let Some(peer) = session.other_participant(reader_id) {
                let receipt = ServerEvent::ReadReceipt(ReadReceipt {
                    match_id,
                    reader_id,
                    read_at,
                });
                self.registry.broadcast(peer, &receipt);
            }
        }

        Ok(updated)
    }

    async fn authorize(&self, user_id: UserId, match_id: MatchId) -> Result<Match> {
        let session = matches::get_match(&self.pool, match_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("match {} does not exist", match_id)))?;

        if !session.is_participant(user_id) {
            return Err(Error::Forbidden(format!(
                "user {} is not a participant of match {}",
                user_id, match_id
            )));
        }

        Ok(session)
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation("message_text must not be blank".to_string()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(Error::Validation(format!(
            "message_text exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}
