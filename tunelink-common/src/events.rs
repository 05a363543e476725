//! Realtime wire types
//!
//! Inbound frames are decoded once at the channel boundary into the closed
//! [`ClientEvent`] set. Outbound frames are [`ServerEvent`] values; a message
//! delivery is sent as the bare payload, every other event carries a `type`
//! tag.

use crate::db::{MatchId, Message, MessageId, UserId};
use crate::time::{serde_utc, serde_utc_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Events a client may send on a bound channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// `{type:"message", match_id, message_text}`
    Message {
        match_id: MatchId,
        message_text: String,
    },
    /// `{type:"read", match_id}`
    Read { match_id: MatchId },
}

impl ClientEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            ClientEvent::Message { match_id, .. } | ClientEvent::Read { match_id } => *match_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Message { .. } => "message",
            ClientEvent::Read { .. } => "read",
        }
    }
}

/// Message delivery payload, identical for every recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub message_text: String,
    #[serde(with = "serde_utc")]
    pub sent_at: DateTime<Utc>,
    #[serde(with = "serde_utc_opt")]
    pub read_at: Option<DateTime<Utc>>,
}

impl From<Message> for MessagePayload {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.id,
            match_id: message.match_id,
            sender_id: message.sender_id,
            message_text: message.body,
            sent_at: message.sent_at,
            read_at: message.read_at,
        }
    }
}

/// Tells the sender's peer that their messages in a match were read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub match_id: MatchId,
    pub reader_id: UserId,
    #[serde(with = "serde_utc")]
    pub read_at: DateTime<Utc>,
}

/// Rejection of a single inbound event; the channel stays open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
}

/// Events pushed to clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(MessagePayload),
    ReadReceipt(ReadReceipt),
    Error(ErrorNotice),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged<'a> {
    ReadReceipt(&'a ReadReceipt),
    Error(&'a ErrorNotice),
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ServerEvent::Message(payload) => payload.serialize(serializer),
            ServerEvent::ReadReceipt(receipt) => Tagged::ReadReceipt(receipt).serialize(serializer),
            ServerEvent::Error(notice) => Tagged::Error(notice).serialize(serializer),
        }
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_time() -> DateTime<Utc> {
        crate::time::from_storage("2026-10-18T12:00:00.000001Z").unwrap()
    }

    #[test]
    fn test_decode_message_event() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"message","match_id":7,"message_text":"hi"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::Message {
                match_id: 7,
                message_text: "hi".to_string()
            }
        );
        assert_eq!(event.match_id(), 7);
        assert_eq!(event.kind(), "message");
    }

    #[test]
    fn test_decode_read_event() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"read","match_id":3}"#).unwrap();
        assert_eq!(event, ClientEvent::Read { match_id: 3 });
    }

    #[test]
    fn test_unknown_or_incomplete_events_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"typing","match_id":3}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"message","match_id":3}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"match_id":3}"#).is_err());
        assert!(
            serde_json::from_str::<ClientEvent>(r#"{"type":"read","match_id":"seven"}"#).is_err()
        );
    }

    #[test]
    fn test_message_payload_has_no_type_tag() {
        let event = ServerEvent::Message(MessagePayload {
            message_id: 11,
            match_id: 7,
            sender_id: 42,
            message_text: "hello".to_string(),
            sent_at: sample_time(),
            read_at: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "message_id": 11,
                "match_id": 7,
                "sender_id": 42,
                "message_text": "hello",
                "sent_at": "2026-10-18T12:00:00.000001Z",
                "read_at": null,
            })
        );
    }

    #[test]
    fn test_read_receipt_is_tagged() {
        let event = ServerEvent::ReadReceipt(ReadReceipt {
            match_id: 7,
            reader_id: 43,
            read_at: sample_time(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "read_receipt",
                "match_id": 7,
                "reader_id": 43,
                "read_at": "2026-10-18T12:00:00.000001Z",
            })
        );
    }

    #[test]
    fn test_error_notice_is_tagged() {
        let event = ServerEvent::Error(ErrorNotice {
            code: "forbidden".to_string(),
            message: "not a participant".to_string(),
            match_id: Some(9),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "forbidden");
        assert_eq!(value["match_id"], 9);
    }
}
