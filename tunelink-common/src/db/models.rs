//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque stable user identity, the join key across all entities
pub type UserId = i64;

/// Match session id (row id of the persisted edge)
pub type MatchId = i64;

/// Server-assigned message id
pub type MessageId = i64;

/// Per-user listening data: three deduplicated id sets
///
/// Replaced wholesale on every external sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningProfile {
    pub artists: BTreeSet<i64>,
    pub tracks: BTreeSet<i64>,
    pub genres: BTreeSet<i64>,
}

impl ListeningProfile {
    pub fn new(
        artists: impl IntoIterator<Item = i64>,
        tracks: impl IntoIterator<Item = i64>,
        genres: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            artists: artists.into_iter().collect(),
            tracks: tracks.into_iter().collect(),
            genres: genres.into_iter().collect(),
        }
    }
}

/// Canonical ordering of an unordered user pair
pub fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Undirected compatibility edge, always stored as `(min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchEdge {
    pub user_low: UserId,
    pub user_high: UserId,
    pub score: f64,
}

impl MatchEdge {
    pub fn new(a: UserId, b: UserId, score: f64) -> Self {
        debug_assert_ne!(a, b, "a user cannot be matched with themselves");
        let (user_low, user_high) = canonical_pair(a, b);
        Self {
            user_low,
            user_high,
            score,
        }
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    /// The other endpoint, or `None` if `user_id` is not on this edge
    pub fn peer_of(&self, user_id: UserId) -> Option<UserId> {
        if self.user_low == user_id {
            Some(self.user_high)
        } else if self.user_high == user_id {
            Some(self.user_low)
        } else {
            None
        }
    }
}

/// Persisted match edge with its session id
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub user_low: UserId,
    pub user_high: UserId,
    pub score: f64,
}

impl Match {
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        self.edge().peer_of(user_id)
    }

    pub fn edge(&self) -> MatchEdge {
        MatchEdge {
            user_low: self.user_low,
            user_high: self.user_high,
            score: self.score,
        }
    }
}

/// Chat message inside a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}
