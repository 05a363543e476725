//! Matching engine
//!
//! A recompute scores one user against every other known user and replaces
//! that user's persisted edge set wholesale. Recomputes for different users
//! run concurrently; recomputes for the same user queue behind each other.

pub mod score;

use serde::Serialize;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use tunelink_common::db::{Match, MatchEdge, UserId};

use crate::db::matches;
use crate::db::ProfileStore;
use crate::error::{Error, Result};

pub use score::{compatibility_score, MATCH_THRESHOLD};

/// A peer with its score, as presented to the requester
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedPeer {
    pub peer_id: UserId,
    pub score: f64,
}

/// Result of one recompute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeOutcome {
    /// Persisted edges, best first, ties by ascending peer id
    pub matches: Vec<RankedPeer>,
    /// Peers whose profile could not be read this round
    pub skipped_peers: Vec<UserId>,
}

/// Score descending, then peer id ascending
pub fn rank_peers(peers: &mut [RankedPeer]) {
    peers.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.peer_id.cmp(&b.peer_id))
    });
}

type Slots = Arc<Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>>;

/// At most one in-flight recompute per user
///
/// Entries are created on demand and removed when the last holder or waiter
/// for a user lets go, including a waiter whose request was cancelled while
/// queued.
#[derive(Default)]
pub struct RecomputeGate {
    slots: Slots,
}

impl RecomputeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive recompute rights for `user_id`
    pub async fn acquire(&self, user_id: UserId) -> RecomputePermit {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(user_id).or_default().clone()
        };
        // Declared before the lock future so it drops after it, on success
        // and on cancellation alike
        let release = SlotRelease {
            slots: Arc::clone(&self.slots),
            user_id,
        };

        let guard = slot.lock_owned().await;
        RecomputePermit {
            _guard: guard,
            _release: release,
        }
    }

    /// Users with a recompute running or queued
    pub fn active_users(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive recompute rights for one user
///
/// Field order matters: the mutex guard gives up its slot reference before
/// the release check runs.
pub struct RecomputePermit {
    _guard: OwnedMutexGuard<()>,
    _release: SlotRelease,
}

/// Drops a user's slot once the map holds the only reference
struct SlotRelease {
    slots: Slots,
    user_id: UserId,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&self.user_id) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.user_id);
            }
        }
    }
}

/// Computes and persists match edges
pub struct MatchingEngine {
    pool: SqlitePool,
    profiles: Arc<dyn ProfileStore>,
    gate: RecomputeGate,
}

impl MatchingEngine {
    pub fn new(pool: SqlitePool, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            pool,
            profiles,
            gate: RecomputeGate::new(),
        }
    }

    pub fn gate(&self) -> &RecomputeGate {
        &self.gate
    }

    /// Regenerate every edge touching `user_id`
    ///
    /// Fails with `NotFound` if the requester has no profile. A peer whose
    /// profile cannot be read is left out of this round and reported in
    /// `skipped_peers`.
    pub async fn recompute_for_user(&self, user_id: UserId) -> Result<RecomputeOutcome> {
        let _permit = self.gate.acquire(user_id).await;

        let requester = self
            .profiles
            .load_profile(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {} has no listening profile", user_id)))?;

        let candidates = self.profiles.known_users().await?;

        let mut edges = Vec::new();
        let mut skipped_peers = Vec::new();

        for peer_id in candidates.into_iter().filter(|id| *id != user_id) {
            let peer = match self.profiles.load_profile(peer_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    debug!(user_id, peer_id, "Peer vanished during recompute");
                    continue;
                }
                Err(e) => {
                    warn!(user_id, peer_id, error = %e, "Skipping unreadable peer profile");
                    skipped_peers.push(peer_id);
                    continue;
                }
            };

            let score = compatibility_score(&requester, &peer);
            if score::exceeds_threshold(score) {
                edges.push(MatchEdge::new(user_id, peer_id, score));
            }
        }

        matches::replace_edges_for_user(&self.pool, user_id, &edges).await?;

        let mut ranked: Vec<RankedPeer> = edges
            .iter()
            .filter_map(|edge| {
                edge.peer_of(user_id).map(|peer_id| RankedPeer {
                    peer_id,
                    score: edge.score,
                })
            })
            .collect();
        rank_peers(&mut ranked);

        info!(
            user_id,
            edges = ranked.len(),
            skipped = skipped_peers.len(),
            "Recomputed matches"
        );

        Ok(RecomputeOutcome {
            matches: ranked,
            skipped_peers,
        })
    }

    /// Current persisted edges for a user, best first, optionally truncated
    pub async fn top_matches(&self, user_id: UserId, limit: Option<usize>) -> Result<Vec<RankedPeer>> {
        let edges: Vec<Match> = matches::list_edges_for_user(&self.pool, user_id).await?;

        let mut ranked: Vec<RankedPeer> = edges
            .iter()
            .filter_map(|m| {
                m.other_participant(user_id).map(|peer_id| RankedPeer {
                    peer_id,
                    score: m.score,
                })
            })
            .collect();
        rank_peers(&mut ranked);

        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_peers_breaks_ties_by_id() {
        let mut peers = vec![
            RankedPeer { peer_id: 9, score: 40.0 },
            RankedPeer { peer_id: 3, score: 75.5 },
            RankedPeer { peer_id: 2, score: 40.0 },
        ];
        rank_peers(&mut peers);

        let order: Vec<UserId> = peers.iter().map(|p| p.peer_id).collect();
        assert_eq!(order, vec![3, 2, 9]);
    }

    #[tokio::test]
    async fn test_gate_entry_removed_after_release() {
        let gate = RecomputeGate::new();
        {
            let _permit = gate.acquire(4).await;
            assert_eq!(gate.active_users(), 1);
        }
        assert_eq!(gate.active_users(), 0);
    }

    #[tokio::test]
    async fn test_gate_keeps_entry_while_someone_waits() {
        let gate = Arc::new(RecomputeGate::new());
        let first = gate.acquire(4).await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire(4).await;
            })
        };
        // Let the waiter register on the slot
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        drop(first);
        assert_eq!(gate.active_users(), 1);

        waiter.await.unwrap();
        assert_eq!(gate.active_users(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let gate = Arc::new(RecomputeGate::new());
        let holder = gate.acquire(4).await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire(4).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Waiter gives up while still queued, then the holder finishes
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(gate.active_users(), 1);

        drop(holder);
        assert_eq!(gate.active_users(), 0);
    }

    #[tokio::test]
    async fn test_waiter_cancelled_before_taking_released_slot() {
        let gate = Arc::new(RecomputeGate::new());
        let holder = gate.acquire(6).await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire(6).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Holder leaves first; the waiter is aborted before it is polled again
        drop(holder);
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(gate.active_users(), 0);
    }

    #[tokio::test]
    async fn test_waiter_cancelled_after_holder_left() {
        let gate = Arc::new(RecomputeGate::new());
        let holder = gate.acquire(9).await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire(9).await;
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        drop(holder);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(gate.active_users(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(gate.active_users(), 0);
    }
}
