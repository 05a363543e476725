//! Live connection registry
//!
//! Maps each user id to the set of realtime channels currently bound to it.
//! The map is split into independently locked shards keyed by user id, so
//! connects and broadcasts for unrelated users rarely contend. Locks are
//! plain `std` mutexes held only for map edits and sender cloning, never
//! across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use tunelink_common::db::UserId;
use tunelink_common::events::ServerEvent;
use uuid::Uuid;

/// Identity of one live channel
pub type ConnectionId = Uuid;

/// Outbound half of a channel's event queue
pub type EventSender = mpsc::Sender<ServerEvent>;

const DEFAULT_SHARDS: usize = 16;

type Shard = HashMap<UserId, HashMap<ConnectionId, EventSender>>;

pub struct ConnectionRegistry {
    shards: Box<[Mutex<Shard>]>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| Mutex::new(Shard::new())).collect();
        Self { shards }
    }

    fn shard(&self, user_id: UserId) -> MutexGuard<'_, Shard> {
        let index = user_id.rem_euclid(self.shards.len() as i64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a channel for `user_id`
    ///
    /// The returned guard unregisters the channel when dropped, whichever way
    /// the owning session ends.
    pub fn register(self: &Arc<Self>, user_id: UserId, sender: EventSender) -> Registration {
        let connection_id = Uuid::new_v4();
        self.shard(user_id)
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);

        debug!(user_id, %connection_id, "Registered connection");

        Registration {
            registry: Arc::clone(self),
            user_id,
            connection_id,
        }
    }

    /// Remove one channel; the user entry goes away with its last channel
    ///
    /// Returns whether the channel was registered.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut shard = self.shard(user_id);
        let Some(connections) = shard.get_mut(&user_id) else {
            return false;
        };

        let removed = connections.remove(&connection_id).is_some();
        if connections.is_empty() {
            shard.remove(&user_id);
        }
        removed
    }

    /// Best-effort delivery to every live channel of `user_id`
    ///
    /// A closed channel is dropped from the registry; a full one just misses
    /// this event. Returns the number of channels the event was queued on.
    pub fn broadcast(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let targets: Vec<(ConnectionId, EventSender)> = match self.shard(user_id).get(&user_id) {
            Some(connections) => connections
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (connection_id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(user_id, %connection_id, "Outbound queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(user_id, %connection_id, "Dropping stale connection");
                    self.unregister(user_id, connection_id);
                }
            }
        }
        delivered
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.shard(user_id).get(&user_id).map_or(0, HashMap::len)
    }

    /// Number of users with at least one live channel
    pub fn online_users(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

/// Scoped registration of one channel
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Registration {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.user_id, self.connection_id);
        debug!(user_id = self.user_id, connection_id = %self.connection_id, "Unregistered connection");
    }
}
