use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Identifies one live connection for the lifetime of its socket.
pub type ConnId = Uuid;

/// Capacity of each connection's outbox. A consumer that falls further behind
/// than this has its frames dropped rather than stalling the room.
const OUTBOX_CAPACITY: usize = 256;

#[derive(Default)]
struct RegistryInner {
    /// Live connections and their outboxes.
    connections: HashMap<ConnId, mpsc::Sender<String>>,
    /// Room id -> member connections.
    rooms: HashMap<i64, HashSet<ConnId>>,
    /// Reverse mapping: connection -> rooms it joined.
    memberships: HashMap<ConnId, HashSet<i64>>,
    /// Per-room sequencing locks handed to the message pipeline.
    sequencers: HashMap<i64, Arc<Mutex<()>>>,
}

/// Tracks which live connections belong to which room and fans payloads out
/// to them.
///
/// All bookkeeping lives behind one async mutex: joins, leaves and broadcasts
/// are mutually exclusive, so a disconnect that removes a connection is fully
/// ordered against every later broadcast. Delivery into each outbox is
/// non-blocking, so holding the lock across a broadcast is cheap.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl RegistryInner {
    /// Drops a room's sequencing lock once nothing references it and the room
    /// has no members, so fresh room ids cannot grow the map without bound.
    fn prune_sequencer(&mut self, room_id: i64) {
        if self.rooms.contains_key(&room_id) {
            return;
        }
        if let Some(sequencer) = self.sequencers.get(&room_id) {
            if Arc::strong_count(sequencer) == 1 {
                self.sequencers.remove(&room_id);
            }
        }
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an outbox for a new connection and registers it.
    ///
    /// Returns the receiving half, which the socket task drains into the
    /// websocket sender.
    pub async fn register(&self, conn_id: ConnId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.inner.lock().await.connections.insert(conn_id, tx);
        rx
    }

    /// Removes a connection and releases all its room memberships.
    ///
    /// Invoked on disconnect. Once this returns, no broadcast will attempt
    /// delivery to the connection.
    pub async fn deregister(&self, conn_id: ConnId) {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(&conn_id);
        if let Some(rooms) = inner.memberships.remove(&conn_id) {
            for room_id in rooms {
                if let Some(members) = inner.rooms.get_mut(&room_id) {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        inner.rooms.remove(&room_id);
                    }
                }
                inner.prune_sequencer(room_id);
            }
        }
    }

    /// Records a connection as a member of a room. Idempotent.
    pub async fn join(&self, conn_id: ConnId, room_id: i64) {
        let mut inner = self.inner.lock().await;
        if !inner.connections.contains_key(&conn_id) {
            return;
        }
        inner.rooms.entry(room_id).or_default().insert(conn_id);
        inner.memberships.entry(conn_id).or_default().insert(room_id);
    }

    /// Removes a connection from one room.
    pub async fn leave(&self, conn_id: ConnId, room_id: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(members) = inner.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
        if let Some(rooms) = inner.memberships.get_mut(&conn_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                inner.memberships.remove(&conn_id);
            }
        }
        inner.prune_sequencer(room_id);
    }

    /// Delivers a payload to every current member of a room.
    ///
    /// An empty room is a no-op. A closed or lagging recipient loses the
    /// frame with a warning; it never fails delivery to the others.
    pub async fn broadcast(&self, room_id: i64, payload: &str) {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(&room_id) else {
            return;
        };
        for conn_id in members {
            if let Some(tx) = inner.connections.get(conn_id) {
                if let Err(e) = tx.try_send(payload.to_string()) {
                    tracing::warn!(
                        conn_id = %conn_id,
                        room_id,
                        "dropping broadcast frame for slow consumer: {}",
                        e
                    );
                }
            }
        }
    }

    /// Delivers a payload to a single connection (private error frames).
    pub async fn send_to(&self, conn_id: ConnId, payload: &str) {
        let inner = self.inner.lock().await;
        if let Some(tx) = inner.connections.get(&conn_id) {
            if let Err(e) = tx.try_send(payload.to_string()) {
                tracing::warn!(conn_id = %conn_id, "dropping direct frame: {}", e);
            }
        }
    }

    /// Returns the sequencing lock for a room.
    ///
    /// The message pipeline holds it across persist-then-broadcast so that a
    /// message persisted before another begins persisting is also broadcast
    /// first. Sends to different rooms never contend.
    pub async fn sequencer(&self, room_id: i64) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().await;
        inner
            .sequencers
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Releases a sequencing lock handed out by [`Self::sequencer`].
    ///
    /// Called by the message pipeline after its send completes and its clone
    /// of the lock is dropped; the entry is pruned if the room has no members
    /// and no other send is holding it.
    pub async fn release_sequencer(&self, room_id: i64) {
        let mut inner = self.inner.lock().await;
        inner.prune_sequencer(room_id);
    }

    /// How many connections are currently joined to a room.
    pub async fn member_count(&self, room_id: i64) -> usize {
        let inner = self.inner.lock().await;
        inner.rooms.get(&room_id).map(|m| m.len()).unwrap_or(0)
    }

    #[cfg(test)]
    async fn sequencer_count(&self) -> usize {
        self.inner.lock().await.sequencers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(registry: &RoomRegistry) -> (ConnId, mpsc::Receiver<String>) {
        let conn_id = Uuid::new_v4();
        let rx = registry.register(conn_id).await;
        (conn_id, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_only_room_members() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        let (c, mut rx_c) = connect(&registry).await;

        registry.join(a, 1).await;
        registry.join(b, 1).await;
        registry.join(c, 2).await;

        registry.broadcast(1, "hello").await;

        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;

        registry.join(a, 1).await;
        registry.join(a, 1).await;
        assert_eq!(registry.member_count(1).await, 1);

        // One broadcast, one delivery.
        registry.broadcast(1, "once").await;
        assert_eq!(rx_a.recv().await.unwrap(), "once");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn each_recipient_sees_broadcasts_in_submission_order() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;
        registry.join(a, 1).await;

        registry.broadcast(1, "first").await;
        registry.broadcast(1, "second").await;

        assert_eq!(rx_a.recv().await.unwrap(), "first");
        assert_eq!(rx_a.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn deregister_releases_all_memberships() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        registry.join(a, 1).await;
        registry.join(a, 2).await;
        registry.join(b, 1).await;

        registry.deregister(a).await;
        assert_eq!(registry.member_count(1).await, 1);
        assert_eq!(registry.member_count(2).await, 0);

        // Broadcasting after the disconnect neither errors nor delivers to
        // the removed connection.
        registry.broadcast(1, "still works").await;
        assert_eq!(rx_b.recv().await.unwrap(), "still works");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_a_noop() {
        let registry = RoomRegistry::new();
        registry.broadcast(99, "nobody home").await;
    }

    #[tokio::test]
    async fn released_sequencer_for_idle_room_is_pruned() {
        let registry = RoomRegistry::new();
        let sequencer = registry.sequencer(42).await;
        assert_eq!(registry.sequencer_count().await, 1);

        drop(sequencer);
        registry.release_sequencer(42).await;
        assert_eq!(registry.sequencer_count().await, 0);
    }

    #[tokio::test]
    async fn held_sequencer_is_not_pruned() {
        let registry = RoomRegistry::new();
        let _sequencer = registry.sequencer(42).await;
        registry.release_sequencer(42).await;
        assert_eq!(registry.sequencer_count().await, 1);
    }

    #[tokio::test]
    async fn sequencer_is_pruned_when_room_empties() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connect(&registry).await;
        registry.join(a, 7).await;
        drop(registry.sequencer(7).await);

        // Membership keeps the room alive, so the entry stays.
        registry.release_sequencer(7).await;
        assert_eq!(registry.sequencer_count().await, 1);

        registry.leave(a, 7).await;
        assert_eq!(registry.sequencer_count().await, 0);
    }

    #[tokio::test]
    async fn disconnect_prunes_sequencers_of_emptied_rooms() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connect(&registry).await;
        registry.join(a, 1).await;
        registry.join(a, 2).await;
        drop(registry.sequencer(1).await);
        drop(registry.sequencer(2).await);

        registry.deregister(a).await;
        assert_eq!(registry.sequencer_count().await, 0);
    }

    #[tokio::test]
    async fn leave_removes_single_membership() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry).await;
        registry.join(a, 1).await;
        registry.join(a, 2).await;

        registry.leave(a, 1).await;
        registry.broadcast(1, "gone").await;
        registry.broadcast(2, "here").await;

        assert_eq!(rx_a.recv().await.unwrap(), "here");
        assert!(rx_a.try_recv().is_err());
    }
}
