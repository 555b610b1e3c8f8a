//! Room registry implementation
//!
//! The central registry that tracks live rooms, tags connections with their
//! `(room, role)`, and relays setup messages between participants.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::room::{ConnectionEntry, ConnectionTag, Room, RoomSnapshot};
use crate::protocol::{ConnectionId, Role, RoomId, ServerMessage, SignalKind};
use crate::stats::RegistryStats;

/// Central registry for all rooms and connections
///
/// All membership state sits behind one mutex so joins and leaves are
/// linearizable. Critical sections never await and never send: outbound
/// notifications are collected while locked and delivered after the guard
/// is dropped.
pub struct RoomRegistry {
    state: Mutex<RegistryState>,

    config: RegistryConfig,

    next_connection_id: AtomicU64,

    relayed: AtomicU64,

    dropped: AtomicU64,
}

impl RoomRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            config,
            next_connection_id: AtomicU64::new(1),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new transport connection
    ///
    /// Assigns its identity and returns the receiver for messages addressed
    /// to it. A `welcome` carrying the identity is already queued.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let _ = tx.try_send(ServerMessage::Welcome { id });

        self.state
            .lock()
            .connections
            .insert(id, ConnectionEntry::new(tx));

        tracing::debug!(connection = %id, "Connection registered");
        (id, rx)
    }

    /// Remove a connection, leaving its room first
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionTag> {
        let mut outbox = Outbox::default();
        let tag = {
            let mut state = self.state.lock();
            let tag = state.leave(id, &mut outbox);
            state.connections.remove(&id);
            tag
        };
        outbox.deliver(&self.dropped);

        tracing::debug!(connection = %id, "Connection removed");
        tag
    }

    /// Create `room_id` with `id` as its broadcaster
    ///
    /// Fails with `RoomExists` (also sent to `id` as `room-exists`) if the
    /// room already has a broadcaster; the existing room is untouched.
    pub fn join_as_broadcaster(
        &self,
        id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RegistryError> {
        let room_id = self.validate_room_id(room_id)?;

        let mut outbox = Outbox::default();
        let result = self.state.lock().join_broadcaster(id, room_id, &mut outbox);
        outbox.deliver(&self.dropped);
        result
    }

    /// Add `id` to `room_id` as a viewer
    ///
    /// Fails with `RoomNotFound` (also sent to `id` as `room-not-found`) if
    /// no broadcaster owns the room. On success the viewer receives
    /// `broadcaster-present` and the broadcaster `viewer-joined`.
    pub fn join_as_viewer(&self, id: ConnectionId, room_id: RoomId) -> Result<(), RegistryError> {
        let room_id = self.validate_room_id(room_id)?;

        let mut outbox = Outbox::default();
        let result = self.state.lock().join_viewer(id, room_id, &mut outbox);
        outbox.deliver(&self.dropped);
        result
    }

    /// Leave whatever room `id` has joined
    ///
    /// No-op for an untagged connection. Returns the tag that was left.
    pub fn leave(&self, id: ConnectionId) -> Option<ConnectionTag> {
        let mut outbox = Outbox::default();
        let tag = self.state.lock().leave(id, &mut outbox);
        outbox.deliver(&self.dropped);
        tag
    }

    /// Forward a setup message from `from` to `to` without inspecting it
    ///
    /// Never waits on the addressee. Returns `PeerUnreachable` if `to` is
    /// gone or `QueueFull` if it is not reading; callers treat both as a
    /// silent drop.
    pub fn relay(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), RegistryError> {
        let target = {
            let state = self.state.lock();
            match state.connections.get(&to) {
                None => Err(RegistryError::PeerUnreachable(to)),
                Some(_) if self.config.verify_relay_peers && !state.share_room(from, to) => {
                    Err(RegistryError::RelayNotPermitted { from, to })
                }
                Some(entry) => Ok(entry.tx.clone()),
            }
        };

        let result =
            target.and_then(|tx| try_deliver(&tx, to, ServerMessage::signal(kind, from, payload)));

        match &result {
            Ok(()) => {
                self.relayed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%from, %to, %kind, "Relayed");
            }
            Err(RegistryError::RelayNotPermitted { .. }) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%from, %to, %kind, "Relay refused: peers do not share a room");
            }
            Err(RegistryError::QueueFull(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%from, %to, %kind, "Relay dropped: addressee queue full");
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%from, %to, %kind, "Relay dropped: addressee gone");
            }
        }

        result
    }

    /// Send a registry message directly to one connection
    pub fn notify(&self, id: ConnectionId, message: ServerMessage) -> Result<(), RegistryError> {
        let tx = self
            .state
            .lock()
            .connections
            .get(&id)
            .map(|entry| entry.tx.clone())
            .ok_or(RegistryError::PeerUnreachable(id))?;

        let result = try_deliver(&tx, id, message);
        if let Err(RegistryError::QueueFull(_)) = result {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(connection = %id, "Notification dropped: queue full");
        }
        result
    }

    /// Snapshot of a room's membership
    pub fn room(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.state
            .lock()
            .rooms
            .get(room_id)
            .map(|room| room.snapshot(room_id))
    }

    /// Check if a room exists (has a broadcaster)
    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.state.lock().rooms.contains_key(room_id)
    }

    /// Current `(room, role)` tag of a connection
    pub fn connection_tag(&self, id: ConnectionId) -> Option<ConnectionTag> {
        self.state
            .lock()
            .connections
            .get(&id)
            .and_then(|entry| entry.tag.clone())
    }

    /// Check if a connection is live
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&id)
    }

    /// Get total number of rooms
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Snapshot of registry counters
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            connections: state.connections.len() as u64,
            rooms: state.rooms.len() as u64,
            viewers: state
                .rooms
                .values()
                .map(|room| room.viewer_count() as u64)
                .sum(),
            waiting_viewers: state.waiting.values().map(|set| set.len() as u64).sum(),
            relayed: self.relayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn validate_room_id(&self, room_id: RoomId) -> Result<RoomId, RegistryError> {
        let room_id = room_id.trimmed();
        if room_id.is_empty() {
            return Err(RegistryError::InvalidRoomId("room id is empty".into()));
        }
        if room_id.len() > self.config.max_room_id_len {
            return Err(RegistryError::InvalidRoomId(format!(
                "room id longer than {} bytes",
                self.config.max_room_id_len
            )));
        }
        Ok(room_id)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue `message` for `to` without waiting
fn try_deliver(
    tx: &mpsc::Sender<ServerMessage>,
    to: ConnectionId,
    message: ServerMessage,
) -> Result<(), RegistryError> {
    tx.try_send(message).map_err(|e| match e {
        TrySendError::Full(_) => RegistryError::QueueFull(to),
        TrySendError::Closed(_) => RegistryError::PeerUnreachable(to),
    })
}

/// Messages queued while the registry lock is held
#[derive(Default)]
struct Outbox(Vec<(ConnectionId, mpsc::Sender<ServerMessage>, ServerMessage)>);

impl Outbox {
    fn push(&mut self, state: &RegistryState, to: ConnectionId, message: ServerMessage) {
        if let Some(entry) = state.connections.get(&to) {
            self.0.push((to, entry.tx.clone(), message));
        }
    }

    fn deliver(self, dropped: &AtomicU64) {
        for (to, tx, message) in self.0 {
            // Receiver gone means the connection is already tearing down
            if let Err(RegistryError::QueueFull(_)) = try_deliver(&tx, to, message) {
                dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(connection = %to, "Notification dropped: queue full");
            }
        }
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,

    rooms: HashMap<RoomId, Room>,

    /// Viewers still tagged with a room whose broadcaster left
    waiting: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn join_broadcaster(
        &mut self,
        id: ConnectionId,
        room_id: RoomId,
        outbox: &mut Outbox,
    ) -> Result<(), RegistryError> {
        if !self.connections.contains_key(&id) {
            return Err(RegistryError::PeerUnreachable(id));
        }

        if self.rooms.contains_key(&room_id) {
            outbox.push(
                self,
                id,
                ServerMessage::RoomExists {
                    room_id: room_id.clone(),
                },
            );
            tracing::warn!(room = %room_id, connection = %id, "Broadcaster join rejected: room exists");
            return Err(RegistryError::RoomExists(room_id));
        }

        self.leave(id, outbox);

        self.rooms.insert(room_id.clone(), Room::new(id));
        self.set_tag(id, ConnectionTag::new(room_id.clone(), Role::Broadcaster));

        if let Some(waiting) = self.waiting.get(&room_id) {
            for &viewer in waiting {
                outbox.push(self, viewer, ServerMessage::BroadcasterPresent);
            }
        }

        tracing::info!(room = %room_id, broadcaster = %id, "Room created");
        Ok(())
    }

    fn join_viewer(
        &mut self,
        id: ConnectionId,
        room_id: RoomId,
        outbox: &mut Outbox,
    ) -> Result<(), RegistryError> {
        if !self.connections.contains_key(&id) {
            return Err(RegistryError::PeerUnreachable(id));
        }

        let broadcaster_id = match self.rooms.get(&room_id) {
            Some(room) => room.broadcaster_id,
            None => {
                outbox.push(
                    self,
                    id,
                    ServerMessage::RoomNotFound {
                        room_id: room_id.clone(),
                    },
                );
                tracing::warn!(room = %room_id, connection = %id, "Viewer join rejected: room not found");
                return Err(RegistryError::RoomNotFound(room_id));
            }
        };

        if broadcaster_id == id {
            outbox.push(
                self,
                id,
                ServerMessage::RoomExists {
                    room_id: room_id.clone(),
                },
            );
            return Err(RegistryError::RoomExists(room_id));
        }

        let tag = ConnectionTag::new(room_id.clone(), Role::Viewer);
        let current = self.connections.get(&id).and_then(|entry| entry.tag.clone());
        if current.as_ref() != Some(&tag) {
            self.leave(id, outbox);
        }
        self.remove_waiting(&room_id, id);

        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.viewer_ids.insert(id);
        }
        self.set_tag(id, tag);

        outbox.push(self, id, ServerMessage::BroadcasterPresent);
        outbox.push(self, broadcaster_id, ServerMessage::ViewerJoined { viewer_id: id });

        tracing::info!(room = %room_id, viewer = %id, "Viewer joined");
        Ok(())
    }

    fn leave(&mut self, id: ConnectionId, outbox: &mut Outbox) -> Option<ConnectionTag> {
        let tag = self.connections.get_mut(&id)?.tag.take()?;

        match tag.role {
            Role::Broadcaster => {
                let owns_room = self
                    .rooms
                    .get(&tag.room_id)
                    .is_some_and(|room| room.broadcaster_id == id);

                if owns_room {
                    if let Some(room) = self.rooms.remove(&tag.room_id) {
                        for &viewer in &room.viewer_ids {
                            outbox.push(self, viewer, ServerMessage::BroadcasterLeft);
                        }
                        let viewers = room.viewer_ids.len();
                        self.waiting
                            .entry(tag.room_id.clone())
                            .or_default()
                            .extend(room.viewer_ids);

                        tracing::info!(
                            room = %tag.room_id,
                            broadcaster = %id,
                            viewers = viewers,
                            "Broadcaster left, room closed"
                        );
                    }
                }
            }
            Role::Viewer => {
                let broadcaster_id = self
                    .rooms
                    .get_mut(&tag.room_id)
                    .and_then(|room| room.viewer_ids.remove(&id).then_some(room.broadcaster_id));

                match broadcaster_id {
                    Some(broadcaster_id) => {
                        outbox.push(self, broadcaster_id, ServerMessage::ViewerLeft { viewer_id: id });
                        tracing::info!(room = %tag.room_id, viewer = %id, "Viewer left");
                    }
                    None => self.remove_waiting(&tag.room_id, id),
                }
            }
        }

        Some(tag)
    }

    fn set_tag(&mut self, id: ConnectionId, tag: ConnectionTag) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.tag = Some(tag);
        }
    }

    fn remove_waiting(&mut self, room_id: &RoomId, id: ConnectionId) {
        if let Some(set) = self.waiting.get_mut(room_id) {
            set.remove(&id);
            if set.is_empty() {
                self.waiting.remove(room_id);
            }
        }
    }

    /// Room `id` is currently a member of, if any
    fn membership(&self, id: ConnectionId) -> Option<&RoomId> {
        let tag = self.connections.get(&id)?.tag.as_ref()?;
        let room = self.rooms.get(&tag.room_id)?;
        room.is_member(id).then_some(&tag.room_id)
    }

    fn share_room(&self, a: ConnectionId, b: ConnectionId) -> bool {
        match (self.membership(a), self.membership(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn connect(registry: &RoomRegistry) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (id, mut rx) = registry.connect();
        assert_eq!(drain(&mut rx), vec![ServerMessage::Welcome { id }]);
        (id, rx)
    }

    #[test]
    fn test_connect_assigns_distinct_ids() {
        let registry = RoomRegistry::new();
        let (a, _ra) = registry.connect();
        let (b, _rb) = registry.connect();
        assert_ne!(a, b);
        assert!(registry.is_connected(a));
        assert_eq!(registry.stats().connections, 2);
    }

    #[test]
    fn test_second_broadcaster_rejected() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("ABC123");
        let (x, mut rx_x) = connect(&registry);
        let (z, mut rx_z) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        let err = assert_err!(registry.join_as_broadcaster(z, room.clone()));
        assert_eq!(err, RegistryError::RoomExists(room.clone()));
        assert!(err.is_signaled());

        // Only the requester hears about it
        assert_eq!(
            drain(&mut rx_z),
            vec![ServerMessage::RoomExists {
                room_id: room.clone()
            }]
        );
        assert!(drain(&mut rx_x).is_empty());

        // Existing mapping unchanged
        assert_eq!(registry.room(&room).unwrap().broadcaster_id, x);
        assert_eq!(registry.connection_tag(z), None);
    }

    #[test]
    fn test_viewer_needs_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("NOPE");
        let (y, mut rx_y) = connect(&registry);

        let err = assert_err!(registry.join_as_viewer(y, room.clone()));
        assert_eq!(err, RegistryError::RoomNotFound(room.clone()));
        assert_eq!(
            drain(&mut rx_y),
            vec![ServerMessage::RoomNotFound {
                room_id: room.clone()
            }]
        );
        assert!(!registry.room_exists(&room));
        assert_eq!(registry.connection_tag(y), None);
        assert_eq!(registry.stats().viewers, 0);
    }

    #[test]
    fn test_broadcaster_rejoin_after_leave() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("ABC123");
        let (x, _rx) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        let tag = registry.leave(x).unwrap();
        assert_eq!(tag.role, Role::Broadcaster);
        assert!(!registry.room_exists(&room));

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        assert!(registry.room_exists(&room));
    }

    #[test]
    fn test_leave_untagged_is_noop() {
        let registry = RoomRegistry::new();
        let (a, mut rx) = connect(&registry);
        assert_eq!(registry.leave(a), None);
        assert_eq!(registry.disconnect(a), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_relay_reaches_only_addressee() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        let (_c, mut rx_c) = connect(&registry);
        let payload = json!({"type": "offer", "sdp": "v=0"});

        assert_ok!(registry.relay(a, b, SignalKind::Offer, payload.clone()));

        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::Offer { from: a, payload }]
        );
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_c).is_empty());
        assert_eq!(registry.stats().relayed, 1);
    }

    #[test]
    fn test_relay_to_departed_peer_dropped() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, rx_b) = connect(&registry);
        registry.disconnect(b);
        drop(rx_b);

        let err = assert_err!(registry.relay(a, b, SignalKind::Candidate, json!({})));
        assert_eq!(err, RegistryError::PeerUnreachable(b));
        assert!(!err.is_signaled());
        assert_eq!(registry.stats().dropped, 1);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let registry = RoomRegistry::with_config(RegistryConfig::default().outbound_capacity(2));
        let (a, _rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);

        // b never reads
        assert_ok!(registry.relay(a, b, SignalKind::Candidate, json!({"n": 1})));
        assert_ok!(registry.relay(a, b, SignalKind::Candidate, json!({"n": 2})));
        let err = assert_err!(registry.relay(a, b, SignalKind::Candidate, json!({"n": 3})));
        assert_eq!(err, RegistryError::QueueFull(b));
        assert!(!err.is_signaled());

        let stats = registry.stats();
        assert_eq!(stats.relayed, 2);
        assert_eq!(stats.dropped, 1);

        // Earlier messages are intact and the queue accepts again once drained
        assert_eq!(drain(&mut rx_b).len(), 2);
        assert_ok!(registry.relay(a, b, SignalKind::Candidate, json!({"n": 4})));
    }

    #[test]
    fn test_full_queue_drops_room_notifications() {
        let registry = RoomRegistry::with_config(RegistryConfig::default().outbound_capacity(1));
        let room = RoomId::from("SLOW");
        let (x, mut rx_x) = connect(&registry);
        let (y1, _rx_y1) = connect(&registry);
        let (y2, mut rx_y2) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        assert_ok!(registry.join_as_viewer(y1, room.clone()));
        // x's queue now holds y1's viewer-joined
        assert_ok!(registry.join_as_viewer(y2, room.clone()));

        assert_eq!(drain(&mut rx_y2), vec![ServerMessage::BroadcasterPresent]);
        assert_eq!(
            drain(&mut rx_x),
            vec![ServerMessage::ViewerJoined { viewer_id: y1 }]
        );
        assert_eq!(registry.stats().dropped, 1);
        assert_eq!(registry.room(&room).unwrap().viewer_ids.len(), 2);
    }

    #[test]
    fn test_viewer_departure_notifies_own_broadcaster_only() {
        let registry = RoomRegistry::new();
        let (x1, mut rx_x1) = connect(&registry);
        let (x2, mut rx_x2) = connect(&registry);
        let (y, _rx_y) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x1, RoomId::from("ONE")));
        assert_ok!(registry.join_as_broadcaster(x2, RoomId::from("TWO")));
        assert_ok!(registry.join_as_viewer(y, RoomId::from("ONE")));
        drain(&mut rx_x1);

        registry.disconnect(y);

        assert_eq!(
            drain(&mut rx_x1),
            vec![ServerMessage::ViewerLeft { viewer_id: y }]
        );
        assert!(drain(&mut rx_x2).is_empty());
    }

    #[test]
    fn test_broadcast_scenario() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("ABC123");
        let (x, mut rx_x) = connect(&registry);
        let (y, mut rx_y) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        assert_eq!(registry.room(&room).unwrap().broadcaster_id, x);

        assert_ok!(registry.join_as_viewer(y, room.clone()));
        assert_eq!(drain(&mut rx_y), vec![ServerMessage::BroadcasterPresent]);
        assert_eq!(
            drain(&mut rx_x),
            vec![ServerMessage::ViewerJoined { viewer_id: y }]
        );

        let offer = json!({"type": "offer", "sdp": "o"});
        assert_ok!(registry.relay(x, y, SignalKind::Offer, offer.clone()));
        assert_eq!(
            drain(&mut rx_y),
            vec![ServerMessage::Offer {
                from: x,
                payload: offer
            }]
        );

        let answer = json!({"type": "answer", "sdp": "a"});
        assert_ok!(registry.relay(y, x, SignalKind::Answer, answer.clone()));
        assert_eq!(
            drain(&mut rx_x),
            vec![ServerMessage::Answer {
                from: y,
                payload: answer
            }]
        );

        registry.disconnect(y);
        assert_eq!(
            drain(&mut rx_x),
            vec![ServerMessage::ViewerLeft { viewer_id: y }]
        );
        assert!(registry.room(&room).unwrap().viewer_ids.is_empty());

        registry.disconnect(x);
        assert!(!registry.room_exists(&room));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_broadcaster_leave_notifies_viewers() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("LIVE");
        let (x, _rx_x) = connect(&registry);
        let (y1, mut rx_y1) = connect(&registry);
        let (y2, mut rx_y2) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        assert_ok!(registry.join_as_viewer(y1, room.clone()));
        assert_ok!(registry.join_as_viewer(y2, room.clone()));
        drain(&mut rx_y1);
        drain(&mut rx_y2);

        registry.leave(x);

        assert_eq!(drain(&mut rx_y1), vec![ServerMessage::BroadcasterLeft]);
        assert_eq!(drain(&mut rx_y2), vec![ServerMessage::BroadcasterLeft]);
        assert!(!registry.room_exists(&room));

        let stats = registry.stats();
        assert_eq!(stats.viewers, 0);
        assert_eq!(stats.waiting_viewers, 2);
    }

    #[test]
    fn test_waiting_viewer_hears_new_broadcaster() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("AGAIN");
        let (x, _rx_x) = connect(&registry);
        let (y, mut rx_y) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        assert_ok!(registry.join_as_viewer(y, room.clone()));
        registry.disconnect(x);
        drain(&mut rx_y);

        let (x2, mut rx_x2) = connect(&registry);
        assert_ok!(registry.join_as_broadcaster(x2, room.clone()));
        assert_eq!(drain(&mut rx_y), vec![ServerMessage::BroadcasterPresent]);

        // The waiting viewer re-joins and the new broadcaster is told
        assert_ok!(registry.join_as_viewer(y, room.clone()));
        assert_eq!(
            drain(&mut rx_x2),
            vec![ServerMessage::ViewerJoined { viewer_id: y }]
        );
        assert_eq!(registry.stats().waiting_viewers, 0);
        assert_eq!(registry.room(&room).unwrap().viewer_ids, vec![y]);
    }

    #[test]
    fn test_switching_rooms_leaves_previous() {
        let registry = RoomRegistry::new();
        let (x1, mut rx_x1) = connect(&registry);
        let (x2, mut rx_x2) = connect(&registry);
        let (y, _rx_y) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x1, RoomId::from("ONE")));
        assert_ok!(registry.join_as_broadcaster(x2, RoomId::from("TWO")));
        assert_ok!(registry.join_as_viewer(y, RoomId::from("ONE")));
        drain(&mut rx_x1);

        assert_ok!(registry.join_as_viewer(y, RoomId::from("TWO")));
        assert_eq!(
            drain(&mut rx_x1),
            vec![ServerMessage::ViewerLeft { viewer_id: y }]
        );
        assert_eq!(
            drain(&mut rx_x2),
            vec![ServerMessage::ViewerJoined { viewer_id: y }]
        );
        assert_eq!(
            registry.connection_tag(y),
            Some(ConnectionTag::new(RoomId::from("TWO"), Role::Viewer))
        );
    }

    #[test]
    fn test_failed_join_keeps_existing_tag() {
        let registry = RoomRegistry::new();
        let (x, _rx_x) = connect(&registry);
        let (y, _rx_y) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, RoomId::from("ONE")));
        assert_ok!(registry.join_as_viewer(y, RoomId::from("ONE")));
        assert_err!(registry.join_as_viewer(y, RoomId::from("MISSING")));

        assert!(registry.room(&RoomId::from("ONE")).unwrap().viewer_ids.contains(&y));
    }

    #[test]
    fn test_broadcaster_cannot_view_own_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("SELF");
        let (x, _rx) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, room.clone()));
        let err = assert_err!(registry.join_as_viewer(x, room.clone()));
        assert_eq!(err, RegistryError::RoomExists(room.clone()));
        assert!(registry.room_exists(&room));
    }

    #[test]
    fn test_invalid_room_ids() {
        let registry = RoomRegistry::with_config(RegistryConfig::default().max_room_id_len(6));
        let (x, mut rx) = connect(&registry);

        assert!(matches!(
            registry.join_as_broadcaster(x, RoomId::from("   ")),
            Err(RegistryError::InvalidRoomId(_))
        ));
        assert!(matches!(
            registry.join_as_broadcaster(x, RoomId::from("TOOLONG1")),
            Err(RegistryError::InvalidRoomId(_))
        ));
        assert!(drain(&mut rx).is_empty());

        assert_ok!(registry.join_as_broadcaster(x, RoomId::from(" ABC123 ")));
        assert!(registry.room_exists(&RoomId::from("ABC123")));
    }

    #[test]
    fn test_verified_relay_requires_shared_room() {
        let registry = RoomRegistry::with_config(RegistryConfig::default().verify_relay_peers(true));
        let (x, _rx_x) = connect(&registry);
        let (y, mut rx_y) = connect(&registry);
        let (intruder, _rx_i) = connect(&registry);

        assert_ok!(registry.join_as_broadcaster(x, RoomId::from("ROOM")));
        assert_ok!(registry.join_as_viewer(y, RoomId::from("ROOM")));
        drain(&mut rx_y);

        let err = assert_err!(registry.relay(intruder, y, SignalKind::Candidate, json!({})));
        assert_eq!(err, RegistryError::RelayNotPermitted { from: intruder, to: y });
        assert!(drain(&mut rx_y).is_empty());

        assert_ok!(registry.relay(x, y, SignalKind::Candidate, json!({"candidate": "c"})));
        assert_eq!(drain(&mut rx_y).len(), 1);
    }

    #[test]
    fn test_unverified_relay_ignores_rooms() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);

        assert_ok!(registry.relay(a, b, SignalKind::Candidate, json!(null)));
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_racing_broadcasters_exactly_one_wins() {
        const CONTENDERS: usize = 16;

        let registry = Arc::new(RoomRegistry::new());
        let barrier = Arc::new(Barrier::new(CONTENDERS));

        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let (id, rx) = registry.connect();
                    barrier.wait();
                    let result = registry.join_as_broadcaster(id, RoomId::from("RACE"));
                    (id, result, rx)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|(_, r, _)| r.is_ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|(_, r, _)| r.is_err())
            .all(|(_, r, _)| matches!(r, Err(RegistryError::RoomExists(_)))));

        let winner = winners[0].0;
        assert_eq!(
            registry.room(&RoomId::from("RACE")).unwrap().broadcaster_id,
            winner
        );
    }

    #[test]
    fn test_notify_unknown_connection() {
        let registry = RoomRegistry::new();
        let err = assert_err!(registry.notify(
            ConnectionId::new(99),
            ServerMessage::BroadcasterPresent
        ));
        assert_eq!(err, RegistryError::PeerUnreachable(ConnectionId::new(99)));
    }
}
