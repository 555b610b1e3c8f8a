//! Room and connection records held by the registry

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, Role, RoomId, ServerMessage};

/// The `(room, role)` a connection has joined as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTag {
    pub room_id: RoomId,
    pub role: Role,
}

impl ConnectionTag {
    pub fn new(room_id: RoomId, role: Role) -> Self {
        Self { room_id, role }
    }
}

/// One live broadcast room
///
/// A room only exists while it has a broadcaster, so the broadcaster id is
/// not optional.
#[derive(Debug)]
pub(crate) struct Room {
    pub(super) broadcaster_id: ConnectionId,
    pub(super) viewer_ids: HashSet<ConnectionId>,
}

impl Room {
    pub(super) fn new(broadcaster_id: ConnectionId) -> Self {
        Self {
            broadcaster_id,
            viewer_ids: HashSet::new(),
        }
    }

    pub(super) fn viewer_count(&self) -> usize {
        self.viewer_ids.len()
    }

    /// Whether `id` is the broadcaster or a joined viewer
    pub(super) fn is_member(&self, id: ConnectionId) -> bool {
        self.broadcaster_id == id || self.viewer_ids.contains(&id)
    }

    pub(super) fn snapshot(&self, room_id: &RoomId) -> RoomSnapshot {
        let mut viewer_ids: Vec<_> = self.viewer_ids.iter().copied().collect();
        viewer_ids.sort();
        RoomSnapshot {
            room_id: room_id.clone(),
            broadcaster_id: self.broadcaster_id,
            viewer_ids,
        }
    }
}

/// Point-in-time copy of a room's membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub broadcaster_id: ConnectionId,
    /// Sorted ascending
    pub viewer_ids: Vec<ConnectionId>,
}

/// Per-connection record
#[derive(Debug)]
pub(super) struct ConnectionEntry {
    pub(super) tx: mpsc::Sender<ServerMessage>,
    pub(super) tag: Option<ConnectionTag>,
}

impl ConnectionEntry {
    pub(super) fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { tx, tag: None }
    }
}
