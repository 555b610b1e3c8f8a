//! Registry error types

use thiserror::Error;

use crate::protocol::{ConnectionId, RoomId};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Broadcaster join for a room that already has a broadcaster
    #[error("room already exists: {0}")]
    RoomExists(RoomId),

    /// Viewer join for a room with no broadcaster
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// Connection is not (or no longer) live
    #[error("connection {0} is not connected")]
    PeerUnreachable(ConnectionId),

    /// Addressee is not draining its outbound queue
    #[error("outbound queue of connection {0} is full")]
    QueueFull(ConnectionId),

    /// Relay between connections that do not share a room
    #[error("relay from {from} to {to} not permitted")]
    RelayNotPermitted { from: ConnectionId, to: ConnectionId },

    /// Room id is empty or too long
    #[error("invalid room id: {0}")]
    InvalidRoomId(String),
}

impl RegistryError {
    /// Whether the registry has already told the requester about this error
    ///
    /// Room errors are answered with `room-exists` / `room-not-found`.
    /// Relay failures are dropped silently.
    pub fn is_signaled(&self) -> bool {
        matches!(
            self,
            RegistryError::RoomExists(_) | RegistryError::RoomNotFound(_)
        )
    }
}
