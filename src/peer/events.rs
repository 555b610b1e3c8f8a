//! Events for the presentation layer
//!
//! Everything a participant UI needs to render: identity, local media,
//! room outcomes, per-peer connectivity and remote streams.

use std::fmt;

use super::media::TrackKind;
use super::transport::{RemoteStream, TransportState};
use crate::protocol::{ConnectionId, RoomId};

/// Room join outcome shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Someone is already broadcasting in the room
    RoomExists(RoomId),
    /// Nobody is broadcasting in the room
    RoomNotFound(RoomId),
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::RoomExists(room) => {
                write!(f, "Room {room} already has a broadcaster")
            }
            RoomError::RoomNotFound(room) => {
                write!(f, "Room {room} does not exist or has no broadcaster")
            }
        }
    }
}

/// Per-peer connectivity as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl Connectivity {
    /// Map a transport state; `New` and `Closed` are not shown
    pub fn from_transport(state: TransportState) -> Option<Self> {
        match state {
            TransportState::Connecting => Some(Connectivity::Connecting),
            TransportState::Connected => Some(Connectivity::Connected),
            TransportState::Disconnected => Some(Connectivity::Disconnected),
            TransportState::Failed => Some(Connectivity::Failed),
            TransportState::New | TransportState::Closed => None,
        }
    }
}

/// Why a peer link went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The registry reported the remote participant left
    PeerLeft,
    /// A newer setup with the same participant replaced it
    Replaced,
    /// Negotiation or connectivity failed
    NegotiationFailed,
    /// This participant left
    LocalLeave,
}

/// Something the presentation layer should reflect
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    /// Registry-assigned identity of this participant
    Identity(ConnectionId),

    /// Local capture finished; empty `tracks` when access was denied
    LocalMedia {
        tracks: Vec<TrackKind>,
        permission_granted: bool,
    },

    /// A broadcaster is live in the room
    BroadcasterPresent,

    /// The broadcaster left; waiting for a new one
    BroadcasterLeft,

    RoomError(RoomError),

    /// A viewer joined this broadcaster's room
    ViewerJoined(ConnectionId),

    Connectivity {
        remote: ConnectionId,
        state: Connectivity,
    },

    /// Remote media is ready to render
    RemoteStream {
        remote: ConnectionId,
        stream: RemoteStream,
    },

    PeerRemoved {
        remote: ConnectionId,
        reason: RemovalReason,
    },

    /// The registry rejected a frame
    ServerError(String),

    /// The signaling connection is gone
    SignalingLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_error_messages() {
        let exists = RoomError::RoomExists(RoomId::from("ABC123"));
        assert_eq!(exists.to_string(), "Room ABC123 already has a broadcaster");

        let missing = RoomError::RoomNotFound(RoomId::from("ZZZ"));
        assert!(missing.to_string().contains("ZZZ"));
    }

    #[test]
    fn test_connectivity_mapping() {
        assert_eq!(
            Connectivity::from_transport(TransportState::Disconnected),
            Some(Connectivity::Disconnected)
        );
        assert_eq!(Connectivity::from_transport(TransportState::New), None);
        assert_eq!(Connectivity::from_transport(TransportState::Closed), None);
    }
}
