//! Signaling messages
//!
//! Every frame is a JSON object carrying a kebab-case `type` tag and
//! camelCase fields:
//!
//! ```text
//! {"type":"join-viewer","roomId":"ABC123"}
//! {"type":"offer","to":"7","payload":{"type":"offer","sdp":"v=0..."}}
//! {"type":"viewer-joined","viewerId":"9"}
//! ```
//!
//! Offer, answer and candidate payloads are arbitrary JSON. The registry
//! forwards them without looking inside.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ConnectionId, RoomId};
use crate::error::Result;

/// Kind of a relayed setup message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Offer => f.write_str("offer"),
            SignalKind::Answer => f.write_str("answer"),
            SignalKind::Candidate => f.write_str("candidate"),
        }
    }
}

/// Messages sent by a participant to the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create `room_id` with the sender as broadcaster
    JoinBroadcaster { room_id: RoomId },

    /// Join `room_id` as a viewer
    JoinViewer { room_id: RoomId },

    Offer { to: ConnectionId, payload: Value },

    Answer { to: ConnectionId, payload: Value },

    Candidate { to: ConnectionId, payload: Value },

    /// Leave the current room; `room_id` is informational
    Leave { room_id: RoomId },
}

impl ClientMessage {
    /// Build a relay request for `kind`
    pub fn signal(kind: SignalKind, to: ConnectionId, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ClientMessage::Offer { to, payload },
            SignalKind::Answer => ClientMessage::Answer { to, payload },
            SignalKind::Candidate => ClientMessage::Candidate { to, payload },
        }
    }

    /// Split a relay request into kind, addressee and payload
    pub fn into_signal(self) -> std::result::Result<(SignalKind, ConnectionId, Value), Self> {
        match self {
            ClientMessage::Offer { to, payload } => Ok((SignalKind::Offer, to, payload)),
            ClientMessage::Answer { to, payload } => Ok((SignalKind::Answer, to, payload)),
            ClientMessage::Candidate { to, payload } => Ok((SignalKind::Candidate, to, payload)),
            other => Err(other),
        }
    }
}

/// Messages sent by the registry to a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identity assigned to the receiving connection
    Welcome { id: ConnectionId },

    /// Broadcaster join rejected: the room already has a broadcaster
    RoomExists { room_id: RoomId },

    /// Viewer join rejected: no broadcaster owns the room
    RoomNotFound { room_id: RoomId },

    /// A broadcaster is present in the receiver's room
    BroadcasterPresent,

    /// A viewer joined the receiving broadcaster's room
    ViewerJoined { viewer_id: ConnectionId },

    Offer { from: ConnectionId, payload: Value },

    Answer { from: ConnectionId, payload: Value },

    Candidate { from: ConnectionId, payload: Value },

    /// A viewer left the receiving broadcaster's room
    ViewerLeft { viewer_id: ConnectionId },

    /// The receiving viewer's broadcaster left; the room is gone
    BroadcasterLeft,

    /// The last frame from this connection was rejected
    Error { message: String },
}

impl ServerMessage {
    /// Build a relayed message of `kind`
    pub fn signal(kind: SignalKind, from: ConnectionId, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ServerMessage::Offer { from, payload },
            SignalKind::Answer => ServerMessage::Answer { from, payload },
            SignalKind::Candidate => ServerMessage::Candidate { from, payload },
        }
    }

    /// Kind, sender and payload if this is a relayed message
    pub fn as_signal(&self) -> Option<(SignalKind, ConnectionId, &Value)> {
        match self {
            ServerMessage::Offer { from, payload } => Some((SignalKind::Offer, *from, payload)),
            ServerMessage::Answer { from, payload } => Some((SignalKind::Answer, *from, payload)),
            ServerMessage::Candidate { from, payload } => {
                Some((SignalKind::Candidate, *from, payload))
            }
            _ => None,
        }
    }
}

/// Encode a message as a text frame
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a text frame
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
