//! Signaling protocol
//!
//! Identifiers, wire messages and the JSON text-frame codec shared by the
//! registry server and participant clients.

pub mod ids;
pub mod message;
pub mod payload;

pub use ids::{ConnectionId, Role, RoomId};
pub use message::{decode, encode, ClientMessage, ServerMessage, SignalKind};
pub use payload::{from_payload, to_payload, IceCandidate, SdpType, SessionDescription};
