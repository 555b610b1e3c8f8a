//! Participant-side peer setup
//!
//! Everything between the signaling channel and the media transports:
//!
//! - `controller`: sequences offer/answer/candidate exchange per link
//! - `link`: lifecycle of one peer link
//! - `transport`: seam to the real-time media stack
//! - `media`: local capture seam
//! - `events`: what the presentation layer is told

pub mod controller;
pub mod events;
pub mod link;
pub mod media;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::SetupController;
pub use events::{Connectivity, PresentationEvent, RemovalReason, RoomError};
pub use link::{LinkError, LinkPhase, PeerLink};
pub use media::{LocalTrack, MediaError, MediaSource, ReceiveOnly, TrackKind};
pub use transport::{
    LinkEvent, PeerTransport, RemoteStream, TransportConfig, TransportError, TransportEvent,
    TransportEvents, TransportFactory, TransportState, DEFAULT_ICE_SERVER,
};
