//! Peer transport abstraction
//!
//! A `PeerTransport` is one direct connection to a remote participant:
//! it produces and applies descriptions, gathers candidates and carries the
//! media. ICE, DTLS and RTP live behind this trait. The controller only
//! sequences the calls and forwards what the transport reports.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::media::{LocalTrack, TrackKind};
use crate::protocol::{ConnectionId, IceCandidate, SessionDescription};

/// Public path-discovery helper used when none is configured
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Settings handed to the transport factory for every new link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_ICE_SERVER.to_owned()],
        }
    }
}

/// Connection state reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    /// Connectivity lost; the transport may still recover
    Disconnected,
    /// Terminal failure
    Failed,
    Closed,
}

/// Handle to inbound remote media
///
/// Opaque to the controller; passed through to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_id: String,
    pub kind: TrackKind,
}

/// Something a transport reports asynchronously
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local candidate was gathered and should go to the remote peer
    LocalCandidate(IceCandidate),
    /// Remote media became available
    RemoteStream(RemoteStream),
    StateChanged(TransportState),
}

/// Transport event tagged with the link it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub remote: ConnectionId,
    /// Distinguishes a replaced link's late events from the current link's
    pub generation: u64,
    pub event: TransportEvent,
}

/// Sender given to a transport for reporting events
#[derive(Debug, Clone)]
pub struct TransportEvents {
    remote: ConnectionId,
    generation: u64,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl TransportEvents {
    pub(crate) fn new(
        remote: ConnectionId,
        generation: u64,
        tx: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            remote,
            generation,
            tx,
        }
    }

    /// Remote participant this transport talks to
    pub fn remote(&self) -> ConnectionId {
        self.remote
    }

    /// Report an event. Returns false once the controller is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(LinkEvent {
                remote: self.remote,
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn local_candidate(&self, candidate: IceCandidate) -> bool {
        self.emit(TransportEvent::LocalCandidate(candidate))
    }

    pub fn remote_stream(&self, stream: RemoteStream) -> bool {
        self.emit(TransportEvent::RemoteStream(stream))
    }

    pub fn state_changed(&self, state: TransportState) -> bool {
        self.emit(TransportEvent::StateChanged(state))
    }
}

/// Transport operation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to create transport: {0}")]
    Create(String),

    #[error("failed to attach track: {0}")]
    AddTrack(String),

    #[error("failed to create description: {0}")]
    CreateDescription(String),

    #[error("failed to apply description: {0}")]
    SetDescription(String),

    #[error("failed to apply candidate: {0}")]
    Candidate(String),

    #[error("transport closed")]
    Closed,
}

/// One direct connection to a remote participant
///
/// Methods may suspend (candidate gathering, key setup). The controller
/// awaits each one before issuing the next.
#[async_trait]
pub trait PeerTransport: Send {
    /// Attach a local outgoing track
    async fn add_track(&mut self, track: &LocalTrack) -> Result<(), TransportError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Release the connection. Must tolerate repeated calls.
    async fn close(&mut self);
}

/// Creates a transport per peer link
#[async_trait]
pub trait TransportFactory: Send + Sync {
    type Transport: PeerTransport;

    async fn create(
        &self,
        config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<Self::Transport, TransportError>;
}
