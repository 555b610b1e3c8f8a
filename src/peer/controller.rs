//! Peer setup controller
//!
//! Drives offer/answer/candidate exchange for every peer link of one
//! participant. A broadcaster holds one link per viewer and always makes
//! the offer. A viewer holds at most one link, to its broadcaster, and
//! always answers.
//!
//! The controller is fed from two sources, both on the participant's task:
//!
//! ```text
//!   registry ── ServerMessage ──► handle_server_message ─┐
//!                                                        ├─► ClientMessage ──► registry
//!   transports ── LinkEvent ────► handle_link_event ─────┘
//!                                                        └─► PresentationEvent ──► UI
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::events::{Connectivity, PresentationEvent, RemovalReason, RoomError};
use super::link::{LinkError, LinkPhase, PeerLink};
use super::media::{LocalTrack, MediaSource, TrackKind};
use super::transport::{
    LinkEvent, TransportConfig, TransportEvent, TransportEvents, TransportFactory, TransportState,
};
use crate::protocol::{
    from_payload, to_payload, ClientMessage, ConnectionId, IceCandidate, Role, RoomId,
    ServerMessage, SessionDescription, SignalKind,
};

/// Viewer re-join progress after its broadcaster left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejoin {
    Idle,
    /// Rejoin on the next `broadcaster-present`
    Waiting,
    /// `join-viewer` sent, not yet confirmed
    Sent,
}

/// Per-participant peer setup state
pub struct SetupController<F: TransportFactory> {
    role: Role,
    room_id: RoomId,
    factory: F,
    transport_config: TransportConfig,

    /// Outgoing frames for the registry
    signaling: mpsc::UnboundedSender<ClientMessage>,
    presentation: mpsc::UnboundedSender<PresentationEvent>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,

    links: HashMap<ConnectionId, PeerLink<F::Transport>>,
    tracks: Vec<LocalTrack>,
    local_id: Option<ConnectionId>,
    next_generation: u64,

    rejoin: Rejoin,
    shut_down: bool,
}

impl<F: TransportFactory> SetupController<F> {
    /// Create a controller
    ///
    /// Returns the controller and the receiver for transport events. Feed
    /// every received event back through [`handle_link_event`].
    ///
    /// [`handle_link_event`]: SetupController::handle_link_event
    pub fn new(
        role: Role,
        room_id: RoomId,
        factory: F,
        transport_config: TransportConfig,
        signaling: mpsc::UnboundedSender<ClientMessage>,
        presentation: mpsc::UnboundedSender<PresentationEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let controller = Self {
            role,
            room_id,
            factory,
            transport_config,
            signaling,
            presentation,
            link_tx,
            links: HashMap::new(),
            tracks: Vec::new(),
            local_id: None,
            next_generation: 0,
            rejoin: Rejoin::Idle,
            shut_down: false,
        };

        (controller, link_rx)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Registry-assigned identity, once welcomed
    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    /// Phase of the live link to `remote`
    pub fn link_phase(&self, remote: ConnectionId) -> Option<LinkPhase> {
        self.links.get(&remote).map(PeerLink::phase)
    }

    /// Number of live links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Acquire local tracks
    ///
    /// Denied or missing devices are not fatal: the participant continues
    /// with zero tracks.
    pub async fn start_media<M: MediaSource + ?Sized>(&mut self, media: &mut M) {
        match media.start().await {
            Ok(tracks) => {
                tracing::info!(tracks = tracks.len(), "Local media ready");
                self.emit(PresentationEvent::LocalMedia {
                    tracks: tracks.iter().map(LocalTrack::kind).collect(),
                    permission_granted: true,
                });
                self.tracks = tracks;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Local media unavailable, continuing without tracks");
                self.tracks.clear();
                self.emit(PresentationEvent::LocalMedia {
                    tracks: Vec::new(),
                    permission_granted: false,
                });
            }
        }
    }

    /// Ask the registry to join the configured room
    pub fn join(&self) {
        let room_id = self.room_id.clone();
        let message = match self.role {
            Role::Broadcaster => ClientMessage::JoinBroadcaster { room_id },
            Role::Viewer => ClientMessage::JoinViewer { room_id },
        };
        tracing::debug!(room = %self.room_id, role = %self.role, "Joining room");
        self.send(message);
    }

    /// Enable or disable every local track of `kind`
    ///
    /// Returns how many tracks were changed.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> usize {
        let mut changed = 0;
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
            changed += 1;
        }
        changed
    }

    /// React to one registry message
    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Welcome { id } => {
                tracing::info!(id = %id, "Registered with signaling server");
                self.local_id = Some(id);
                self.emit(PresentationEvent::Identity(id));
            }
            ServerMessage::RoomExists { room_id } => {
                self.emit(PresentationEvent::RoomError(RoomError::RoomExists(room_id)));
            }
            ServerMessage::RoomNotFound { room_id } => {
                if self.rejoin == Rejoin::Sent {
                    // The registry still lists us as waiting for this room
                    self.rejoin = Rejoin::Waiting;
                    tracing::debug!(room = %room_id, "Broadcaster gone again before rejoin, waiting");
                } else {
                    self.emit(PresentationEvent::RoomError(RoomError::RoomNotFound(room_id)));
                }
            }
            ServerMessage::BroadcasterPresent => match self.rejoin {
                Rejoin::Waiting => {
                    self.rejoin = Rejoin::Sent;
                    tracing::info!(room = %self.room_id, "Broadcaster back, rejoining");
                    self.join();
                }
                Rejoin::Sent | Rejoin::Idle => {
                    self.rejoin = Rejoin::Idle;
                    self.emit(PresentationEvent::BroadcasterPresent);
                }
            },
            ServerMessage::ViewerJoined { viewer_id } => self.open_offer(viewer_id).await,
            ServerMessage::Offer { from, payload } => self.accept_offer(from, &payload).await,
            ServerMessage::Answer { from, payload } => self.apply_answer(from, &payload).await,
            ServerMessage::Candidate { from, payload } => {
                self.apply_candidate(from, &payload).await
            }
            ServerMessage::ViewerLeft { viewer_id } => {
                self.close_link(viewer_id, RemovalReason::PeerLeft).await;
            }
            ServerMessage::BroadcasterLeft => {
                self.close_all(RemovalReason::PeerLeft).await;
                if self.role == Role::Viewer {
                    self.rejoin = Rejoin::Waiting;
                }
                self.emit(PresentationEvent::BroadcasterLeft);
            }
            ServerMessage::Error { message } => {
                tracing::warn!(error = %message, "Signaling server rejected a message");
                self.emit(PresentationEvent::ServerError(message));
            }
        }
    }

    /// React to one transport event
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        let LinkEvent {
            remote,
            generation,
            event,
        } = event;

        let Some(link) = self.links.get_mut(&remote) else {
            tracing::debug!(remote = %remote, "Event for unknown link discarded");
            return;
        };
        if link.generation() != generation {
            tracing::debug!(remote = %remote, generation, "Event from replaced link discarded");
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if link.local_candidate() {
                    self.relay(SignalKind::Candidate, remote, &candidate);
                }
            }
            TransportEvent::RemoteStream(stream) => {
                tracing::debug!(remote = %remote, stream = %stream.stream_id, "Remote stream");
                self.emit(PresentationEvent::RemoteStream { remote, stream });
            }
            TransportEvent::StateChanged(TransportState::Connected) => {
                if link.transport_connected() {
                    tracing::info!(
                        remote = %remote,
                        setup_ms = link.setup_time().map(|d| d.as_millis() as u64),
                        "Peer connected"
                    );
                    self.emit_connectivity(remote, Connectivity::Connected);
                } else {
                    tracing::debug!(remote = %remote, phase = ?link.phase(), "Early connected report ignored");
                }
            }
            TransportEvent::StateChanged(TransportState::Failed) => {
                self.fail_link(remote, &"transport failed").await;
            }
            TransportEvent::StateChanged(state) => {
                if let Some(connectivity) = Connectivity::from_transport(state) {
                    self.emit_connectivity(remote, connectivity);
                }
            }
        }
    }

    /// Send `leave` and tear down every link. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.send(ClientMessage::Leave {
            room_id: self.room_id.clone(),
        });
        self.close_all(RemovalReason::LocalLeave).await;
    }

    async fn open_offer(&mut self, viewer: ConnectionId) {
        if self.role != Role::Broadcaster {
            tracing::debug!(viewer = %viewer, "Viewer-joined ignored by viewer");
            return;
        }

        if self.links.contains_key(&viewer) {
            self.close_link(viewer, RemovalReason::Replaced).await;
        }
        self.emit(PresentationEvent::ViewerJoined(viewer));

        let mut link = match self.open_link(viewer).await {
            Ok(link) => link,
            Err(e) => return self.setup_failed(viewer, &e),
        };

        match link.create_offer().await {
            Ok(offer) => {
                self.links.insert(viewer, link);
                self.relay(SignalKind::Offer, viewer, &offer);
                tracing::debug!(viewer = %viewer, "Offer sent");
                self.emit_connectivity(viewer, Connectivity::Connecting);
            }
            Err(e) => {
                link.fail().await;
                self.setup_failed(viewer, &e);
            }
        }
    }

    async fn accept_offer(&mut self, from: ConnectionId, payload: &Value) {
        if self.role != Role::Viewer {
            tracing::debug!(from = %from, "Offer ignored by broadcaster");
            return;
        }

        let offer: SessionDescription = match from_payload(payload) {
            Ok(offer) => offer,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Unreadable offer discarded");
                return;
            }
        };

        // A viewer talks to one broadcaster at a time
        let existing: Vec<ConnectionId> = self.links.keys().copied().collect();
        for remote in existing {
            self.close_link(remote, RemovalReason::Replaced).await;
        }

        let mut link = match self.open_link(from).await {
            Ok(link) => link,
            Err(e) => return self.setup_failed(from, &e),
        };

        match link.accept_offer(offer).await {
            Ok(answer) => {
                self.relay(SignalKind::Answer, from, &answer);
                link.answer_sent();
                self.links.insert(from, link);
                tracing::debug!(broadcaster = %from, "Answer sent");
                self.emit_connectivity(from, Connectivity::Connecting);
            }
            Err(e) => {
                link.fail().await;
                self.setup_failed(from, &e);
            }
        }
    }

    async fn apply_answer(&mut self, from: ConnectionId, payload: &Value) {
        let answer: SessionDescription = match from_payload(payload) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Unreadable answer discarded");
                return;
            }
        };

        let Some(link) = self.links.get_mut(&from) else {
            tracing::debug!(from = %from, "Answer for unknown link discarded");
            return;
        };

        match link.apply_answer(answer).await {
            Ok(()) => tracing::debug!(viewer = %from, "Answer applied"),
            Err(e @ LinkError::Stale { .. }) => {
                tracing::debug!(from = %from, error = %e, "Answer discarded");
            }
            Err(e) => self.fail_link(from, &e).await,
        }
    }

    async fn apply_candidate(&mut self, from: ConnectionId, payload: &Value) {
        let candidate: IceCandidate = match from_payload(payload) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Unreadable candidate discarded");
                return;
            }
        };

        let Some(link) = self.links.get_mut(&from) else {
            tracing::debug!(from = %from, "Candidate for unknown link discarded");
            return;
        };

        // One bad path does not doom the link
        if let Err(e) = link.apply_candidate(candidate).await {
            tracing::debug!(from = %from, error = %e, "Candidate not applied");
        }
    }

    async fn open_link(&mut self, remote: ConnectionId) -> Result<PeerLink<F::Transport>, LinkError> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let events = TransportEvents::new(remote, generation, self.link_tx.clone());

        let transport = self.factory.create(&self.transport_config, events).await?;
        let mut link = PeerLink::new(remote, generation, transport);
        if let Err(e) = link.attach_tracks(&self.tracks).await {
            link.fail().await;
            return Err(e);
        }
        Ok(link)
    }

    async fn close_link(&mut self, remote: ConnectionId, reason: RemovalReason) {
        if let Some(mut link) = self.links.remove(&remote) {
            link.close().await;
            tracing::info!(remote = %remote, reason = ?reason, "Peer link closed");
            self.emit(PresentationEvent::PeerRemoved { remote, reason });
        }
    }

    async fn close_all(&mut self, reason: RemovalReason) {
        let remotes: Vec<ConnectionId> = self.links.keys().copied().collect();
        for remote in remotes {
            self.close_link(remote, reason).await;
        }
    }

    async fn fail_link(&mut self, remote: ConnectionId, error: &(dyn fmt::Display + Sync)) {
        if let Some(mut link) = self.links.remove(&remote) {
            link.fail().await;
            self.setup_failed(remote, error);
        }
    }

    fn setup_failed(&self, remote: ConnectionId, error: &(dyn fmt::Display + Sync)) {
        tracing::warn!(remote = %remote, error = %error, "Peer link failed");
        self.emit_connectivity(remote, Connectivity::Failed);
        self.emit(PresentationEvent::PeerRemoved {
            remote,
            reason: RemovalReason::NegotiationFailed,
        });
    }

    fn relay<T: Serialize>(&self, kind: SignalKind, to: ConnectionId, payload: &T) {
        match to_payload(payload) {
            Ok(payload) => self.send(ClientMessage::signal(kind, to, payload)),
            Err(e) => tracing::error!(kind = %kind, to = %to, error = %e, "Failed to encode payload"),
        }
    }

    fn send(&self, message: ClientMessage) {
        if self.signaling.send(message).is_err() {
            tracing::debug!("Signaling channel closed, message dropped");
        }
    }

    fn emit_connectivity(&self, remote: ConnectionId, state: Connectivity) {
        self.emit(PresentationEvent::Connectivity { remote, state });
    }

    fn emit(&self, event: PresentationEvent) {
        let _ = self.presentation.send(event);
    }
}
