//! Peer link state machine
//!
//! Tracks one direct connection from creation to teardown.
//!
//! ```text
//! broadcaster:  Idle ─► OfferPending ─(answer)─► Connecting ─► Connected
//! viewer:       Idle ─(offer)─► AnswerPending ─► Connecting ─► Connected
//! any non-terminal ─► Closed | Failed
//! ```

use std::time::Instant;

use thiserror::Error;

use super::media::LocalTrack;
use super::transport::{PeerTransport, TransportError};
use crate::protocol::{ConnectionId, IceCandidate, SdpType, SessionDescription};

/// Link lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Transport created, nothing negotiated
    Idle,
    /// Local offer being produced or sent; waiting for the answer
    OfferPending,
    /// Remote offer applied; local answer being produced
    AnswerPending,
    /// Descriptions exchanged; waiting for the transport to connect
    Connecting,
    /// Transport reports connected
    Connected,
    /// Torn down on request
    Closed,
    /// Torn down after a transport failure
    Failed,
}

impl LinkPhase {
    /// Closed and Failed are absorbing
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkPhase::Closed | LinkPhase::Failed)
    }
}

/// Why a link operation did not happen
#[derive(Debug, Error)]
pub enum LinkError {
    /// Message arrived in a phase that cannot use it
    #[error("stale {what} in phase {phase:?}")]
    Stale { what: &'static str, phase: LinkPhase },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One in-progress or established direct connection
#[derive(Debug)]
pub struct PeerLink<T> {
    remote: ConnectionId,

    generation: u64,

    phase: LinkPhase,

    transport: T,

    created_at: Instant,

    connected_at: Option<Instant>,

    /// Local description committed to the transport
    local_description: Option<SessionDescription>,

    tracks_attached: usize,

    candidates_sent: u64,

    candidates_applied: u64,
}

impl<T: PeerTransport> PeerLink<T> {
    /// Create a link in `Idle`
    pub fn new(remote: ConnectionId, generation: u64, transport: T) -> Self {
        Self {
            remote,
            generation,
            phase: LinkPhase::Idle,
            transport,
            created_at: Instant::now(),
            connected_at: None,
            local_description: None,
            tracks_attached: 0,
            candidates_sent: 0,
            candidates_applied: 0,
        }
    }

    pub fn remote(&self) -> ConnectionId {
        self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tracks_attached(&self) -> usize {
        self.tracks_attached
    }

    pub fn candidates_sent(&self) -> u64 {
        self.candidates_sent
    }

    pub fn candidates_applied(&self) -> u64 {
        self.candidates_applied
    }

    /// Time from creation until the transport connected
    pub fn setup_time(&self) -> Option<std::time::Duration> {
        self.connected_at
            .map(|at| at.duration_since(self.created_at))
    }

    /// Attach local outgoing tracks
    pub async fn attach_tracks(&mut self, tracks: &[LocalTrack]) -> Result<(), LinkError> {
        self.expect_phase(LinkPhase::Idle, "track attach")?;
        for track in tracks {
            self.transport.add_track(track).await?;
            self.tracks_attached += 1;
        }
        Ok(())
    }

    /// Produce and commit the local offer
    ///
    /// Returns the offer only after it is set as the local description, so
    /// it is never relayed uncommitted.
    pub async fn create_offer(&mut self) -> Result<SessionDescription, LinkError> {
        self.expect_phase(LinkPhase::Idle, "offer")?;
        self.phase = LinkPhase::OfferPending;

        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        self.local_description = Some(offer.clone());
        Ok(offer)
    }

    /// Apply the remote offer, then produce and commit the local answer
    pub async fn accept_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, LinkError> {
        self.expect_phase(LinkPhase::Idle, "offer")?;
        if offer.sdp_type != SdpType::Offer {
            return Err(LinkError::Stale {
                what: "non-offer description",
                phase: self.phase,
            });
        }

        self.transport.set_remote_description(offer).await?;
        self.phase = LinkPhase::AnswerPending;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        self.local_description = Some(answer.clone());
        Ok(answer)
    }

    /// Record that the committed answer was sent
    pub fn answer_sent(&mut self) {
        if self.phase == LinkPhase::AnswerPending {
            self.phase = LinkPhase::Connecting;
        }
    }

    /// Apply the remote answer to our committed offer
    pub async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), LinkError> {
        if self.phase != LinkPhase::OfferPending || self.local_description.is_none() {
            return Err(LinkError::Stale {
                what: "answer",
                phase: self.phase,
            });
        }
        if answer.sdp_type != SdpType::Answer {
            return Err(LinkError::Stale {
                what: "non-answer description",
                phase: self.phase,
            });
        }

        self.transport.set_remote_description(answer).await?;
        self.phase = LinkPhase::Connecting;
        Ok(())
    }

    /// Apply a remote candidate in any live phase
    pub async fn apply_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError> {
        if self.phase.is_terminal() {
            return Err(LinkError::Stale {
                what: "candidate",
                phase: self.phase,
            });
        }
        self.transport.add_ice_candidate(candidate).await?;
        self.candidates_applied += 1;
        Ok(())
    }

    /// Whether a locally gathered candidate may be sent
    pub fn local_candidate(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.candidates_sent += 1;
        true
    }

    /// Transport reports connected
    ///
    /// Only completes a link whose descriptions are exchanged.
    pub fn transport_connected(&mut self) -> bool {
        if self.phase == LinkPhase::Connecting {
            self.phase = LinkPhase::Connected;
            self.connected_at = Some(Instant::now());
            true
        } else {
            false
        }
    }

    /// Tear down on request. Idempotent.
    pub async fn close(&mut self) {
        self.terminate(LinkPhase::Closed).await;
    }

    /// Tear down after failure. Idempotent.
    pub async fn fail(&mut self) {
        self.terminate(LinkPhase::Failed).await;
    }

    async fn terminate(&mut self, phase: LinkPhase) {
        if self.phase.is_terminal() {
            return;
        }
        self.transport.close().await;
        self.phase = phase;
    }

    fn expect_phase(&self, expected: LinkPhase, what: &'static str) -> Result<(), LinkError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(LinkError::Stale {
                what,
                phase: self.phase,
            })
        }
    }
}
