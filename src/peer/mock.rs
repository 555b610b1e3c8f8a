//! Scripted transport for controller tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::media::{LocalTrack, MediaError, MediaSource};
use super::transport::{
    PeerTransport, TransportConfig, TransportError, TransportEvents, TransportFactory,
};
use crate::protocol::{ConnectionId, IceCandidate, SdpType, SessionDescription};

/// Recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    Candidate(String),
    Close,
}

#[derive(Debug)]
pub struct MockTransport {
    label: String,
    fail_on: Option<&'static str>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockTransport {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            fail_on: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, op: &'static str, call: Call) -> Result<(), TransportError> {
        self.calls.lock().push(call);
        if self.fail_on == Some(op) {
            return Err(TransportError::SetDescription(format!("{op} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<(), TransportError> {
        self.record("add_track", Call::AddTrack(track.id().to_owned()))
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.record("create_offer", Call::CreateOffer)?;
        Ok(SessionDescription::offer(format!("offer-{}", self.label)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.record("create_answer", Call::CreateAnswer)?;
        Ok(SessionDescription::answer(format!("answer-{}", self.label)))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record("set_local", Call::SetLocal(description.sdp_type))
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record("set_remote", Call::SetRemote(description.sdp_type))
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record("candidate", Call::Candidate(candidate.candidate))
    }

    async fn close(&mut self) {
        self.calls.lock().push(Call::Close);
    }
}

/// Factory that keeps a handle on every transport it creates
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    inner: Arc<Mutex<FactoryState>>,
}

#[derive(Debug, Default)]
struct FactoryState {
    fail_create: bool,
    fail_on: Option<&'static str>,
    created: Vec<Created>,
}

#[derive(Debug)]
struct Created {
    remote: ConnectionId,
    events: TransportEvents,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self) {
        self.inner.lock().fail_create = true;
    }

    /// Make every transport created from now on fail `op`
    pub fn fail_on(&self, op: &'static str) {
        self.inner.lock().fail_on = Some(op);
    }

    /// Number of transports created so far
    pub fn created(&self) -> usize {
        self.inner.lock().created.len()
    }

    /// Calls on the latest transport created for `remote`
    pub fn calls(&self, remote: ConnectionId) -> Vec<Call> {
        self.latest(remote, |c| c.calls.lock().clone())
            .unwrap_or_default()
    }

    /// Calls on every transport created for `remote`, oldest first
    pub fn all_calls(&self, remote: ConnectionId) -> Vec<Vec<Call>> {
        self.inner
            .lock()
            .created
            .iter()
            .filter(|c| c.remote == remote)
            .map(|c| c.calls.lock().clone())
            .collect()
    }

    /// Event sender of the latest transport created for `remote`
    pub fn events(&self, remote: ConnectionId) -> Option<TransportEvents> {
        self.latest(remote, |c| c.events.clone())
    }

    fn latest<R>(&self, remote: ConnectionId, f: impl FnOnce(&Created) -> R) -> Option<R> {
        self.inner
            .lock()
            .created
            .iter()
            .rev()
            .find(|c| c.remote == remote)
            .map(f)
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    async fn create(
        &self,
        _config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<MockTransport, TransportError> {
        let mut state = self.inner.lock();
        if state.fail_create {
            return Err(TransportError::Create("scripted".into()));
        }

        let mut transport = MockTransport::new(&events.remote().to_string());
        transport.fail_on = state.fail_on;
        state.created.push(Created {
            remote: events.remote(),
            events,
            calls: Arc::clone(&transport.calls),
        });
        Ok(transport)
    }
}

/// Media source with a fixed outcome
#[derive(Debug)]
pub struct ScriptedMedia {
    outcome: Result<Vec<LocalTrack>, MediaError>,
}

impl ScriptedMedia {
    pub fn granted(tracks: Vec<LocalTrack>) -> Self {
        Self {
            outcome: Ok(tracks),
        }
    }

    pub fn denied(error: MediaError) -> Self {
        Self {
            outcome: Err(error),
        }
    }
}

#[async_trait]
impl MediaSource for ScriptedMedia {
    async fn start(&mut self) -> Result<Vec<LocalTrack>, MediaError> {
        self.outcome.clone()
    }

    async fn stop(&mut self) {}
}
