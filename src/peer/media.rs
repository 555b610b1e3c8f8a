//! Local media capture
//!
//! The controller never touches devices itself. A `MediaSource` hands it
//! a set of `LocalTrack`s which are attached to every new peer link.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Handle to one captured track
///
/// Clones share the enabled flag, so muting a track mutes it on every
/// link it was attached to.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Media capture failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user or platform refused device access
    #[error("media access denied")]
    PermissionDenied,

    /// No usable capture device
    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Source of local audio/video tracks
#[async_trait]
pub trait MediaSource: Send {
    /// Open devices and return the captured tracks
    async fn start(&mut self) -> Result<Vec<LocalTrack>, MediaError>;

    /// Release devices
    async fn stop(&mut self);
}

/// Source that captures nothing
///
/// For participants that only receive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiveOnly;

#[async_trait]
impl MediaSource for ReceiveOnly {
    async fn start(&mut self) -> Result<Vec<LocalTrack>, MediaError> {
        Ok(Vec::new())
    }

    async fn stop(&mut self) {}
}
