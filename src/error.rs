//! Error types
//!
//! Crate-level error returned by the server listener, connection handlers
//! and client sessions. Domain errors from the registry and peer layers
//! convert into it with `?`.

use std::time::Duration;

use thiserror::Error;

use crate::peer::{MediaError, TransportError};
use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Room registry rejected an operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Peer transport failed an offer/answer/candidate step
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local media capture failed
    #[error(transparent)]
    Media(#[from] MediaError),

    /// The other end of a channel or socket went away
    #[error("connection closed")]
    ConnectionClosed,

    /// An operation did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
