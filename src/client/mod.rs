//! Participant client
//!
//! Runs one broadcaster or viewer against a signaling server:
//! - Connects and joins a room
//! - Drives peer setup through a [`SetupController`](crate::peer::SetupController)
//! - Reports progress as [`PresentationEvent`](crate::peer::PresentationEvent)s

pub mod config;
pub mod session;

pub use config::ClientConfig;
pub use session::{ParticipantSession, SessionHandle};
