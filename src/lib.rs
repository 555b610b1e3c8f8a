//! Signaling relay and peer connection setup for one-to-many live broadcasts
//!
//! A broadcaster creates a room; viewers join it. The server only relays
//! offer/answer/candidate messages between them. Media flows directly
//! between participants over transports supplied by the application.
//!
//! # Server
//! ```no_run
//! use peercast::{ServerConfig, SignalServer};
//!
//! # async fn example() -> peercast::Result<()> {
//! let server = SignalServer::new(ServerConfig::default());
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Participants
//! See [`client::ParticipantSession`] and the [`peer`] module for the
//! transport and media seams.

pub mod client;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use registry::RoomRegistry;
pub use server::{ServerConfig, SignalServer};
