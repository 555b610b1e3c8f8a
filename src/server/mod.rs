//! Signaling server
//!
//! WebSocket front end for the room registry. Each accepted socket gets its
//! own task; all tasks share one `Arc<RoomRegistry>`.

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::SignalServer;
