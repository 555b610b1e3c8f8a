//! Participant configuration

use std::time::Duration;

use crate::peer::{TransportConfig, DEFAULT_ICE_SERVER};
use crate::protocol::{Role, RoomId};

/// Participant connection options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Signaling server URL (e.g. `ws://localhost:3000`)
    pub url: String,

    /// Room to create or join
    pub room_id: RoomId,

    pub role: Role,

    /// STUN/TURN servers handed to every transport
    pub ice_servers: Vec<String>,

    /// Signaling connection must open within this time
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a config for `role` in `room_id`
    pub fn new(url: impl Into<String>, room_id: impl Into<RoomId>, role: Role) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            role,
            ice_servers: vec![DEFAULT_ICE_SERVER.to_owned()],
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Broadcaster creating `room_id`
    pub fn broadcaster(url: impl Into<String>, room_id: impl Into<RoomId>) -> Self {
        Self::new(url, room_id, Role::Broadcaster)
    }

    /// Viewer joining `room_id`
    pub fn viewer(url: impl Into<String>, room_id: impl Into<RoomId>) -> Self {
        Self::new(url, room_id, Role::Viewer)
    }

    /// Replace the ICE server list
    pub fn ice_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ice_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Settings for each new transport
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}
