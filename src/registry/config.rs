//! Registry configuration

/// Default upper bound on room id length in bytes
pub const DEFAULT_MAX_ROOM_ID_LEN: usize = 64;

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 128;

/// Room registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Only relay between members of the same room
    ///
    /// When disabled, any live connection may address any other live
    /// connection.
    pub verify_relay_peers: bool,

    /// Maximum room id length in bytes (after trimming)
    pub max_room_id_len: usize,

    /// Messages queued per connection before new ones are dropped
    ///
    /// A participant that stops reading its socket cannot stall relays
    /// from others.
    pub outbound_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            verify_relay_peers: false,
            max_room_id_len: DEFAULT_MAX_ROOM_ID_LEN,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Require relay sender and addressee to share a room
    pub fn verify_relay_peers(mut self, verify: bool) -> Self {
        self.verify_relay_peers = verify;
        self
    }

    /// Set the maximum room id length
    pub fn max_room_id_len(mut self, len: usize) -> Self {
        self.max_room_id_len = len;
        self
    }

    /// Set the per-connection outbound queue depth (at least 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}
