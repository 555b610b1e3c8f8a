//! Room registry
//!
//! The registry knows which rooms are live, who broadcasts in each, and
//! which viewers have joined. It relays offers, answers and candidates
//! between the two connections named in each message and never looks at
//! their payload.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<RoomRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ Mutex<RegistryState {        │
//!                  │   connections: id → {tx,tag},│
//!                  │   rooms: room → Room {       │
//!                  │     broadcaster_id,          │
//!                  │     viewer_ids,              │
//!                  │   },                         │
//!                  │ }>                           │
//!                  └──────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [Broadcaster conn]       [Viewer conn]           [Viewer conn]
//!   join_as_broadcaster()    join_as_viewer()        relay(answer)
//!         │                       │                       │
//!         └──► outbox (collected under lock) ──► tx.try_send() after unlock
//! ```
//!
//! # Room lifetime
//!
//! A room is created when a broadcaster joins and destroyed when that
//! broadcaster leaves. Its viewers are told `broadcaster-left` and stay
//! tagged with the room id as waiting viewers; if a new broadcaster later
//! claims the same id they are told `broadcaster-present`.
//!
//! # Backpressure
//!
//! Each connection has a bounded outbound queue
//! ([`RegistryConfig::outbound_capacity`]). Delivery never waits: a message
//! for a full queue is dropped, logged at `warn` and counted in
//! [`RegistryStats::dropped`](crate::stats::RegistryStats::dropped).

pub mod config;
pub mod error;
pub mod room;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use room::{ConnectionTag, RoomSnapshot};
pub use store::RoomRegistry;
