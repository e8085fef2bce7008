//! swiper-core — rendezvous scheduling, identifiers, clocks and configuration.
//! The runtime crates depend on this one; nothing here performs network I/O.

pub mod clock;
pub mod config;
pub mod peer;
pub mod rendezvous;

pub use clock::{AnchoredClock, Clock, SystemClock};
pub use peer::{DiscoveredPeer, PeerEvent, PeerEventKind, PeerId};
pub use rendezvous::{
    generate_rendezvous_point_for_period, next_time_period, round_time_period, ChannelId, Window,
};
