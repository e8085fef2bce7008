//! swiper-services — the discovery runtime.
//!
//! A `Swiper` is built from an injected `ChannelRegistry` (itself wrapping a
//! `Transport`) and a `Clock`, then spawns watchers and announcers that
//! rotate through rendezvous channels window by window.

mod announcer;
pub mod memory;
pub mod registry;
pub mod swiper;
pub mod task;
pub mod transport;
mod watcher;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use registry::ChannelRegistry;
pub use swiper::{Swiper, Watch};
pub use task::DiscoveryTask;
pub use transport::{PeerEvents, Topic, Transport, TransportError};
