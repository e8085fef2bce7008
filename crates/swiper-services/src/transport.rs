//! Transport seam — the publish/subscribe layer discovery runs over.
//!
//! The swiper only needs three things from a transport: open a named
//! channel, turn on relaying for it, and report who joins and leaves. Message
//! delivery is out of scope.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use swiper_core::{ChannelId, PeerEvent};

/// Membership events for one subscription. A closed stream means the
/// transport tore the subscription down.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("peer event stream closed")]
    EventStreamClosed,
    #[error("channel already closed")]
    ChannelClosed,
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("channel {channel} rejected: {reason}")]
    Rejected { channel: ChannelId, reason: String },
}

impl TransportError {
    /// Deadline/cancellation errors happen during normal window rotation.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// A publish/subscribe network a node is attached to.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to `channel`, making this node a member of it.
    async fn open(&self, channel: &ChannelId) -> Result<Arc<dyn Topic>, TransportError>;
}

/// One open channel subscription.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Forward channel traffic without processing it, so membership
    /// propagates beyond direct neighbours.
    async fn relay(&self) -> Result<(), TransportError>;

    /// Start receiving membership events. Current members are reported as
    /// joins first.
    async fn subscribe(&self) -> Result<PeerEvents, TransportError>;

    /// Leave the channel. Closing twice yields `ChannelClosed`.
    async fn close(&self) -> Result<(), TransportError>;
}
