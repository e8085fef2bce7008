//! Peer identities and the events a transport reports for a channel.

use std::fmt;

/// A remote node's network identity (its public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Identity derived from a human-readable label. Used by the loopback
    /// transport and the simulator, where no key material exists.
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// First 8 bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEventKind {
    /// The peer subscribed to the channel and is discoverable.
    Join,
    /// The peer left; it may no longer be reachable.
    Leave,
}

/// A membership change observed on one open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEvent {
    pub peer: PeerId,
    pub kind: PeerEventKind,
}

impl PeerEvent {
    pub fn join(peer: PeerId) -> Self {
        Self {
            peer,
            kind: PeerEventKind::Join,
        }
    }

    pub fn leave(peer: PeerId) -> Self {
        Self {
            peer,
            kind: PeerEventKind::Leave,
        }
    }
}

/// A peer found by a watcher. At-least-once per observed arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveredPeer {
    pub id: PeerId,
}

impl From<PeerId> for DiscoveredPeer {
    fn from(id: PeerId) -> Self {
        Self { id }
    }
}
