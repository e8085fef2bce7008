//! In-process loopback transport.
//!
//! `MemoryNetwork` is a shared hub of channels; each `MemoryTransport` is one
//! node attached to it. Membership follows pubsub semantics: subscribers see
//! a join for every member already present, then joins and leaves as they
//! happen. A node never sees events about itself.
//!
//! Used by `swiperd`'s simulation and by the test suites. The failure
//! switches let tests drive the error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use swiper_core::{ChannelId, PeerEvent, PeerId};

use crate::transport::{PeerEvents, Topic, Transport, TransportError};

// ── Network ───────────────────────────────────────────────────────────────────

struct Subscriber {
    owner: PeerId,
    /// Topic instance the subscription was taken on.
    topic: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

#[derive(Default)]
struct ChannelState {
    /// Open topic instances per member node.
    members: HashMap<PeerId, usize>,
    subscribers: Vec<Subscriber>,
}

impl ChannelState {
    /// Deliver `event` to every subscriber except those owned by its subject.
    /// Subscribers whose receiver is gone are pruned.
    fn publish(&mut self, event: PeerEvent) {
        self.subscribers
            .retain(|sub| sub.owner == event.peer || sub.tx.send(event).is_ok());
    }

    fn is_idle(&self) -> bool {
        self.members.is_empty() && self.subscribers.is_empty()
    }
}

/// Shared hub. Cheap to clone; clones see the same channels.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    channels: Arc<DashMap<ChannelId, ChannelState>>,
    next_topic: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new node with identity `id`.
    pub fn node(&self, id: PeerId) -> MemoryTransport {
        MemoryTransport {
            node: Arc::new(Node {
                id,
                network: self.clone(),
                opens: AtomicUsize::new(0),
                failing_opens: AtomicUsize::new(0),
                open_error: Mutex::new(injected_unavailable()),
                fail_relay: AtomicBool::new(false),
                relaying: DashSet::new(),
            }),
        }
    }

    /// Nodes currently subscribed to `channel`.
    pub fn members(&self, channel: &ChannelId) -> Vec<PeerId> {
        self.channels
            .get(channel)
            .map(|state| state.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Channels with at least one member.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|entry| !entry.value().members.is_empty())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drop every event subscription on `channel`, as a transport would when
    /// its connection to the channel breaks. Membership is unchanged.
    pub fn sever_subscriptions(&self, channel: &ChannelId) {
        if let Some(mut state) = self.channels.get_mut(channel) {
            state.subscribers.clear();
        }
    }

    fn add_member(&self, channel: ChannelId, peer: PeerId) {
        let mut state = self.channels.entry(channel).or_default();
        let count = state.members.entry(peer).or_insert(0);
        *count += 1;
        if *count == 1 {
            state.publish(PeerEvent::join(peer));
        }
    }

    /// Returns true if `peer` is no longer a member.
    fn remove_member(&self, channel: &ChannelId, peer: PeerId, topic: u64) -> bool {
        let gone = match self.channels.get_mut(channel) {
            Some(mut state) => {
                state.subscribers.retain(|sub| sub.topic != topic);
                let remaining = match state.members.get_mut(&peer) {
                    Some(count) => {
                        *count -= 1;
                        *count
                    }
                    None => 0,
                };
                if remaining == 0 {
                    state.members.remove(&peer);
                    state.publish(PeerEvent::leave(peer));
                }
                remaining == 0
            }
            None => true,
        };
        self.channels.remove_if(channel, |_, state| state.is_idle());
        gone
    }

    fn subscribe(&self, channel: ChannelId, owner: PeerId, topic: u64) -> PeerEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.channels.entry(channel).or_default();
        for peer in state.members.keys().filter(|peer| **peer != owner) {
            // Receiver is still in hand, send cannot fail.
            let _ = tx.send(PeerEvent::join(*peer));
        }
        state.subscribers.push(Subscriber { owner, topic, tx });
        rx
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

struct Node {
    id: PeerId,
    network: MemoryNetwork,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    /// Returned by the injected open failures.
    open_error: Mutex<TransportError>,
    fail_relay: AtomicBool,
    relaying: DashSet<ChannelId>,
}

/// One node on a `MemoryNetwork`.
#[derive(Clone)]
pub struct MemoryTransport {
    node: Arc<Node>,
}

impl MemoryTransport {
    pub fn id(&self) -> PeerId {
        self.node.id
    }

    /// Transport-level opens attempted so far, failed ones included.
    pub fn open_count(&self) -> usize {
        self.node.opens.load(Ordering::SeqCst)
    }

    /// Make the next `n` opens fail with `Unavailable`.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_next_opens_with(n, injected_unavailable());
    }

    /// Make the next `n` opens fail with `error`.
    pub fn fail_next_opens_with(&self, n: usize, error: TransportError) {
        *self.open_error() = error;
        self.node.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Make relay requests fail while set.
    pub fn fail_relay(&self, fail: bool) {
        self.node.fail_relay.store(fail, Ordering::SeqCst);
    }

    pub fn is_member(&self, channel: &ChannelId) -> bool {
        self.node.network.members(channel).contains(&self.node.id)
    }

    pub fn is_relaying(&self, channel: &ChannelId) -> bool {
        self.node.relaying.contains(channel)
    }

    fn take_injected_failure(&self) -> Option<TransportError> {
        self.node
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| self.open_error().clone())
    }

    fn open_error(&self) -> MutexGuard<'_, TransportError> {
        self.node
            .open_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected_unavailable() -> TransportError {
    TransportError::Unavailable("injected open failure".into())
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, channel: &ChannelId) -> Result<Arc<dyn Topic>, TransportError> {
        self.node.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }

        let node = &self.node;
        node.network.add_member(*channel, node.id);
        Ok(Arc::new(MemoryTopic {
            channel: *channel,
            instance: node.network.next_topic.fetch_add(1, Ordering::SeqCst),
            node: node.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

// ── Topic ─────────────────────────────────────────────────────────────────────

struct MemoryTopic {
    channel: ChannelId,
    instance: u64,
    node: Arc<Node>,
    closed: AtomicBool,
}

impl MemoryTopic {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Topic for MemoryTopic {
    async fn relay(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.node.fail_relay.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                channel: self.channel,
                reason: "relay refused".into(),
            });
        }
        self.node.relaying.insert(self.channel);
        Ok(())
    }

    async fn subscribe(&self) -> Result<PeerEvents, TransportError> {
        self.ensure_open()?;
        Ok(self
            .node
            .network
            .subscribe(self.channel, self.node.id, self.instance))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        if self
            .node
            .network
            .remove_member(&self.channel, self.node.id, self.instance)
        {
            self.node.relaying.remove(&self.channel);
        }
        Ok(())
    }
}
