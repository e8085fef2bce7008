//! The swiper — rendezvous-based peer discovery over a pubsub transport.
//!
//! Two nodes that know the same resource id and seed compute the same
//! channel id for every time window and meet on it. Watchers listen on the
//! current window's channel for arrivals; announcers simply stay subscribed
//! to it. Neither talks to the other; convergence happens on the transport.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use swiper_core::config::{ConfigError, DiscoveryConfig};
use swiper_core::{ChannelId, Clock, DiscoveredPeer, Window};

use crate::registry::ChannelRegistry;
use crate::task::DiscoveryTask;

/// Shared discovery engine. Cheap to clone; clones share registry, clock and
/// cancellation scope.
#[derive(Clone)]
pub struct Swiper {
    pub(crate) registry: Arc<ChannelRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    interval: Duration,
    peer_buffer: usize,
    root: CancellationToken,
}

/// A running watcher: the discovered-peer stream and its task.
pub struct Watch {
    pub peers: mpsc::Receiver<DiscoveredPeer>,
    pub task: DiscoveryTask,
}

impl Swiper {
    /// A swiper with its own top-level cancellation scope.
    pub fn new(
        registry: Arc<ChannelRegistry>,
        clock: Arc<dyn Clock>,
        config: &DiscoveryConfig,
    ) -> Result<Self, ConfigError> {
        Self::build(registry, clock, config, CancellationToken::new())
    }

    /// A swiper whose scope is a child of `parent`: cancelling `parent`
    /// stops every task spawned through it and all of its clones.
    pub fn scoped(
        registry: Arc<ChannelRegistry>,
        clock: Arc<dyn Clock>,
        config: &DiscoveryConfig,
        parent: &CancellationToken,
    ) -> Result<Self, ConfigError> {
        Self::build(registry, clock, config, parent.child_token())
    }

    fn build(
        registry: Arc<ChannelRegistry>,
        clock: Arc<dyn Clock>,
        config: &DiscoveryConfig,
        root: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            registry,
            clock,
            interval: config.interval(),
            peer_buffer: config.peer_buffer,
            root,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// The window the clock is in right now.
    pub fn current_window(&self) -> Window {
        Window::containing(self.clock.now(), self.interval)
    }

    /// Rendezvous point for `resource` in the current window.
    pub fn rendezvous_point(&self, resource: &[u8], seed: &[u8]) -> ChannelId {
        self.current_window().rendezvous_point(resource, seed)
    }

    /// Start watching `resource` in the background.
    ///
    /// The task stops when `cancel`, the swiper's scope, or the returned
    /// task handle is cancelled, or when `peers` is dropped.
    pub fn watch(&self, resource: &[u8], seed: &[u8], cancel: &CancellationToken) -> Watch {
        let (tx, rx) = mpsc::channel(self.peer_buffer);
        let swiper = self.clone();
        let resource = resource.to_vec();
        let seed = seed.to_vec();
        let task = self.spawn_scoped(cancel, move |token| async move {
            swiper.watch_topic(&resource, &seed, tx, token).await
        });
        Watch { peers: rx, task }
    }

    /// Start announcing presence on `resource` in the background.
    pub fn announce(&self, resource: &[u8], seed: &[u8], cancel: &CancellationToken) -> DiscoveryTask {
        let swiper = self.clone();
        let resource = resource.to_vec();
        let seed = seed.to_vec();
        self.spawn_scoped(cancel, move |token| async move {
            swiper.announce_topic(&resource, &seed, token).await
        })
    }

    /// Cancel every task spawned through this swiper or its clones.
    pub fn shutdown_all(&self) {
        self.root.cancel();
    }

    /// First window after `prev`. Normally the clock's current window, but
    /// never `prev` itself if the wall clock lags the timer that woke us.
    pub(crate) fn window_after(&self, prev: &Window) -> Window {
        let current = self.current_window();
        if current.start >= prev.end {
            current
        } else {
            prev.next()
        }
    }

    /// Spawn `run` under a child of `parent`, also cancelled with the
    /// swiper's scope. Cancellation always lets `run` finish its cleanup.
    fn spawn_scoped<F>(
        &self,
        parent: &CancellationToken,
        run: impl FnOnce(CancellationToken) -> F,
    ) -> DiscoveryTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let root = self.root.clone();
        let link = token.clone();
        let fut = run(token.clone());

        let handle = tokio::spawn(async move {
            tokio::pin!(fut);
            tokio::select! {
                _ = &mut fut => return,
                _ = root.cancelled() => link.cancel(),
            }
            fut.await;
        });
        DiscoveryTask::new(token, handle)
    }
}
