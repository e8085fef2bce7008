//! Watcher — listens on each window's rendezvous channel for arriving peers.
//!
//! Transport errors never end a watch. A failed window is logged and the
//! watcher tries again on the next one, for as long as it is not cancelled.

use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use swiper_core::{ChannelId, DiscoveredPeer, PeerEventKind};

use crate::swiper::Swiper;
use crate::transport::{PeerEvents, TransportError};

/// Why a window's listen loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    /// The window closed; rotate to the next one.
    Elapsed,
    /// Cancelled, or nobody is reading discovered peers anymore.
    Stopped,
}

impl Swiper {
    /// Watch `resource` until `cancel` fires, sending discovered peers to
    /// `out`.
    ///
    /// Returns only after the current channel has been left, so the caller
    /// can treat the return as the completion signal.
    pub async fn watch_topic(
        &self,
        resource: &[u8],
        seed: &[u8],
        out: mpsc::Sender<DiscoveredPeer>,
        cancel: CancellationToken,
    ) {
        tracing::debug!(interval_secs = self.interval().as_secs(), "watch started");
        let mut window = self.current_window();

        while !cancel.is_cancelled() {
            let channel = window.rendezvous_point(resource, seed);
            match self
                .watch_until_deadline(&channel, window.end, &out, &cancel)
                .await
            {
                Ok(WindowEnd::Elapsed) => {}
                Ok(WindowEnd::Stopped) => break,
                Err(e) => {
                    if e.is_expected() {
                        tracing::debug!(%channel, error = %e, "watch until deadline");
                    } else {
                        tracing::error!(%channel, error = %e, "watch until deadline");
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.clock.sleep_until(window.end) => {}
                    }
                }
            }
            window = self.window_after(&window);
        }

        tracing::debug!("watch stopped");
    }

    /// Join `channel`, forward arrivals until `end`, then leave it. The
    /// channel is left on every path once joined.
    async fn watch_until_deadline(
        &self,
        channel: &ChannelId,
        end: SystemTime,
        out: &mpsc::Sender<DiscoveredPeer>,
        cancel: &CancellationToken,
    ) -> Result<WindowEnd, TransportError> {
        tracing::debug!(%channel, "start watching");
        let topic = self.registry.join(channel).await?;

        let outcome = match topic.subscribe().await {
            Ok(events) => self.forward_arrivals(channel, events, end, out, cancel).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.registry.leave(channel).await {
            tracing::debug!(%channel, error = %e, "unable to leave channel properly");
        }
        outcome
    }

    async fn forward_arrivals(
        &self,
        channel: &ChannelId,
        mut events: PeerEvents,
        end: SystemTime,
        out: &mpsc::Sender<DiscoveredPeer>,
        cancel: &CancellationToken,
    ) -> Result<WindowEnd, TransportError> {
        let mut deadline = self.clock.sleep_until(end);

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(WindowEnd::Stopped),
                _ = &mut deadline => return Ok(WindowEnd::Elapsed),
                event = events.recv() => event.ok_or(TransportError::EventStreamClosed)?,
            };

            match event.kind {
                PeerEventKind::Join => {
                    tracing::debug!(%channel, peer = %event.peer, "peer joined channel");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(WindowEnd::Stopped),
                        _ = &mut deadline => return Ok(WindowEnd::Elapsed),
                        sent = out.send(DiscoveredPeer::from(event.peer)) => {
                            if sent.is_err() {
                                tracing::debug!("discovered peer receiver dropped");
                                return Ok(WindowEnd::Stopped);
                            }
                        }
                    }
                }
                PeerEventKind::Leave => {
                    tracing::trace!(%channel, peer = %event.peer, "peer left channel");
                }
            }
        }
    }
}
