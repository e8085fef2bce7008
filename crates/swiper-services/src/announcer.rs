//! Announcer — keeps this node subscribed to the current window's
//! rendezvous channel so watchers on other nodes can see it arrive.
//!
//! Unlike the watcher, a failed join ends the announcer: it cannot do
//! anything useful until the next window, and the caller may restart it.

use tokio_util::sync::CancellationToken;

use swiper_core::ChannelId;

use crate::swiper::Swiper;

impl Swiper {
    /// Announce presence on `resource` until `cancel` fires or a join fails.
    ///
    /// The previous window's channel is left before the next one is joined,
    /// and the current one is left on the way out.
    pub async fn announce_topic(&self, resource: &[u8], seed: &[u8], cancel: CancellationToken) {
        tracing::debug!(interval_secs = self.interval().as_secs(), "announce started");
        let mut current: Option<ChannelId> = None;
        let mut window = self.current_window();

        while !cancel.is_cancelled() {
            if let Some(previous) = current.take() {
                self.leave_announced(&previous).await;
            }

            let channel = window.rendezvous_point(resource, seed);
            if let Err(e) = self.registry.join(&channel).await {
                tracing::error!(%channel, error = %e, "failed to announce on channel");
                return;
            }
            tracing::debug!(%channel, "announcing");
            current = Some(channel);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep_until(window.end) => {}
            }
            window = self.window_after(&window);
        }

        if let Some(channel) = current {
            self.leave_announced(&channel).await;
        }
        tracing::debug!("announce stopped");
    }

    async fn leave_announced(&self, channel: &ChannelId) {
        if let Err(e) = self.registry.leave(channel).await {
            tracing::warn!(%channel, error = %e, "failed to leave announced channel");
        }
    }
}
