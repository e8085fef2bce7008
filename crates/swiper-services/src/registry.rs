//! Channel registry — the table of rendezvous channels this node has open.
//!
//! Watchers and announcers share one registry. Entries are reference counted:
//! every successful `join` must be paired with a `leave`, and the transport
//! channel is only closed when the last holder leaves.
//!
//! The table lock is never held across a transport call. Two concurrent
//! joins for a channel that is not open yet may both open it; the loser
//! closes its copy and adopts the registered one.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use swiper_core::ChannelId;

use crate::transport::{Topic, Transport, TransportError};

struct OpenChannel {
    topic: Arc<dyn Topic>,
    refs: usize,
}

pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<ChannelId, OpenChannel>>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Open `channel` with relaying enabled, or take another reference to it
    /// if it is already open.
    ///
    /// On failure nothing is registered.
    pub async fn join(&self, channel: &ChannelId) -> Result<Arc<dyn Topic>, TransportError> {
        if let Some(topic) = self.acquire_existing(channel) {
            tracing::trace!(%channel, "channel already open");
            return Ok(topic);
        }

        let topic = self.transport.open(channel).await?;
        if let Err(e) = topic.relay().await {
            if let Err(close_err) = topic.close().await {
                tracing::debug!(%channel, error = %close_err, "close after relay failure");
            }
            return Err(e);
        }

        let existing = {
            let mut channels = self.lock();
            match channels.entry(*channel) {
                Entry::Occupied(mut slot) => {
                    let open = slot.get_mut();
                    open.refs += 1;
                    Some(open.topic.clone())
                }
                Entry::Vacant(slot) => {
                    slot.insert(OpenChannel {
                        topic: topic.clone(),
                        refs: 1,
                    });
                    None
                }
            }
        };

        match existing {
            Some(registered) => {
                // Lost a concurrent open for the same channel.
                if let Err(e) = topic.close().await {
                    tracing::debug!(%channel, error = %e, "close of duplicate open failed");
                }
                Ok(registered)
            }
            None => {
                tracing::debug!(%channel, "channel joined");
                Ok(topic)
            }
        }
    }

    /// Drop one reference to `channel`, closing it on the transport when none
    /// remain. Leaving a channel that is not open is a no-op.
    pub async fn leave(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let closing = {
            let mut channels = self.lock();
            let Some(open) = channels.get_mut(channel) else {
                return Ok(());
            };
            if open.refs > 1 {
                open.refs -= 1;
                return Ok(());
            }
            channels.remove(channel).map(|open| open.topic)
        };

        if let Some(topic) = closing {
            topic.close().await?;
            tracing::debug!(%channel, "channel left");
        }
        Ok(())
    }

    pub fn is_open(&self, channel: &ChannelId) -> bool {
        self.lock().contains_key(channel)
    }

    /// Number of outstanding joins for `channel`; 0 if not open.
    pub fn ref_count(&self, channel: &ChannelId) -> usize {
        self.lock().get(channel).map(|open| open.refs).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn open_channels(&self) -> Vec<ChannelId> {
        self.lock().keys().copied().collect()
    }

    fn acquire_existing(&self, channel: &ChannelId) -> Option<Arc<dyn Topic>> {
        let mut channels = self.lock();
        let open = channels.get_mut(channel)?;
        open.refs += 1;
        Some(open.topic.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, OpenChannel>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
