//! Supervised discovery tasks.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a spawned watcher or announcer.
///
/// The task runs until its token is cancelled, either directly through
/// `cancel` or by cancelling any ancestor token. Completion of `wait` is the
/// signal that all of the task's cleanup has run.
pub struct DiscoveryTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DiscoveryTask {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancel, handle }
    }

    /// Request the task to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to end on its own terms.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "discovery task panicked");
            }
        }
    }

    /// Cancel and wait for cleanup to finish.
    pub async fn shutdown(self) {
        self.cancel();
        self.wait().await;
    }
}
