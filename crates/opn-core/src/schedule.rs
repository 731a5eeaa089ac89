use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Handle to work spawned after a delay. Cancelling or dropping the handle
/// aborts the work if it has not finished yet.
#[derive(Debug)]
pub struct ScheduledTask {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn after<F>(label: &'static str, delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        trace!(label, delay_ms = delay.as_millis() as u64, "scheduling delayed work");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });
        Self { label, handle }
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            trace!(label = self.label, "aborting scheduled work");
            self.handle.abort();
        }
    }
}
