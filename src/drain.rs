use std::{sync::Arc, time::Duration};

use crate::{
    backend::Backend,
    lifecycle::{FinishGuard, LoopControl},
    queue::BoundedQueue,
    writer::RetryingWriter,
    ImportError,
};

/// Moves everything that accumulated in the queue to the backend, one batch
/// per drain, idling while the queue is empty.
#[derive(Debug)]
pub struct DrainLoop<B> {
    queue: Arc<BoundedQueue>,
    writer: Arc<RetryingWriter<B>>,
    control: Arc<LoopControl>,
    poll_interval: Duration,
}
impl<B: Backend> DrainLoop<B> {
    pub fn new(
        queue: Arc<BoundedQueue>,
        writer: Arc<RetryingWriter<B>>,
        control: Arc<LoopControl>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            writer,
            control,
            poll_interval,
        }
    }

    /// Runs until a stop is requested or a batch fails terminally.
    ///
    /// The control must already be `Running`; it is `Stopped` on return.
    /// Points still queued when the loop exits are left in the queue.
    pub fn run(&self) -> Result<(), ImportError> {
        let _guard = FinishGuard(&self.control);
        tracing::info!("importing started");
        let res = self.drain_until_stopped();
        match &res {
            Ok(()) => tracing::info!(left = self.queue.len(), "importing stopped"),
            Err(e) => tracing::error!(error = %e, "importing stopped on error"),
        }
        res
    }

    fn drain_until_stopped(&self) -> Result<(), ImportError> {
        while self.control.is_running() {
            if self.queue.is_empty() {
                self.control.idle(self.poll_interval);
                continue;
            }
            let batch = self.queue.drain_all();
            if batch.is_empty() {
                continue;
            }
            self.writer.write_batch(batch)?;
        }
        Ok(())
    }
}
