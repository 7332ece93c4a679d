use std::{sync::Arc, time::Duration};

use crate::{backend::Backend, BackendError, DataPoint, ImportError};

/// Attempt bookkeeping for one `submit` call.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt_count: usize,
    pub last_error: Option<BackendError>,
}

#[derive(Debug)]
pub enum WriteOutcome {
    Success {
        attempts: usize,
    },
    ExhaustedRetries {
        attempts: usize,
        last_error: BackendError,
        batch: Vec<DataPoint>,
    },
}

/// Writes batches to the backend, retrying failed attempts.
#[derive(Debug)]
pub struct RetryingWriter<B> {
    backend: Arc<B>,
    max_retries: usize,
    retry_delay: Duration,
    ignore_errors: bool,
}
impl<B: Backend> RetryingWriter<B> {
    pub fn new(backend: Arc<B>, max_retries: usize, ignore_errors: bool) -> Self {
        Self {
            backend,
            max_retries: max_retries.max(1),
            retry_delay: Duration::ZERO,
            ignore_errors,
        }
    }
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Tries the batch up to `max_retries` times and reports how it went.
    pub fn submit(&self, batch: Vec<DataPoint>) -> WriteOutcome {
        let mut state = RetryState::default();
        while state.attempt_count < self.max_retries {
            if state.attempt_count > 0 && !self.retry_delay.is_zero() {
                std::thread::sleep(self.retry_delay);
            }
            state.attempt_count += 1;
            match self.backend.write_points(&batch) {
                Ok(()) => {
                    state.last_error = None;
                    return WriteOutcome::Success {
                        attempts: state.attempt_count,
                    };
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        attempt = state.attempt_count,
                        points = batch.len(),
                        "write attempt failed"
                    );
                    state.last_error = Some(e);
                }
            }
        }
        let last_error = state
            .last_error
            .unwrap_or_else(|| BackendError::Transport("no attempt was made".into()));
        WriteOutcome::ExhaustedRetries {
            attempts: state.attempt_count,
            last_error,
            batch,
        }
    }

    /// Writes the batch and applies the failure policy once retries run out.
    ///
    /// With `ignore_errors` the batch is logged and dropped; otherwise the
    /// batch comes back inside [`ImportError::ExhaustedRetries`].
    pub fn write_batch(&self, batch: Vec<DataPoint>) -> Result<(), ImportError> {
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!(points = batch.len(), "importing batch");
        match self.submit(batch) {
            WriteOutcome::Success { attempts } => {
                if attempts > 1 {
                    tracing::info!(attempts, "imported batch after retry");
                }
                Ok(())
            }
            WriteOutcome::ExhaustedRetries {
                attempts,
                last_error,
                batch,
            } if self.ignore_errors => {
                tracing::warn!(
                    error = %last_error,
                    attempts,
                    data = ?batch,
                    "unable to import batch, either the server is down or the data is corrupted; dropping it"
                );
                Ok(())
            }
            WriteOutcome::ExhaustedRetries {
                attempts,
                last_error,
                batch,
            } => Err(ImportError::ExhaustedRetries {
                attempts,
                last_error,
                batch,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::testing::StubBackend, Fields, Tags};

    fn batch(n: usize) -> Vec<DataPoint> {
        let tags = Arc::new(Tags::new());
        (0..n)
            .map(|i| {
                let mut fields = Fields::new();
                fields.insert("i".into(), (i as i64).into());
                DataPoint::new("m".into(), tags.clone(), i as u64, fields)
            })
            .collect()
    }

    #[test]
    fn always_failing_backend_is_tried_exactly_max_retries_times() {
        let backend = Arc::new(StubBackend::failing());
        let writer = RetryingWriter::new(backend.clone(), 3, true);
        match writer.submit(batch(2)) {
            WriteOutcome::ExhaustedRetries {
                attempts,
                last_error,
                batch,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, BackendError::Status { status: 503, .. }));
                assert_eq!(batch.len(), 2);
            }
            outcome => panic!("unexpected outcome {outcome:?}"),
        }
        assert_eq!(backend.attempts(), 3);
    }

    #[test]
    fn ignore_errors_drops_the_batch() {
        let backend = Arc::new(StubBackend::failing());
        let writer = RetryingWriter::new(backend.clone(), 3, true);
        writer.write_batch(batch(1)).unwrap();
        assert_eq!(backend.attempts(), 3);
        assert!(backend.written().is_empty());
    }

    #[test]
    fn propagating_errors_returns_the_batch() {
        let backend = Arc::new(StubBackend::failing());
        let writer = RetryingWriter::new(backend.clone(), 3, false);
        let err = writer.write_batch(batch(4)).unwrap_err();
        match err {
            ImportError::ExhaustedRetries {
                attempts, batch, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(batch.len(), 4);
            }
            err => panic!("unexpected error {err}"),
        }
        assert_eq!(backend.attempts(), 3);
    }

    #[test]
    fn recovers_on_third_attempt() {
        let backend = Arc::new(StubBackend::failing_times(2));
        let writer = RetryingWriter::new(backend.clone(), 3, false);
        let points = batch(3);
        writer.write_batch(points.clone()).unwrap();
        assert_eq!(backend.attempts(), 3);
        assert_eq!(backend.written(), [points]);
    }

    #[test]
    fn empty_batch_never_reaches_the_backend() {
        let backend = Arc::new(StubBackend::new());
        let writer = RetryingWriter::new(backend.clone(), 3, false);
        writer.write_batch(Vec::new()).unwrap();
        assert_eq!(backend.attempts(), 0);
    }
}
