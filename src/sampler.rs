use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Deserialize;

use crate::{
    lifecycle::{FinishGuard, LoopControl},
    pipeline::Intake,
    ImportError, Sample,
};

/// Callback polled once per sampling tick.
pub type Producer = Box<dyn FnMut() -> anyhow::Result<Sample> + Send>;

pub fn producer<F>(f: F) -> Producer
where
    F: FnMut() -> anyhow::Result<Sample> + Send + 'static,
{
    Box::new(f)
}

/// What the sampling thread does when a producer returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleErrorPolicy {
    /// Stop sampling and report the error to the pipeline owner.
    #[default]
    Halt,
    /// Log the error and go on with the next producer.
    Skip,
}

/// Polls every producer once per interval and enqueues what they return.
pub struct SamplingLoop {
    producers: Arc<Mutex<Vec<Producer>>>,
    intake: Intake,
    control: Arc<LoopControl>,
    interval: Duration,
    on_error: SampleErrorPolicy,
}
impl SamplingLoop {
    pub fn new(
        producers: Arc<Mutex<Vec<Producer>>>,
        intake: Intake,
        control: Arc<LoopControl>,
        interval: Duration,
        on_error: SampleErrorPolicy,
    ) -> Self {
        Self {
            producers,
            intake,
            control,
            interval,
            on_error,
        }
    }

    pub fn run(&self) -> Result<(), ImportError> {
        let _guard = FinishGuard(&self.control);
        tracing::info!(interval = ?self.interval, "sampling started");
        let res = self.sample_until_stopped();
        match &res {
            Ok(()) => tracing::info!("sampling stopped"),
            Err(e) => tracing::error!(error = %e, "sampling stopped on error"),
        }
        res
    }

    fn sample_until_stopped(&self) -> Result<(), ImportError> {
        while self.control.is_running() {
            self.tick()?;
            self.control.idle(self.interval);
        }
        Ok(())
    }

    /// Calls each producer once, in registration order.
    pub fn tick(&self) -> Result<(), ImportError> {
        let mut producers = self.producers.lock();
        for (i, producer) in producers.iter_mut().enumerate() {
            let sample = match producer() {
                Ok(sample) => sample,
                Err(e) => match self.on_error {
                    SampleErrorPolicy::Halt => return Err(ImportError::Producer(e)),
                    SampleErrorPolicy::Skip => {
                        tracing::warn!(producer = i, error = %e, "producer failed, skipping it this tick");
                        continue;
                    }
                },
            };
            match self.intake.enqueue(sample.measurement, sample.fields) {
                Ok(()) => (),
                Err(ImportError::QueueFull(point)) => {
                    tracing::warn!(measurement = point.measurement(), "queue is full, dropping sample");
                }
                Err(ImportError::QueueClosed(point)) => {
                    tracing::debug!(measurement = point.measurement(), "queue closed, ending tick");
                    return Ok(());
                }
                Err(e @ (ImportError::EmptyFields(_)
                | ImportError::NonFiniteField { .. }
                | ImportError::LineBreak { .. })) => {
                    tracing::warn!(producer = i, error = %e, "dropping unwritable sample");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
impl core::fmt::Debug for SamplingLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SamplingLoop")
            .field("producers", &self.producers.lock().len())
            .field("interval", &self.interval)
            .field("on_error", &self.on_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;
    use crate::{queue::OverflowPolicy, BoundedQueue, FieldValue, Tags};

    fn setup(
        producers: Vec<Producer>,
        on_error: SampleErrorPolicy,
        policy: OverflowPolicy,
    ) -> (Arc<BoundedQueue>, Arc<LoopControl>, SamplingLoop) {
        let queue = Arc::new(BoundedQueue::new(4, policy));
        let mut tags = Tags::new();
        tags.insert("Sample_Tag".into(), "Sample_Tag_Value".into());
        let intake = Intake::new(queue.clone(), Arc::new(tags));
        let control = Arc::new(LoopControl::new());
        let sampler = SamplingLoop::new(
            Arc::new(Mutex::new(producers)),
            intake,
            control.clone(),
            Duration::from_millis(5),
            on_error,
        );
        (queue, control, sampler)
    }

    #[test]
    fn one_tick_enqueues_in_registration_order() {
        let producers: Vec<Producer> = vec![
            producer(|| Ok(Sample::new("m1").field("x", 1))),
            producer(|| Ok(Sample::new("m2").field("y", 2))),
        ];
        let (queue, _, sampler) =
            setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::default());
        sampler.tick().unwrap();

        let batch = queue.drain_all();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].measurement(), "m1");
        assert_eq!(batch[0].fields()["x"], FieldValue::Integer(1));
        assert_eq!(batch[1].measurement(), "m2");
        assert_eq!(batch[1].fields()["y"], FieldValue::Integer(2));
        for point in &batch {
            assert_eq!(point.tags()["Sample_Tag"], "Sample_Tag_Value");
        }
        assert!(batch[0].timestamp() <= batch[1].timestamp());
        assert!(batch[0].timestamp() > 0);
    }

    #[test]
    fn halt_policy_surfaces_the_failure() {
        let producers: Vec<Producer> = vec![
            producer(|| Err(anyhow::anyhow!("sensor offline"))),
            producer(|| Ok(Sample::new("m2").field("y", 2))),
        ];
        let (queue, _, sampler) =
            setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::default());
        let err = sampler.tick().unwrap_err();
        assert!(matches!(err, ImportError::Producer(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn skip_policy_continues_with_the_next_producer() {
        let producers: Vec<Producer> = vec![
            producer(|| Err(anyhow::anyhow!("sensor offline"))),
            producer(|| Ok(Sample::new("m2").field("y", 2))),
        ];
        let (queue, _, sampler) =
            setup(producers, SampleErrorPolicy::Skip, OverflowPolicy::default());
        sampler.tick().unwrap();
        let batch = queue.drain_all();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].measurement(), "m2");
    }

    #[test]
    fn rejected_samples_are_dropped() {
        let producers: Vec<Producer> = (0..6)
            .map(|i: i64| producer(move || Ok(Sample::new(format!("m{i}")).field("v", i))))
            .collect();
        let (queue, _, sampler) = setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::Reject);
        sampler.tick().unwrap();
        let names: Vec<_> = queue
            .drain_all()
            .iter()
            .map(|p| p.measurement().to_owned())
            .collect();
        assert_eq!(names, ["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn unwritable_samples_are_dropped() {
        let producers: Vec<Producer> = vec![
            producer(|| Ok(Sample::new("m1").field("x", f64::NAN))),
            producer(|| Ok(Sample::new("m2\nm3").field("x", 1))),
            producer(|| Ok(Sample::new("m4").field("x", 1))),
        ];
        let (queue, _, sampler) =
            setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::default());
        sampler.tick().unwrap();
        let batch = queue.drain_all();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].measurement(), "m4");
    }

    #[test]
    fn closed_queue_ends_the_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let producers: Vec<Producer> = (0..3)
            .map(|_| {
                let calls = calls.clone();
                producer(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Sample::new("m").field("x", 1))
                })
            })
            .collect();
        let (queue, _, sampler) =
            setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::default());
        queue.close();
        sampler.tick().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn runs_ticks_until_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let producers: Vec<Producer> = vec![{
            let calls = calls.clone();
            producer(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(Sample::new("tick").field("n", n as i64))
            })
        }];
        let (queue, control, sampler) =
            setup(producers, SampleErrorPolicy::Halt, OverflowPolicy::Reject);
        control.try_start();
        let worker = thread::spawn(move || sampler.run());
        while calls.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        control.request_stop();
        worker.join().unwrap().unwrap();
        assert!(queue.len() >= 3);
    }
}
