use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;

use crate::{
    backend::{ensure_database, Backend},
    codec::check_point,
    config::ImporterConfig,
    drain::DrainLoop,
    influx::InfluxClient,
    lifecycle::{LoopControl, LoopState},
    queue::BoundedQueue,
    sampler::{Producer, SamplingLoop},
    writer::RetryingWriter,
    now, DataPoint, Fields, ImportError, Tags,
};

/// Stamps samples with the pipeline's tags and the current time and queues them.
#[derive(Debug, Clone)]
pub struct Intake {
    queue: Arc<BoundedQueue>,
    tags: Arc<Tags>,
}
impl Intake {
    pub fn new(queue: Arc<BoundedQueue>, tags: Arc<Tags>) -> Self {
        Self { queue, tags }
    }

    pub fn enqueue(&self, measurement: impl Into<String>, fields: Fields) -> Result<(), ImportError> {
        let measurement = measurement.into();
        if fields.is_empty() {
            return Err(ImportError::EmptyFields(measurement));
        }
        check_point(&measurement, &self.tags, &fields)?;
        let point = DataPoint::new(measurement, self.tags.clone(), now(), fields);
        self.queue.put(point)?;
        Ok(())
    }
}

/// Requests both background loops of a pipeline to stop, from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    drain: Arc<LoopControl>,
    sampling: Arc<LoopControl>,
}
impl StopHandle {
    pub fn stop(&self) {
        let drain = self.drain.request_stop();
        let sampling = self.sampling.request_stop();
        if drain || sampling {
            tracing::info!("stop requested");
        }
    }
}

#[derive(Debug)]
struct Worker {
    name: &'static str,
    control: Arc<LoopControl>,
    handle: Option<JoinHandle<Result<(), ImportError>>>,
}
impl Worker {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            control: Arc::new(LoopControl::new()),
            handle: None,
        }
    }

    fn ensure_stopped(&self) -> Result<(), ImportError> {
        match self.control.state() {
            LoopState::Stopped => Ok(()),
            LoopState::Running | LoopState::Stopping => Err(ImportError::AlreadyRunning(self.name)),
        }
    }

    fn spawn<F>(&mut self, f: F) -> Result<(), ImportError>
    where
        F: FnOnce() -> Result<(), ImportError> + Send + 'static,
    {
        if !self.control.try_start() {
            return Err(ImportError::AlreadyRunning(self.name));
        }
        let spawned = thread::Builder::new()
            .name(format!("importer-{}", self.name.replace(' ', "-")))
            .spawn(f);
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.control.finish();
                Err(ImportError::Spawn {
                    name: self.name,
                    source,
                })
            }
        }
    }

    fn join(&mut self) -> Result<(), ImportError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|_| ImportError::Panicked(self.name))?
    }
}

/// Buffered importer: producers feed a bounded queue that a background thread
/// drains into the backend.
pub struct Pipeline<B> {
    config: ImporterConfig,
    backend: Arc<B>,
    queue: Arc<BoundedQueue>,
    intake: Intake,
    writer: Arc<RetryingWriter<B>>,
    producers: Arc<Mutex<Vec<Producer>>>,
    drain: Worker,
    sampling: Worker,
}

impl Pipeline<InfluxClient> {
    /// Builds a pipeline writing to the InfluxDB server in `config.influx`.
    pub fn connect(config: ImporterConfig, producers: Vec<Producer>) -> Result<Self, ImportError> {
        let client = InfluxClient::new(&config.influx);
        Self::new(config, client, producers)
    }
}

impl<B: Backend + 'static> Pipeline<B> {
    pub fn new(config: ImporterConfig, backend: B, producers: Vec<Producer>) -> Result<Self, ImportError> {
        config.validate()?;
        let backend = Arc::new(backend);
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity, config.overflow));
        let intake = Intake::new(queue.clone(), Arc::new(config.tags.clone()));
        let writer = RetryingWriter::new(backend.clone(), config.max_retries, config.ignore_errors)
            .with_retry_delay(config.retry_delay);
        Ok(Self {
            config,
            backend,
            queue,
            intake,
            writer: Arc::new(writer),
            producers: Arc::new(Mutex::new(producers)),
            drain: Worker::new("drain loop"),
            sampling: Worker::new("sampling loop"),
        })
    }

    /// Provisions the database, then starts the drain thread and, when
    /// producers were registered, the sampling thread.
    pub fn start(&mut self) -> Result<(), ImportError> {
        self.drain.ensure_stopped()?;
        self.sampling.ensure_stopped()?;
        for worker in [&mut self.drain, &mut self.sampling] {
            if let Err(e) = worker.join() {
                tracing::warn!(error = %e, "previous {} run ended with an error", worker.name);
            }
        }

        let database = &self.config.database;
        ensure_database(&*self.backend, database).map_err(|source| ImportError::Provision {
            database: database.clone(),
            source,
        })?;
        self.queue.reopen();

        let stop = self.stop_handle();
        let queue = self.queue.clone();
        let drain = DrainLoop::new(
            self.queue.clone(),
            self.writer.clone(),
            self.drain.control.clone(),
            self.config.poll_interval,
        );
        self.drain.spawn(move || {
            let res = drain.run();
            if res.is_err() {
                stop.stop();
            }
            // Nothing drains anymore; release producers blocked on a full queue.
            queue.close();
            res
        })?;

        if self.producers.lock().is_empty() {
            return Ok(());
        }
        let sampler = SamplingLoop::new(
            self.producers.clone(),
            self.intake.clone(),
            self.sampling.control.clone(),
            self.config.sample_interval,
            self.config.on_sample_error,
        );
        if let Err(e) = self.sampling.spawn(move || sampler.run()) {
            self.drain.control.request_stop();
            return Err(e);
        }
        Ok(())
    }

    /// Asks both loops to stop without waiting for them or for the queue.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            drain: self.drain.control.clone(),
            sampling: self.sampling.control.clone(),
        }
    }

    /// Waits for both loops to exit and returns the first error either ended with.
    pub fn join(&mut self) -> Result<(), ImportError> {
        let drain = self.drain.join();
        let sampling = self.sampling.join();
        drain.and(sampling)
    }

    /// Queues a sample from outside the sampling loop.
    pub fn enqueue(&self, measurement: impl Into<String>, fields: Fields) -> Result<(), ImportError> {
        self.intake.enqueue(measurement, fields)
    }

    /// A cloneable entry point for producers on other threads.
    pub fn intake(&self) -> Intake {
        self.intake.clone()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
    pub fn drain_state(&self) -> LoopState {
        self.drain.control.state()
    }
    pub fn sampling_state(&self) -> LoopState {
        self.sampling.control.state()
    }
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }
}

impl<B> Drop for Pipeline<B> {
    fn drop(&mut self) {
        self.drain.control.request_stop();
        self.sampling.control.request_stop();
    }
}

impl<B> core::fmt::Debug for Pipeline<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("database", &self.config.database)
            .field("queued", &self.queue.len())
            .field("drain", &self.drain.control.state())
            .field("sampling", &self.sampling.control.state())
            .finish()
    }
}
