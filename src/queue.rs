use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;

use crate::DataPoint;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// What `put` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for a drain. `None` waits forever.
    Block {
        #[serde(default, deserialize_with = "crate::config::de_opt_duration")]
        timeout: Option<Duration>,
    },
    Reject,
}
impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Block { timeout: None }
    }
}

/// Why `put` could not enqueue a point. The point is handed back either way.
#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("queue is full")]
    Full(DataPoint),
    /// Nothing drains the queue anymore.
    #[error("queue is closed")]
    Closed(DataPoint),
}
impl PutError {
    pub fn into_point(self) -> DataPoint {
        match self {
            Self::Full(point) | Self::Closed(point) => point,
        }
    }
}

/// Fixed-capacity FIFO shared between producers and the drain thread.
#[derive(Debug)]
pub struct BoundedQueue {
    slots: Mutex<Slots>,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}
#[derive(Debug, Default)]
struct Slots {
    buf: VecDeque<DataPoint>,
    closed: bool,
}

impl BoundedQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Slots::default()),
            not_full: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn put(&self, point: DataPoint) -> Result<(), PutError> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(PutError::Closed(point));
        }
        if slots.buf.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Reject => return Err(PutError::Full(point)),
                OverflowPolicy::Block { timeout } => {
                    let deadline = timeout.map(|t| Instant::now() + t);
                    while slots.buf.len() >= self.capacity && !slots.closed {
                        match deadline {
                            None => self.not_full.wait(&mut slots),
                            Some(deadline) => {
                                if self.not_full.wait_until(&mut slots, deadline).timed_out() {
                                    break;
                                }
                            }
                        }
                    }
                    if slots.closed {
                        return Err(PutError::Closed(point));
                    }
                    if slots.buf.len() >= self.capacity {
                        return Err(PutError::Full(point));
                    }
                }
            }
        }
        slots.buf.push_back(point);
        Ok(())
    }

    /// Removes and returns everything queued so far, oldest first.
    pub fn drain_all(&self) -> Vec<DataPoint> {
        let batch: Vec<DataPoint> = {
            let mut slots = self.slots.lock();
            slots.buf.drain(..).collect()
        };
        if !batch.is_empty() {
            self.not_full.notify_all();
        }
        batch
    }

    /// Makes every pending and future `put` fail until [`reopen`](Self::reopen).
    pub fn close(&self) {
        self.slots.lock().closed = true;
        self.not_full.notify_all();
    }
    pub fn reopen(&self) {
        self.slots.lock().closed = false;
    }
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().buf.is_empty()
    }
    pub fn len(&self) -> usize {
        self.slots.lock().buf.len()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
