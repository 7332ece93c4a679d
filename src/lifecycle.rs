use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

/// Run state of one background loop, shared between the loop and its owner.
///
/// Transitions: `Stopped -> Running` on start, `Running -> Stopping` on a stop
/// request, and back to `Stopped` once the loop has exited.
#[derive(Debug)]
pub struct LoopControl {
    state: Mutex<LoopState>,
    changed: Condvar,
}
impl LoopControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState::Stopped),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Returns `false` unless the loop was `Stopped`.
    pub fn try_start(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LoopState::Stopped {
            return false;
        }
        *state = LoopState::Running;
        true
    }

    /// Returns `false` if the loop was not running.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LoopState::Running {
            return false;
        }
        *state = LoopState::Stopping;
        self.changed.notify_all();
        true
    }

    pub fn finish(&self) {
        *self.state.lock() = LoopState::Stopped;
        self.changed.notify_all();
    }

    /// Sleeps for `timeout` unless a stop request arrives first.
    ///
    /// Returns whether the loop is still running.
    pub fn idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state == LoopState::Running {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state == LoopState::Running
    }
}
impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the loop `Stopped` when dropped, including on panic.
pub(crate) struct FinishGuard<'a>(pub &'a LoopControl);
impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn transitions() {
        let control = LoopControl::new();
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(!control.request_stop());
        assert!(control.try_start());
        assert!(!control.try_start());
        assert!(control.is_running());
        assert!(control.request_stop());
        assert_eq!(control.state(), LoopState::Stopping);
        assert!(!control.try_start());
        control.finish();
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(control.try_start());
    }

    #[test]
    fn idle_runs_out_while_running() {
        let control = LoopControl::new();
        control.try_start();
        let start = Instant::now();
        assert!(control.idle(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stop_request_wakes_idle_loop() {
        let control = Arc::new(LoopControl::new());
        control.try_start();
        let sleeper = {
            let control = control.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let running = control.idle(Duration::from_secs(30));
                (running, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        control.request_stop();
        let (running, elapsed) = sleeper.join().unwrap();
        assert!(!running);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn guard_finishes_on_panic() {
        let control = Arc::new(LoopControl::new());
        control.try_start();
        let worker = {
            let control = control.clone();
            thread::spawn(move || {
                let _guard = FinishGuard(&control);
                panic!("boom");
            })
        };
        assert!(worker.join().is_err());
        assert_eq!(control.state(), LoopState::Stopped);
    }
}
