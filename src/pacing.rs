use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Blocking pause used by every retry, backoff and pacing delay.
///
/// The monitor never sleeps through `std::thread` directly so tests can
/// record the delays instead of waiting for them.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Keeps the main loop at or below a target frame rate.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    frame_budget: Option<Duration>,
}

impl Pacer {
    /// Create a pacer for `target_fps` iterations per second.
    ///
    /// A non-positive or non-finite target disables pacing, and so does a
    /// target so small that its budget does not fit in a [`Duration`].
    pub fn new(target_fps: f64) -> Self {
        let frame_budget = if target_fps.is_finite() && target_fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / target_fps).ok()
        } else {
            None
        };
        Self { frame_budget }
    }

    pub fn frame_budget(&self) -> Option<Duration> {
        self.frame_budget
    }

    /// Time left in the current iteration's budget, if any.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.frame_budget
            .filter(|budget| elapsed < *budget)
            .map(|budget| budget - elapsed)
    }
}

/// Shared stop flag checked once per loop iteration.
///
/// Cancellation is cooperative: an in-flight blocking call finishes before
/// the loop observes the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
