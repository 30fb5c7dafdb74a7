//! Time source used for every timeout in the engine.
//!
//! Production code uses [`SystemClock`]; tests either pause tokio time or
//! drive a [`ManualClock`] by hand.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Injectable monotonic clock.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Complete once `duration` has elapsed on this clock.
    async fn sleep(&self, duration: Duration);
}

/// Real time via tokio timers (honours paused test time).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Sleeper {
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

struct ManualState {
    elapsed: Duration,
    sleepers: Vec<Sleeper>,
}

/// Virtual clock that only moves when [`ManualClock::advance`] is called.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                sleepers: Vec::new(),
            })),
        }
    }

    /// Move time forward and wake every sleeper whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.state.lock();
            state.elapsed += by;
            let now = state.elapsed;
            let (due, waiting): (Vec<_>, Vec<_>) = state
                .sleepers
                .drain(..)
                .partition(|sleeper| sleeper.deadline <= now);
            state.sleepers = waiting;
            due
        };
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of sleeps still waiting to be woken.
    pub fn sleeper_count(&self) -> usize {
        let mut state = self.state.lock();
        state.sleepers.retain(|sleeper| !sleeper.wake.is_closed());
        state.sleepers.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let rx = {
            let mut state = self.state.lock();
            if duration.is_zero() {
                return;
            }
            let (wake, rx) = oneshot::channel();
            let deadline = state.elapsed + duration;
            state.sleepers.push(Sleeper { deadline, wake });
            rx
        };
        let _ = rx.await;
    }
}
