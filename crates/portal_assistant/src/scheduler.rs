//! Time capabilities used by the session manager.
//!
//! The manager never reads the wall clock or sleeps directly. It asks a
//! [`Clock`] for timestamps and a [`Scheduler`] to report back when a
//! delay has elapsed, so tests can drive virtual time with
//! [`ManualScheduler`] instead of sleeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionEvent;

/// Source of timestamps for appended messages
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle for one scheduled delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Deferred notification capability.
///
/// The owner keeps whatever state belongs to a timer; the scheduler only
/// reports which [`TimerId`] came due.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, timer: TimerId);
    /// Cancelling an unknown or already fired timer is a no-op
    fn cancel(&self, timer: TimerId);
}

/// Scheduler backed by tokio timers.
///
/// Each timer is a task that sleeps and then posts
/// [`SessionEvent::TimerFired`] into the session queue.
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<SessionEvent>,
    tasks: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of timers that have not fired or been cancelled
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, timer: TimerId) {
        // Hold the lock across spawn + insert so the task cannot remove
        // its entry before it exists.
        let mut tasks = self.tasks.lock();
        let events = self.events.clone();
        let registry = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.lock().remove(&timer);
            // Receiver gone means the session was unmounted.
            let _ = events.send(SessionEvent::TimerFired(timer));
        });
        tasks.insert(timer, handle);
    }

    fn cancel(&self, timer: TimerId) {
        if let Some(handle) = self.tasks.lock().remove(&timer) {
            handle.abort();
            debug!(%timer, "Cancelled timer");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.abort();
        }
    }
}

struct ManualState {
    base: DateTime<Utc>,
    elapsed: Duration,
    seq: u64,
    // (deadline, scheduling order, timer)
    queue: Vec<(Duration, u64, TimerId)>,
}

/// Virtual-time scheduler and clock for deterministic tests.
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                base,
                elapsed: Duration::ZERO,
                seq: 0,
                queue: Vec::new(),
            }),
        }
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Timers scheduled and not yet fired or cancelled
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Move virtual time forward by `by`, returning the timers that came
    /// due in deadline order (ties in scheduling order).
    pub fn advance(&self, by: Duration) -> Vec<TimerId> {
        let mut fired = Vec::new();
        self.advance_with(by, |timer| fired.push(timer));
        fired
    }

    /// Like [`advance`](Self::advance) but invokes `on_fire` for each due
    /// timer with the clock set to that timer's deadline. Timers scheduled
    /// from inside `on_fire` are honoured if they fall within the window.
    pub fn advance_with(&self, by: Duration, mut on_fire: impl FnMut(TimerId)) {
        let target = self.state.lock().elapsed + by;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, (deadline, _, _))| *deadline <= target)
                    .min_by_key(|(_, (deadline, seq, _))| (*deadline, *seq))
                    .map(|(index, _)| index);
                due.map(|index| {
                    let (deadline, _, timer) = state.queue.remove(index);
                    state.elapsed = state.elapsed.max(deadline);
                    timer
                })
            };
            match next {
                Some(timer) => on_fire(timer),
                None => break,
            }
        }
        self.state.lock().elapsed = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, timer: TimerId) {
        let mut state = self.state.lock();
        let deadline = state.elapsed + delay;
        let seq = state.seq;
        state.seq += 1;
        state.queue.push((deadline, seq, timer));
    }

    fn cancel(&self, timer: TimerId) {
        self.state.lock().queue.retain(|(_, _, t)| *t != timer);
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        let state = self.state.lock();
        let offset = chrono::Duration::from_std(state.elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        state.base + offset
    }
}
