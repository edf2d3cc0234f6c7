//! Virtual Clock
//!
//! `Chrono` keeps a virtual "now" and a queue of one-shot timers ordered by
//! deadline. Timers never fire on the thread that schedules them: they run
//! when the clock is advanced, in (deadline, id) order, with the clock lock
//! released so a callback may schedule or cancel further timers.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Custom epoch: 2024-01-01 00:00:00 UTC
pub const WOLFCAVE_EPOCH_MS: i64 = 1704067200000;

/// Handle identifying a scheduled timer
pub type TimerId = u64;

type TimerFn = Box<dyn FnOnce() + Send + 'static>;

struct ClockState {
    now: DateTime<Utc>,
    next_timer_id: TimerId,
    /// Pending timers keyed by deadline, ties broken by scheduling order
    timers: BTreeMap<(DateTime<Utc>, TimerId), TimerFn>,
    /// Reverse index used by `cancel`
    deadlines: BTreeMap<TimerId, DateTime<Utc>>,
}

/// Shared virtual clock
pub struct Chrono {
    state: Mutex<ClockState>,
}

impl Chrono {
    /// Create a clock positioned at the WolfCave epoch
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::default() + chrono::Duration::milliseconds(WOLFCAVE_EPOCH_MS);
        Self::starting_at(epoch)
    }

    /// Create a clock positioned at an arbitrary virtual time
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: start,
                next_timer_id: 1,
                timers: BTreeMap::new(),
                deadlines: BTreeMap::new(),
            }),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    /// Schedule `f` to run once at `now + wait`.
    ///
    /// The callback is never invoked inline, even for a zero wait; it runs
    /// from the next `advance`, `advance_to` or `fire_due` that reaches its
    /// deadline.
    pub fn after_func<F>(&self, wait: Duration, f: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        let fire_at = super::saturating_add(state.now, wait);
        let id = state.next_timer_id;
        state.next_timer_id += 1;
        state.timers.insert((fire_at, id), Box::new(f));
        state.deadlines.insert(id, fire_at);

        tracing::trace!(timer_id = id, %fire_at, "Timer scheduled");
        id
    }

    /// Withdraw a pending timer. Returns false if it already fired or never existed.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        match state.deadlines.remove(&id) {
            Some(fire_at) => {
                state.timers.remove(&(fire_at, id));
                tracing::trace!(timer_id = id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of timers waiting to fire
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.state.lock().timers.keys().next().map(|(fire_at, _)| *fire_at)
    }

    /// Move time forward by `by`, firing every timer that becomes due.
    pub fn advance(&self, by: Duration) -> Result<usize> {
        let target = {
            let state = self.state.lock();
            chrono::Duration::from_std(by)
                .ok()
                .and_then(|delta| state.now.checked_add_signed(delta))
                .ok_or_else(|| Error::Clock(format!("cannot advance clock by {:?}", by)))?
        };
        self.advance_to(target)
    }

    /// Move time forward to `target`, firing every timer due at or before it.
    ///
    /// While a callback runs, `now()` reports that timer's deadline. Timers
    /// scheduled by callbacks fire in the same call when their deadline is
    /// not after `target`. Returns the number of callbacks fired.
    pub fn advance_to(&self, target: DateTime<Utc>) -> Result<usize> {
        {
            let state = self.state.lock();
            if target < state.now {
                return Err(Error::Clock(format!(
                    "time cannot go backwards: current={}, target={}",
                    state.now, target
                )));
            }
        }

        let fired = self.fire_until(target);

        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
        Ok(fired)
    }

    /// Fire timers that are already due at the current time
    pub fn fire_due(&self) -> usize {
        let now = self.now();
        self.fire_until(now)
    }

    fn fire_until(&self, target: DateTime<Utc>) -> usize {
        let mut fired = 0;
        loop {
            let callback = {
                let mut state = self.state.lock();
                let due = match state.timers.keys().next() {
                    Some(&(fire_at, id)) if fire_at <= target => (fire_at, id),
                    _ => break,
                };
                let callback = state.timers.remove(&due);
                state.deadlines.remove(&due.1);
                if state.now < due.0 {
                    state.now = due.0;
                }
                callback
            };

            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }
        fired
    }
}

impl Default for Chrono {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Chrono {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Chrono")
            .field("now", &state.now)
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}
