//! Vbucket Replicator
//!
//! Copies mutations from a set of source vbuckets into matching destination
//! vbuckets once a fixed replication latency has elapsed on the virtual
//! clock.
//!
//! Each source/destination pair has a cursor holding the highest sequence
//! number already forwarded. A replication pass walks every pair, forwards
//! whatever has become eligible and, if anything is still in flight, arms
//! one timer for the earliest future eligibility time. Passes are triggered
//! by `signal` (a write landed), `resume`, or that timer firing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::mocktime::{self, Chrono, TimerId};
use crate::store::{DestinationPartition, SeqNo, SourcePartition};

/// Construction parameters for a [`Replicator`]
pub struct ReplicatorConfig {
    /// Shared virtual clock
    pub chrono: Arc<Chrono>,
    /// Vbuckets to replicate from
    pub src_vbuckets: Vec<Arc<dyn SourcePartition>>,
    /// Vbuckets to replicate into, index-aligned with `src_vbuckets`
    pub dst_vbuckets: Vec<Arc<dyn DestinationPartition>>,
    /// Delay between a commit and its earliest replication
    pub latency: Duration,
}

/// Counter snapshot exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplicatorStats {
    /// Replication passes that ran while enabled
    pub passes: u64,
    /// Mutations appended to destinations
    pub mutations_replicated: u64,
    /// Source fetches that failed or came back empty
    pub fetch_anomalies: u64,
    /// Wake-up timers armed
    pub wakes_armed: u64,
    /// Wake-up timers that fired
    pub wakes_fired: u64,
}

#[derive(Default)]
struct StatCounters {
    passes: AtomicU64,
    mutations_replicated: AtomicU64,
    fetch_anomalies: AtomicU64,
    wakes_armed: AtomicU64,
    wakes_fired: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> ReplicatorStats {
        ReplicatorStats {
            passes: self.passes.load(Ordering::Relaxed),
            mutations_replicated: self.mutations_replicated.load(Ordering::Relaxed),
            fetch_anomalies: self.fetch_anomalies.load(Ordering::Relaxed),
            wakes_armed: self.wakes_armed.load(Ordering::Relaxed),
            wakes_fired: self.wakes_fired.load(Ordering::Relaxed),
        }
    }
}

/// The wake-up timer currently owned by a replicator
#[derive(Debug, Clone, Copy)]
struct ArmedWake {
    timer_id: TimerId,
    wake_at: DateTime<Utc>,
    generation: u64,
}

struct ReplicatorState {
    disabled: bool,
    replicated_seq_nos: Vec<SeqNo>,
    armed: Option<ArmedWake>,
    wake_generation: u64,
}

struct ReplicatorInner {
    chrono: Arc<Chrono>,
    src_vbuckets: Vec<Arc<dyn SourcePartition>>,
    dst_vbuckets: Vec<Arc<dyn DestinationPartition>>,
    latency: Duration,
    state: Mutex<ReplicatorState>,
    stats: StatCounters,
}

/// Latency-bounded replicator between two vbucket sets
pub struct Replicator {
    inner: Arc<ReplicatorInner>,
}

impl Replicator {
    /// Create a replicator. All cursors start at zero and replication is enabled.
    pub fn new(config: ReplicatorConfig) -> Result<Self> {
        if config.src_vbuckets.len() != config.dst_vbuckets.len() {
            return Err(Error::VbucketCountMismatch {
                src: config.src_vbuckets.len(),
                dst: config.dst_vbuckets.len(),
            });
        }

        if chrono::Duration::from_std(config.latency).is_err() {
            return Err(Error::Config(format!(
                "replication latency {:?} is out of range",
                config.latency
            )));
        }

        let num_vbuckets = config.src_vbuckets.len();
        Ok(Self {
            inner: Arc::new(ReplicatorInner {
                chrono: config.chrono,
                src_vbuckets: config.src_vbuckets,
                dst_vbuckets: config.dst_vbuckets,
                latency: config.latency,
                state: Mutex::new(ReplicatorState {
                    disabled: false,
                    replicated_seq_nos: vec![0; num_vbuckets],
                    armed: None,
                    wake_generation: 0,
                }),
                stats: StatCounters::default(),
            }),
        })
    }

    /// Stop replicating. An already-armed timer stays armed but does nothing when it fires.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if !state.disabled {
            tracing::debug!("Replication paused");
        }
        state.disabled = true;
    }

    /// Re-enable replication and immediately catch up on anything eligible.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if state.disabled {
            tracing::debug!("Replication resumed");
        }
        state.disabled = false;
        self.inner.check_vbuckets_locked(&mut state);
    }

    /// Notify the replicator that `vb_idx` may have new data.
    ///
    /// Every pair is re-evaluated so that wake-ups consolidate into one timer.
    pub fn signal(&self, vb_idx: usize) {
        tracing::trace!(vb_idx, "Replication signalled");
        let mut state = self.inner.state.lock();
        self.inner.check_vbuckets_locked(&mut state);
    }

    /// Check if replication is paused
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().disabled
    }

    /// Number of replicated vbucket pairs
    pub fn num_vbuckets(&self) -> usize {
        self.inner.src_vbuckets.len()
    }

    /// Configured replication latency
    pub fn latency(&self) -> Duration {
        self.inner.latency
    }

    /// Highest sequence number forwarded for a pair
    pub fn replicated_seq_no(&self, vb_idx: usize) -> Option<SeqNo> {
        self.inner.state.lock().replicated_seq_nos.get(vb_idx).copied()
    }

    /// Virtual time of the armed wake-up, if any
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().armed.map(|armed| armed.wake_at)
    }

    /// Snapshot of the replication counters
    pub fn stats(&self) -> ReplicatorStats {
        self.inner.stats.snapshot()
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Replicator")
            .field("num_vbuckets", &self.inner.src_vbuckets.len())
            .field("latency", &self.inner.latency)
            .field("disabled", &state.disabled)
            .field("next_wake", &state.armed.map(|armed| armed.wake_at))
            .finish()
    }
}

impl ReplicatorInner {
    /// Run one replication pass. Caller holds the state lock.
    fn check_vbuckets_locked(self: &Arc<Self>, state: &mut ReplicatorState) {
        if state.disabled {
            return;
        }
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        let now = self.chrono.now();
        let mut next_wake: Option<DateTime<Utc>> = None;

        for (vb_idx, (src, dst)) in self.src_vbuckets.iter().zip(&self.dst_vbuckets).enumerate() {
            let replicated_seq_no = state.replicated_seq_nos[vb_idx];

            let src_max_seq_no = src.max_seq_no();
            if replicated_seq_no >= src_max_seq_no {
                continue;
            }

            let mutations = match src.get_all_within(replicated_seq_no, src_max_seq_no) {
                Ok(mutations) if !mutations.is_empty() => mutations,
                Ok(_) => {
                    self.record_fetch_anomaly(vb_idx, replicated_seq_no, src_max_seq_no, None);
                    continue;
                }
                Err(e) => {
                    self.record_fetch_anomaly(vb_idx, replicated_seq_no, src_max_seq_no, Some(&e));
                    continue;
                }
            };

            for mutation in mutations {
                if mutation.seq_no <= state.replicated_seq_nos[vb_idx] {
                    continue;
                }

                let eligible_at = mutation.eligible_at(self.latency);
                if now < eligible_at {
                    next_wake = Some(next_wake.map_or(eligible_at, |wake| wake.min(eligible_at)));
                    break;
                }

                // Cursor only ever lands on a seq that was actually appended
                let seq_no = mutation.seq_no;
                dst.append_replicated(mutation);
                state.replicated_seq_nos[vb_idx] = seq_no;
                self.stats.mutations_replicated.fetch_add(1, Ordering::Relaxed);
            }

            if state.replicated_seq_nos[vb_idx] > replicated_seq_no {
                tracing::debug!(
                    vb_idx,
                    from = replicated_seq_no,
                    to = state.replicated_seq_nos[vb_idx],
                    "Replicated mutations"
                );
            }
        }

        self.arm_wake_locked(state, next_wake);
    }

    fn record_fetch_anomaly(
        &self,
        vb_idx: usize,
        after: SeqNo,
        up_to: SeqNo,
        error: Option<&Error>,
    ) {
        self.stats.fetch_anomalies.fetch_add(1, Ordering::Relaxed);
        match error {
            Some(e) => tracing::warn!(vb_idx, after, up_to, "Replication fetch failed, skipping vbucket: {}", e),
            None => tracing::warn!(vb_idx, after, up_to, "Replication fetch returned nothing, skipping vbucket"),
        }
    }

    /// Keep at most one wake-up armed, set for the earliest pending eligibility.
    fn arm_wake_locked(self: &Arc<Self>, state: &mut ReplicatorState, next_wake: Option<DateTime<Utc>>) {
        if let Some(armed) = state.armed.take() {
            if next_wake == Some(armed.wake_at) {
                state.armed = Some(armed);
                return;
            }
            self.chrono.cancel(armed.timer_id);
        }

        let Some(wake_at) = next_wake else {
            return;
        };

        state.wake_generation += 1;
        let generation = state.wake_generation;
        let wait = mocktime::duration_until(self.chrono.now(), wake_at);

        let weak: Weak<ReplicatorInner> = Arc::downgrade(self);
        let timer_id = self.chrono.after_func(wait, move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_wake(generation);
            }
        });

        state.armed = Some(ArmedWake {
            timer_id,
            wake_at,
            generation,
        });
        self.stats.wakes_armed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%wake_at, "Replication wake-up armed");
    }

    fn on_wake(self: &Arc<Self>, generation: u64) {
        self.stats.wakes_fired.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        if state.armed.map(|armed| armed.generation) == Some(generation) {
            state.armed = None;
        }
        self.check_vbuckets_locked(&mut state);
    }
}
