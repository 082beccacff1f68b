// SPDX-License-Identifier: MIT

//! Trigger engine (C6): the timer-driven decision loop that turns coalesced
//! events into flushes, with volume and quiescence rules, bounded concurrent
//! flush workers, and destination-outage backoff.

use crate::coalescer::{Coalescer, Snapshot};
use crate::destination::Destination;
use async_trait::async_trait;
use openduckbill_core::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) const MAX_WORKERS: usize = 3;
const MAX_IDLE_TICKS: u32 = 3;
const FAIL_MULTIPLE: u64 = 10;

/// Runs a single flush for a coalesced snapshot. The real implementation drives
/// the job builder across every matched entry; tests use a fake that records
/// invocations instead of shelling out to rsync.
#[async_trait]
pub trait FlushRunner: Send + Sync + 'static {
    async fn flush(&self, snapshot: Snapshot);
}

/// What a single tick decided to do, surfaced for logging and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Flushed,
    WorkersSaturated,
    DestinationUnavailable,
    SelfTerminate,
}

struct State {
    current_interval: Duration,
    idle_ticks: u32,
    prev_counter: Option<u64>,
    fail_counter_secs: u64,
    workers: Vec<JoinHandle<()>>,
}

pub struct TriggerEngine<C: Clock> {
    coalescer: Coalescer,
    destination: Arc<Destination>,
    sync_interval: Duration,
    commit_threshold: u64,
    clock: C,
    state: Mutex<State>,
}

impl<C: Clock> TriggerEngine<C> {
    pub fn new(
        coalescer: Coalescer,
        destination: Arc<Destination>,
        sync_interval: Duration,
        commit_threshold: u64,
        clock: C,
    ) -> Self {
        Self {
            coalescer,
            destination,
            sync_interval,
            commit_threshold,
            clock,
            state: Mutex::new(State {
                current_interval: sync_interval,
                idle_ticks: 0,
                prev_counter: None,
                fail_counter_secs: 0,
                workers: Vec::new(),
            }),
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.state.lock().current_interval
    }

    pub fn live_workers(&self) -> usize {
        let mut state = self.state.lock();
        state.workers.retain(|h| !h.is_finished());
        state.workers.len()
    }

    /// True once the reaper should be disabled: any uninterrupted stretch of
    /// destination unavailability disables it for the duration.
    pub fn destination_unavailable(&self) -> bool {
        self.state.lock().fail_counter_secs > 0
    }

    /// Uses `self.clock` purely to keep the engine generic over `Clock` for test
    /// determinism; interval/backoff arithmetic itself is tick-counted, not
    /// wall-clock-measured.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one decision cycle against a shared flush runner. Returns the outcome
    /// so callers (and tests) can assert on it without waiting on the real timer.
    pub async fn tick(&self, runner: &Arc<dyn FlushRunner>) -> TickOutcome {
        if self.destination.needs_mount().await {
            return self.handle_destination_unavailable().await;
        }

        let snapshot = self.coalescer.snapshot();

        if snapshot.counter >= self.commit_threshold {
            tracing::info!(counter = snapshot.counter, "flushing: volume threshold reached");
            return self.flush(runner).await;
        }

        if snapshot.counter > 0 {
            let should_flush = {
                let mut state = self.state.lock();
                let quiescent = state.prev_counter == Some(snapshot.counter);
                if quiescent {
                    state.idle_ticks += 1;
                } else {
                    state.idle_ticks = 0;
                }
                state.prev_counter = Some(snapshot.counter);
                state.idle_ticks >= MAX_IDLE_TICKS
            };

            if should_flush {
                tracing::info!(counter = snapshot.counter, "flushing: filesystem is quiescent");
                return self.flush(runner).await;
            }
        }

        TickOutcome::Idle
    }

    async fn flush(&self, runner: &Arc<dyn FlushRunner>) -> TickOutcome {
        {
            let mut state = self.state.lock();
            state.workers.retain(|h| !h.is_finished());

            if state.workers.len() >= MAX_WORKERS {
                state.current_interval += state.current_interval / 2;
                tracing::warn!(
                    live_workers = state.workers.len(),
                    new_interval_secs = state.current_interval.as_secs(),
                    "max flush workers already running, backing off"
                );
                return TickOutcome::WorkersSaturated;
            }
        }

        let snapshot = self.coalescer.snapshot_and_reset();

        let runner = Arc::clone(runner);
        let handle = tokio::spawn(async move { runner.flush(snapshot).await });

        let mut state = self.state.lock();
        state.workers.push(handle);

        if state.current_interval > self.sync_interval {
            let halved = state.current_interval / 2;
            state.current_interval = halved.max(self.sync_interval);
        }
        state.fail_counter_secs = 0;
        state.idle_ticks = 0;
        state.prev_counter = None;

        TickOutcome::Flushed
    }

    async fn handle_destination_unavailable(&self) -> TickOutcome {
        tracing::error!("destination unavailable, backup impossible this tick");
        let _ = self.destination.mount().await;

        let terminate = {
            let mut state = self.state.lock();
            state.fail_counter_secs += self.sync_interval.as_secs();
            state.fail_counter_secs >= FAIL_MULTIPLE * self.sync_interval.as_secs()
        };

        if terminate {
            tracing::error!("destination has been unavailable for too long, self-terminating");
            return TickOutcome::SelfTerminate;
        }
        TickOutcome::DestinationUnavailable
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
