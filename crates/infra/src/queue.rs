//! Pending pick work shared by the dispatch workers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use wareflow_core::UnitId;

use crate::config::MAX_SETTING_DURATION;

/// One unit waiting for a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickJob {
    pub unit_id: UnitId,
    /// Dispatch attempts already made for this unit.
    pub attempt: u32,
}

struct QueueState {
    ready: VecDeque<PickJob>,
    /// Retries waiting out their backoff.
    delayed: Vec<(Instant, PickJob)>,
    in_flight: usize,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, job) = self.delayed.swap_remove(i);
                self.ready.push_back(job);
            } else {
                i += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty() && self.in_flight == 0
    }
}

/// FIFO of pending picks with delayed retries.
///
/// Every job handed out by `pop_blocking` must be acknowledged with `done`, which is
/// how `wait_idle` knows the workers have quiesced.
pub struct PickQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

impl Default for PickQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PickQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                delayed: Vec::new(),
                in_flight: 0,
                closed: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Queue a unit for its first attempt. Returns the id back if the queue is closed.
    pub fn push(&self, unit_id: UnitId) -> Result<(), UnitId> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(unit_id);
        }
        state.ready.push_back(PickJob { unit_id, attempt: 0 });
        self.available.notify_one();
        Ok(())
    }

    /// Queue a retry that becomes visible after `delay`.
    pub fn push_retry(&self, job: PickJob, delay: Duration) -> Result<(), PickJob> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(job);
        }
        state.delayed.push((Instant::now() + delay.min(MAX_SETTING_DURATION), job));
        // A waiting worker may need to shorten its wait.
        self.available.notify_one();
        Ok(())
    }

    /// Block until a job is due or the queue is closed.
    pub fn pop_blocking(&self) -> Option<PickJob> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            state.promote_due(Instant::now());
            if let Some(job) = state.ready.pop_front() {
                state.in_flight += 1;
                return Some(job);
            }
            match state.next_due() {
                Some(at) => {
                    self.available.wait_until(&mut state, at);
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Acknowledge a job returned by `pop_blocking`.
    pub fn done(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    /// Wait until nothing is queued, delayed or in flight. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while !state.is_idle() {
            match deadline {
                Some(at) => {
                    if self.idle.wait_until(&mut state, at).timed_out() {
                        return state.is_idle();
                    }
                }
                None => self.idle.wait(&mut state),
            }
        }
        true
    }

    /// Stop handing out work and wake every waiting worker. Queued jobs are dropped.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.ready.len() + state.delayed.len();
        state.ready.clear();
        state.delayed.clear();
        self.available.notify_all();
        if state.is_idle() {
            self.idle.notify_all();
        }
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Jobs waiting (ready or delayed), not counting in-flight ones.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PickQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PickQueue")
            .field("ready", &state.ready.len())
            .field("delayed", &state.delayed.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}
