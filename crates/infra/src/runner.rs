//! Periodic background runner for the monitor, slotting and decay passes.
//!
//! - Schedule: runs once on startup, then every `interval`
//! - Trigger: `RunnerHandle::trigger` requests an early pass (coalesced)
//! - Failures: logged and retried with bounded exponential backoff; never propagate

use std::fmt::Display;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::error::EngineError;
use crate::retry::RetryPolicy;

const POLL: Duration = Duration::from_millis(50);

/// Handle for a running background pass (shutdown + trigger hook).
#[derive(Debug)]
pub struct RunnerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl RunnerHandle {
    /// Ask for a pass as soon as possible. Triggers arriving while one is already
    /// pending are dropped.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the runner and wait for its thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicRunner {
    name: &'static str,
    config: RunnerConfig,
}

impl PeriodicRunner {
    pub fn new(name: &'static str, config: RunnerConfig) -> Self {
        Self { name, config }
    }

    pub fn spawn<F, T, E>(&self, pass: F) -> Result<RunnerHandle, EngineError>
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        T: 'static,
        E: Display + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let name = self.name;
        let cfg = self.config.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner_loop(name, cfg, shutdown_rx, trigger_rx, pass))
            .map_err(|source| EngineError::Spawn { name, source })?;

        Ok(RunnerHandle {
            name,
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        })
    }
}

fn runner_loop<F, T, E>(
    name: &'static str,
    cfg: RunnerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    mut pass: F,
) where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    info!(runner = name, interval_ms = cfg.interval.as_millis() as u64, "runner started");

    let interval = cfg.interval.max(Duration::from_millis(1));
    let backoff = RetryPolicy::exponential(cfg.max_retries, cfg.base_backoff, Duration::from_secs(10));
    // `None` when the interval runs past what `Instant` can represent: trigger-only.
    let mut next_tick = Instant::now().checked_add(interval);
    let mut pending = true;
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        // Shutdown has priority; a dropped handle counts as shutdown.
        match shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let now = Instant::now();
        if let Some(tick) = next_tick {
            if now >= tick {
                pending = true;
                next_tick = advance(tick, interval, now);
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(POLL.min(until.saturating_duration_since(Instant::now())));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let wait = next_tick.map_or(POLL, |tick| {
                tick.saturating_duration_since(Instant::now()).min(POLL)
            });
            // Wakes early on a trigger.
            if trigger_rx.recv_timeout(wait).is_ok() {
                pending = true;
            }
            continue;
        }

        pending = false;
        match pass() {
            Ok(_) => failures = 0,
            Err(e) => {
                failures += 1;
                warn!(runner = name, error = %e, attempt = failures, "runner pass failed");
                if backoff.should_retry(failures.saturating_sub(1)) {
                    pending = true;
                    backoff_until = Some(Instant::now() + backoff.delay_for_attempt(failures));
                } else {
                    failures = 0;
                }
            }
        }
    }

    info!(runner = name, "runner stopped");
}

/// First tick after `now` on the `interval` grid starting at `tick`.
fn advance(mut tick: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    while tick <= now {
        tick = tick.checked_add(interval)?;
    }
    Some(tick)
}
