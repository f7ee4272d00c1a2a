//! Simulated transit and handling: the dispatcher's only suspension point.
//!
//! Latency is a pure function of the unit's zone. The actual wait goes through
//! [`Pause`] and failures come from a [`FaultInjector`], so tests swap both for
//! deterministic fixtures.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use wareflow_core::{MissionId, RobotId, UnitId};
use wareflow_inventory::Zone;

/// One dispatch attempt. Lives only for the duration of a single mission.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentTask {
    pub mission_id: MissionId,
    pub unit_id: UnitId,
    pub candidate_robot_id: RobotId,
    pub requested_at: DateTime<Utc>,
}

/// Base cost of reaching a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneCost {
    pub base: Duration,
    pub distance_meters: f64,
}

/// Travel for one mission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub latency: Duration,
    pub distance_meters: f64,
}

/// Zone → handling latency. HOT_ZONE sits closer to the pick stations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyModel {
    pub hot_zone: ZoneCost,
    pub long_tail: ZoneCost,
    /// Multiplier on every latency; `0.0` makes missions instantaneous.
    pub time_scale: f64,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self {
            hot_zone: ZoneCost {
                base: Duration::from_millis(500),
                distance_meters: 15.0,
            },
            long_tail: ZoneCost {
                base: Duration::from_millis(2000),
                distance_meters: 60.0,
            },
            time_scale: 1.0,
        }
    }
}

impl LatencyModel {
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn leg(&self, zone: Zone) -> Leg {
        let cost = match zone {
            Zone::HotZone => self.hot_zone,
            Zone::LongTail => self.long_tail,
        };
        let scale = if self.time_scale.is_finite() {
            self.time_scale.max(0.0)
        } else {
            1.0
        };
        Leg {
            latency: Duration::try_from_secs_f64(cost.base.as_secs_f64() * scale)
                .unwrap_or(Duration::MAX),
            distance_meters: cost.distance_meters,
        }
    }
}

/// The wait that stands in for physical execution time.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Real wall-clock sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantPause;

impl Pause for InstantPause {
    fn pause(&self, _duration: Duration) {}
}

/// Shape of a physical jam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultSignature {
    /// Snagged tote or blocked path; the robot is fine.
    Mechanical,
    /// Matches a hardware failure pattern; the robot needs service.
    Hardware,
}

/// Decides whether a mission jams.
pub trait FaultInjector: Send + Sync {
    fn inspect(&self, task: &AssignmentTask) -> Option<FaultSignature>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn inspect(&self, _task: &AssignmentTask) -> Option<FaultSignature> {
        None
    }
}

/// Jams with a fixed probability; `hardware_share` of jams are hardware faults.
#[derive(Debug)]
pub struct RandomFaults {
    jam_probability: f64,
    hardware_share: f64,
    rng: Mutex<StdRng>,
}

impl RandomFaults {
    pub fn new(jam_probability: f64, hardware_share: f64) -> Self {
        Self::with_rng(jam_probability, hardware_share, StdRng::from_entropy())
    }

    pub fn seeded(jam_probability: f64, hardware_share: f64, seed: u64) -> Self {
        Self::with_rng(jam_probability, hardware_share, StdRng::seed_from_u64(seed))
    }

    fn with_rng(jam_probability: f64, hardware_share: f64, rng: StdRng) -> Self {
        Self {
            jam_probability: clamp_probability(jam_probability),
            hardware_share: clamp_probability(hardware_share),
            rng: Mutex::new(rng),
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
}

impl FaultInjector for RandomFaults {
    fn inspect(&self, _task: &AssignmentTask) -> Option<FaultSignature> {
        let mut rng = self.rng.lock();
        if !rng.gen_bool(self.jam_probability) {
            return None;
        }
        if rng.gen_bool(self.hardware_share) {
            Some(FaultSignature::Hardware)
        } else {
            Some(FaultSignature::Mechanical)
        }
    }
}

/// Replays a fixed script of outcomes, then falls back to a constant outcome.
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    script: Mutex<VecDeque<Option<FaultSignature>>>,
    fallback: Option<FaultSignature>,
}

impl ScriptedFaults {
    pub fn new(script: impl IntoIterator<Item = Option<FaultSignature>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
        }
    }

    pub fn always(signature: FaultSignature) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(signature),
        }
    }
}

impl FaultInjector for ScriptedFaults {
    fn inspect(&self, _task: &AssignmentTask) -> Option<FaultSignature> {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

/// Why handling did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingFault {
    Jam(FaultSignature),
    /// The leg would outlast the handling timeout.
    Timeout,
}

/// Runs the suspension point for one mission.
pub struct SimulatedHandling {
    pause: Box<dyn Pause>,
    faults: Box<dyn FaultInjector>,
    timeout: Duration,
}

impl SimulatedHandling {
    pub fn new(pause: Box<dyn Pause>, faults: Box<dyn FaultInjector>, timeout: Duration) -> Self {
        Self {
            pause,
            faults,
            timeout,
        }
    }

    /// Wait out the leg (bounded by the timeout), then ask the injector for a jam.
    pub fn perform(&self, task: &AssignmentTask, leg: &Leg) -> Result<(), HandlingFault> {
        if leg.latency > self.timeout {
            self.pause.pause(self.timeout);
            return Err(HandlingFault::Timeout);
        }
        self.pause.pause(leg.latency);
        match self.faults.inspect(task) {
            Some(signature) => Err(HandlingFault::Jam(signature)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SimulatedHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedHandling")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
