//! Fleet initialization and telemetry generation.
//!
//! Random telemetry sits behind [`TelemetryGenerator`] so tests can pin every value.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use wareflow_core::{DomainResult, RobotId};

use crate::registry::FleetRegistry;
use crate::robot::{RobotRecord, RobotType, Telemetry};

/// Source of robot telemetry for freshly initialized robots and mission wear.
pub trait TelemetryGenerator: Send {
    /// Telemetry for a robot coming online.
    fn initial(&mut self) -> Telemetry;

    /// Motor temperature rise (°C) caused by one completed mission.
    fn mission_heat(&mut self) -> f64;
}

/// Bounded random telemetry (temperature 30–40 °C, vibration 0.1–0.3, 0–500 cycles).
#[derive(Debug)]
pub struct RandomTelemetry {
    rng: StdRng,
    motor_temp_c: RangeInclusive<f64>,
    vibration_index: RangeInclusive<f64>,
    battery_cycles: RangeInclusive<u32>,
    battery_level: RangeInclusive<f64>,
    mission_heat_c: RangeInclusive<f64>,
}

impl RandomTelemetry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible generator for simulations.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            motor_temp_c: 30.0..=40.0,
            vibration_index: 0.1..=0.3,
            battery_cycles: 0..=500,
            battery_level: 80.0..=100.0,
            mission_heat_c: 1.0..=3.0,
        }
    }
}

impl Default for RandomTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryGenerator for RandomTelemetry {
    fn initial(&mut self) -> Telemetry {
        Telemetry {
            motor_temp_c: self.rng.gen_range(self.motor_temp_c.clone()),
            battery_cycles: self.rng.gen_range(self.battery_cycles.clone()),
            vibration_index: self.rng.gen_range(self.vibration_index.clone()),
            battery_level: self.rng.gen_range(self.battery_level.clone()),
        }
    }

    fn mission_heat(&mut self) -> f64 {
        self.rng.gen_range(self.mission_heat_c.clone())
    }
}

/// Deterministic generator: every robot gets the same telemetry and heat.
#[derive(Debug, Clone, Copy)]
pub struct FixedTelemetry {
    pub telemetry: Telemetry,
    pub mission_heat_c: f64,
}

impl FixedTelemetry {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            mission_heat_c: 0.0,
        }
    }

    pub fn with_mission_heat(mut self, heat_c: f64) -> Self {
        self.mission_heat_c = heat_c;
        self
    }
}

impl TelemetryGenerator for FixedTelemetry {
    fn initial(&mut self) -> Telemetry {
        self.telemetry
    }

    fn mission_heat(&mut self) -> f64 {
        self.mission_heat_c
    }
}

/// Fleet initialization input: a count, optional per-robot capabilities and
/// optional explicit telemetry.
#[derive(Debug, Clone)]
pub struct FleetInit {
    pub count: usize,
    /// Capability of robot `i`; robots past the end use `default_type`.
    pub types: Vec<RobotType>,
    pub default_type: RobotType,
    /// Explicit telemetry for every robot; the generator is used when `None`.
    pub telemetry: Option<Telemetry>,
}

impl FleetInit {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            types: Vec::new(),
            default_type: RobotType::Pick,
            telemetry: None,
        }
    }

    pub fn with_types(mut self, types: Vec<RobotType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_default_type(mut self, robot_type: RobotType) -> Self {
        self.default_type = robot_type;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn type_of(&self, index: usize) -> RobotType {
        self.types.get(index).copied().unwrap_or(self.default_type)
    }
}

/// Register `init.count` robots, numbered per capability (`PICK-000`, `STOW-000`, ...).
pub fn initialize_fleet(
    registry: &FleetRegistry,
    init: &FleetInit,
    generator: &mut dyn TelemetryGenerator,
) -> DomainResult<Vec<RobotId>> {
    let mut next_serial: HashMap<RobotType, usize> = HashMap::new();
    let mut ids = Vec::with_capacity(init.count);

    for index in 0..init.count {
        let robot_type = init.type_of(index);
        let serial = next_serial.entry(robot_type).or_insert(0);
        let id = RobotId::serial(robot_type.as_str(), *serial);
        *serial += 1;

        let telemetry = init.telemetry.unwrap_or_else(|| generator.initial());
        registry.register(RobotRecord::new(id.clone(), robot_type, telemetry))?;
        ids.push(id);
    }

    info!(robots = ids.len(), "fleet online");
    Ok(ids)
}
