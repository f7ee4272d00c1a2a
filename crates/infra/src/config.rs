//! Engine configuration.
//!
//! Every struct has a `Default` matching production values. `EngineConfig::from_env`
//! overlays `WAREFLOW_*` variables; anything unparseable is logged and ignored.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use wareflow_ai::{check_demand_threshold, MaintenanceThresholds};

use crate::error::EngineError;
use crate::handling::LatencyModel;
use crate::retry::RetryPolicy;

/// Cadence and failure backoff of one periodic background runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub interval: Duration,
    /// Consecutive failed passes retried before waiting for the next tick.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl RunnerConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

/// How the dispatcher picks among eligible robots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotSelection {
    /// First robot in registry order.
    FirstEligible,
    /// Robot with the fewest completed missions; spreads wear across the fleet.
    #[default]
    LeastWorn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Claim races tolerated before surfacing `NoAvailableRobot`.
    pub max_claim_attempts: u32,
    pub lease_ttl: Duration,
    pub handling_timeout: Duration,
    /// Battery percent consumed per meter travelled.
    pub battery_drain_per_meter: f64,
    pub selection: RobotSelection,
    pub latency: LatencyModel,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_claim_attempts: 3,
            lease_ttl: Duration::from_secs(30),
            handling_timeout: Duration::from_secs(10),
            battery_drain_per_meter: 0.01,
            selection: RobotSelection::default(),
            latency: LatencyModel::default(),
        }
    }
}

impl DispatchConfig {
    pub fn with_latency(mut self, latency: LatencyModel) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_handling_timeout(mut self, timeout: Duration) -> Self {
        self.handling_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_selection(mut self, selection: RobotSelection) -> Self {
        self.selection = selection;
        self
    }

    /// A lease must outlive the longest mission, or the reaper could hand a
    /// robot that is still working to another worker.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.lease_ttl <= self.handling_timeout {
            return Err(EngineError::Config(format!(
                "lease_ttl ({:?}) must exceed handling_timeout ({:?})",
                self.lease_ttl, self.handling_timeout
            )));
        }
        Ok(())
    }

    /// Lease requested per claim: `lease_ttl`, raised to at least the handling
    /// timeout plus `LEASE_MARGIN`.
    pub fn claim_ttl(&self) -> Duration {
        self.lease_ttl
            .max(self.handling_timeout.saturating_add(LEASE_MARGIN))
    }
}

/// Bookkeeping slack on top of the handling timeout.
pub const LEASE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaintenancePolicy {
    pub thresholds: MaintenanceThresholds,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlottingPolicy {
    /// Promote strictly above this demand score.
    pub hot_threshold: f64,
    pub runner: RunnerConfig,
}

impl Default for SlottingPolicy {
    fn default() -> Self {
        Self {
            hot_threshold: 0.85,
            runner: RunnerConfig::every(Duration::from_secs(30)),
        }
    }
}

/// Demotion out of HOT_ZONE. Off unless explicitly enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayPolicy {
    pub enabled: bool,
    /// Demote hot units strictly below this demand score.
    pub demote_below: f64,
    pub runner: RunnerConfig,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            demote_below: 0.5,
            runner: RunnerConfig::every(Duration::from_secs(300)),
        }
    }
}

impl DecayPolicy {
    pub fn enabled(demote_below: f64) -> Self {
        Self {
            enabled: true,
            demote_below,
            ..Default::default()
        }
    }
}

/// Random jam model used outside of tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    pub jam_probability: f64,
    /// Share of jams that match a hardware signature.
    pub hardware_share: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            jam_probability: 0.02,
            hardware_share: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub workers: usize,
    pub fleet_size: usize,
    pub dispatch: DispatchConfig,
    pub maintenance: MaintenancePolicy,
    pub slotting: SlottingPolicy,
    pub decay: DecayPolicy,
    pub faults: FaultConfig,
    /// Requeue policy for picks that hit a transient dispatch error.
    pub pick_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            fleet_size: 10,
            dispatch: DispatchConfig::default(),
            maintenance: MaintenancePolicy::default(),
            slotting: SlottingPolicy::default(),
            decay: DecayPolicy::default(),
            faults: FaultConfig::default(),
            pick_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings that would break dispatch or fail every runner pass.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.dispatch.validate()?;
        self.maintenance.thresholds.validate()?;
        check_demand_threshold("hot_threshold", self.slotting.hot_threshold)?;
        check_demand_threshold("demote_below", self.decay.demote_below)?;
        Ok(())
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(&lookup);
        let mut cfg = Self::default();

        cfg.workers = env.parse("WAREFLOW_WORKERS", cfg.workers).max(1);
        cfg.fleet_size = env.parse("WAREFLOW_FLEET_SIZE", cfg.fleet_size);

        let d = &mut cfg.dispatch;
        d.max_claim_attempts = env.parse("WAREFLOW_CLAIM_ATTEMPTS", d.max_claim_attempts).max(1);
        d.lease_ttl = env.millis("WAREFLOW_LEASE_TTL_MS", d.lease_ttl);
        d.handling_timeout = env.millis("WAREFLOW_HANDLING_TIMEOUT_MS", d.handling_timeout);
        d.latency.time_scale = env.parse("WAREFLOW_TIME_SCALE", d.latency.time_scale);

        let t = &mut cfg.maintenance.thresholds;
        t.max_motor_temp_c = env.parse("WAREFLOW_MAX_MOTOR_TEMP_C", t.max_motor_temp_c);
        t.max_vibration_index = env.parse("WAREFLOW_MAX_VIBRATION", t.max_vibration_index);
        cfg.maintenance.runner.interval =
            env.millis("WAREFLOW_MONITOR_INTERVAL_MS", cfg.maintenance.runner.interval);

        cfg.slotting.hot_threshold = env.parse("WAREFLOW_HOT_THRESHOLD", cfg.slotting.hot_threshold);
        cfg.slotting.runner.interval =
            env.millis("WAREFLOW_SLOTTING_INTERVAL_MS", cfg.slotting.runner.interval);

        cfg.decay.enabled = env.parse("WAREFLOW_DECAY_ENABLED", cfg.decay.enabled);
        cfg.decay.demote_below = env.parse("WAREFLOW_DEMOTE_BELOW", cfg.decay.demote_below);
        cfg.decay.runner.interval = env.millis("WAREFLOW_DECAY_INTERVAL_MS", cfg.decay.runner.interval);

        cfg.faults.jam_probability = env.parse("WAREFLOW_JAM_PROBABILITY", cfg.faults.jam_probability);
        cfg.faults.hardware_share =
            env.parse("WAREFLOW_HARDWARE_FAULT_SHARE", cfg.faults.hardware_share);

        cfg
    }
}

/// Upper bound for any duration read from the environment (one week).
pub const MAX_SETTING_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        let Some(raw) = (self.0)(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "unparseable setting; using default");
                default
            }
        }
    }

    /// Durations are capped at `MAX_SETTING_DURATION`.
    fn millis(&self, key: &str, default: Duration) -> Duration {
        let ms = self.parse(key, default.as_millis() as u64);
        let value = Duration::from_millis(ms);
        if value > MAX_SETTING_DURATION {
            warn!(key, ms, "setting too large; capped");
            return MAX_SETTING_DURATION;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_operating_policy() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.maintenance.thresholds.max_motor_temp_c, 75.0);
        assert_eq!(cfg.maintenance.thresholds.max_vibration_index, 0.8);
        assert_eq!(cfg.slotting.hot_threshold, 0.85);
        assert_eq!(cfg.dispatch.max_claim_attempts, 3);
        assert_eq!(cfg.dispatch.lease_ttl, Duration::from_secs(30));
        assert!(!cfg.decay.enabled);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("WAREFLOW_WORKERS", "8"),
            ("WAREFLOW_LEASE_TTL_MS", "1500"),
            ("WAREFLOW_TIME_SCALE", "0.01"),
            ("WAREFLOW_DECAY_ENABLED", "true"),
            ("WAREFLOW_MAX_MOTOR_TEMP_C", " 70.5 "),
        ]));

        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.dispatch.lease_ttl, Duration::from_millis(1500));
        assert_eq!(cfg.dispatch.latency.time_scale, 0.01);
        assert!(cfg.decay.enabled);
        assert_eq!(cfg.maintenance.thresholds.max_motor_temp_c, 70.5);
    }

    #[test]
    fn huge_durations_are_capped() {
        let cfg = EngineConfig::from_lookup(lookup(&[(
            "WAREFLOW_MONITOR_INTERVAL_MS",
            "18446744073709551615",
        )]));
        assert_eq!(cfg.maintenance.runner.interval, MAX_SETTING_DURATION);
    }

    #[test]
    fn lease_shorter_than_handling_timeout_is_rejected() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("WAREFLOW_LEASE_TTL_MS", "10"),
            ("WAREFLOW_HANDLING_TIMEOUT_MS", "100"),
        ]));
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));

        let equal = DispatchConfig::default()
            .with_lease_ttl(Duration::from_millis(100))
            .with_handling_timeout(Duration::from_millis(100));
        assert!(equal.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn claim_ttl_never_undercuts_the_handling_timeout() {
        let cfg = DispatchConfig::default()
            .with_lease_ttl(Duration::from_millis(10))
            .with_handling_timeout(Duration::from_millis(100));
        assert_eq!(cfg.claim_ttl(), Duration::from_millis(100) + LEASE_MARGIN);
        assert_eq!(DispatchConfig::default().claim_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn out_of_range_demand_thresholds_are_rejected() {
        let cfg = EngineConfig::from_lookup(lookup(&[("WAREFLOW_HOT_THRESHOLD", "1.5")]));
        assert!(matches!(cfg.validate(), Err(EngineError::Analysis(_))));

        let cfg = EngineConfig::from_lookup(lookup(&[("WAREFLOW_DEMOTE_BELOW", "-0.1")]));
        assert!(matches!(cfg.validate(), Err(EngineError::Analysis(_))));
    }

    #[test]
    fn garbage_values_fall_back() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("WAREFLOW_WORKERS", "lots"),
            ("WAREFLOW_HOT_THRESHOLD", "high"),
        ]));
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.slotting.hot_threshold, 0.85);
    }
}
