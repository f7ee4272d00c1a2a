//! End-to-end scenarios through `WarehouseEngine`.
//!
//! Engines here run with `InstantPause`, scripted faults and recording sinks, so
//! every scenario is deterministic apart from the worker-pool test.

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;
    use proptest::prelude::*;

    use wareflow_core::{RobotId, UnitId};
    use wareflow_events::{EscalationEvent, MissionRecord, MissionStatus, ReasonCode, RecordingSink};
    use wareflow_fleet::{FixedTelemetry, RobotRecord, RobotStatus, RobotType, Telemetry};
    use wareflow_inventory::{StowRequest, UnitStatus, Zone};

    use crate::config::{EngineConfig, RunnerConfig};
    use crate::error::{DispatchError, EngineError};
    use crate::handling::{AssignmentTask, FaultInjector, FaultSignature, InstantPause, ScriptedFaults};
    use crate::retry::RetryPolicy;
    use crate::engine::WarehouseEngine;

    struct Harness {
        engine: WarehouseEngine,
        escalations: Arc<RecordingSink<EscalationEvent>>,
        missions: Arc<RecordingSink<MissionRecord>>,
    }

    impl Harness {
        fn new(config: EngineConfig, faults: Box<dyn FaultInjector>) -> Self {
            let escalations = Arc::new(RecordingSink::<EscalationEvent>::new());
            let missions = Arc::new(RecordingSink::<MissionRecord>::new());
            let engine = WarehouseEngine::builder(config)
                .escalation_sink(escalations.clone())
                .mission_sink(missions.clone())
                .pause(Box::new(InstantPause))
                .faults(faults)
                .telemetry(Box::new(FixedTelemetry::new(cool()).with_mission_heat(0.0)))
                .build()
                .unwrap();
            Self {
                engine,
                escalations,
                missions,
            }
        }

        fn quiet() -> Self {
            Self::new(EngineConfig::default(), Box::new(ScriptedFaults::default()))
        }

        fn add_picker(&self, index: usize, telemetry: Telemetry) -> RobotId {
            let id = RobotId::serial("PICK", index);
            self.engine
                .fleet()
                .register(RobotRecord::new(id.clone(), RobotType::Pick, telemetry))
                .unwrap();
            id
        }

        fn stow(&self, demand: f64) -> UnitId {
            self.engine
                .stow(StowRequest::new("SKU-10001", "POD-A-01").with_demand(demand))
                .unwrap()
        }

        /// A HOT_ZONE unit already waiting for a robot.
        fn pending_hot_unit(&self) -> UnitId {
            let id = self.stow(0.9);
            self.engine.run_slotting_pass().unwrap();
            self.engine.twin().transition(id, UnitStatus::PendingPick, None).unwrap();
            id
        }

        fn escalations(&self) -> Vec<EscalationEvent> {
            self.engine.flush();
            self.escalations.all()
        }

        fn missions(&self) -> Vec<MissionRecord> {
            self.engine.flush();
            self.missions.all()
        }
    }

    fn cool() -> Telemetry {
        Telemetry::new(35.0, 0.2)
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn hot_unit_without_robots_stays_pending() {
        let h = Harness::quiet();
        let id = h.stow(0.9);

        assert_eq!(h.engine.run_slotting_pass().unwrap(), 1);
        assert_eq!(h.engine.twin().get(id).unwrap().zone(), Zone::HotZone);

        h.engine.request_pick(id).unwrap();
        let err = h.engine.dispatcher().dispatch_pick(id).unwrap_err();

        assert_eq!(err, DispatchError::NoAvailableRobot { capability: RobotType::Pick });
        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::PendingPick);
        assert!(h.missions().is_empty());
        assert!(h.escalations().is_empty());
    }

    #[test]
    fn healthy_robot_picks_a_pending_unit() {
        let h = Harness::quiet();
        let robot = h.add_picker(0, cool());
        let id = h.pending_hot_unit();

        let record = h.engine.dispatcher().dispatch_pick(id).unwrap();

        let unit = h.engine.twin().get(id).unwrap();
        assert_eq!(unit.status(), UnitStatus::Picked);
        assert_eq!(unit.last_robot(), Some(&robot));
        assert_eq!(unit.history().last().unwrap().status, UnitStatus::Picked);

        let stored = h.engine.fleet().get(&robot).unwrap();
        assert_eq!(stored.status(), RobotStatus::Healthy);
        assert!(stored.lease().is_none());
        assert_eq!(stored.missions_completed(), 1);

        assert_eq!(record.status, MissionStatus::Completed);
        assert_eq!(record.robot_id, robot);
        assert!(record.battery_level_end < record.battery_level_start);

        let missions = h.missions();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].status, MissionStatus::Completed);
        assert!(h.escalations().is_empty());
    }

    #[test]
    fn overheated_robot_is_flagged_exactly_once() {
        let h = Harness::quiet();
        let robot = h.add_picker(0, Telemetry::new(80.0, 0.2));

        let report = h.engine.run_monitor_pass().unwrap();
        assert_eq!(report.flagged, vec![robot.clone()]);
        assert_eq!(
            h.engine.fleet().get(&robot).unwrap().status(),
            RobotStatus::MaintenanceRequired
        );

        let report = h.engine.run_monitor_pass().unwrap();
        assert_eq!(report.flagged.len(), 0);

        let escalations = h.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].reason_code, ReasonCode::Thermal);
        assert_eq!(escalations[0].robot_id.as_ref(), Some(&robot));
        assert_eq!(escalations[0].unit_id, None);
    }

    #[test]
    fn flagged_robot_is_skipped_until_serviced() {
        let h = Harness::quiet();
        let robot = h.add_picker(0, Telemetry::new(80.0, 0.2));
        h.engine.run_monitor_pass().unwrap();

        // Cooling down on its own is not enough.
        h.engine.record_telemetry(&robot, cool()).unwrap();
        h.engine.run_monitor_pass().unwrap();
        let id = h.pending_hot_unit();
        assert!(matches!(
            h.engine.dispatcher().dispatch_pick(id),
            Err(DispatchError::NoAvailableRobot { .. })
        ));

        h.engine.mark_serviced(&robot, Some(cool())).unwrap();
        assert_eq!(h.engine.fleet().get(&robot).unwrap().status(), RobotStatus::Healthy);
        h.engine.dispatcher().dispatch_pick(id).unwrap();
        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::Picked);
    }

    #[test]
    fn mechanical_jam_moves_unit_to_exception() {
        let h = Harness::new(
            EngineConfig::default(),
            Box::new(ScriptedFaults::always(FaultSignature::Mechanical)),
        );
        let robot = h.add_picker(0, cool());
        let id = h.pending_hot_unit();

        let err = h.engine.dispatcher().dispatch_pick(id).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Failure { reason: ReasonCode::MechanicalJam, .. }
        ));

        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::Exception);
        let stored = h.engine.fleet().get(&robot).unwrap();
        assert_eq!(stored.status(), RobotStatus::Healthy);
        assert_eq!(stored.missions_completed(), 0);

        let escalations = h.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].reason_code, ReasonCode::MechanicalJam);
        assert_eq!(escalations[0].message, "Mechanical Jam");
        assert_eq!(escalations[0].unit_id, Some(id));
        assert_eq!(escalations[0].robot_id.as_ref(), Some(&robot));

        let missions = h.missions();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].status, MissionStatus::Failed);
        assert_eq!(missions[0].error_code, Some(ReasonCode::MechanicalJam));
        assert_eq!(missions[0].battery_level_end, missions[0].battery_level_start);
    }

    #[test]
    fn hardware_jam_sends_robot_to_maintenance() {
        let h = Harness::new(
            EngineConfig::default(),
            Box::new(ScriptedFaults::always(FaultSignature::Hardware)),
        );
        let robot = h.add_picker(0, cool());
        let id = h.pending_hot_unit();

        h.engine.dispatcher().dispatch_pick(id).unwrap_err();

        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::Exception);
        assert_eq!(
            h.engine.fleet().get(&robot).unwrap().status(),
            RobotStatus::MaintenanceRequired
        );
        let escalations = h.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].reason_code, ReasonCode::HardwareFault);
    }

    #[test]
    fn slow_handling_is_interrupted() {
        let mut config = EngineConfig::default();
        config.dispatch = config.dispatch.with_handling_timeout(Duration::from_millis(100));
        let h = Harness::new(config, Box::new(ScriptedFaults::default()));
        let robot = h.add_picker(0, cool());
        let id = h.pending_hot_unit();

        let err = h.engine.dispatcher().dispatch_pick(id).unwrap_err();
        assert!(matches!(err, DispatchError::Interrupted { .. }));

        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::Exception);
        assert_eq!(h.engine.fleet().get(&robot).unwrap().status(), RobotStatus::Healthy);
        assert_eq!(h.escalations()[0].reason_code, ReasonCode::Timeout);
        assert_eq!(h.missions()[0].status, MissionStatus::Interrupted);
    }

    #[test]
    fn demand_at_threshold_is_not_promoted() {
        let h = Harness::quiet();
        let at = h.stow(0.85);
        let above = h.stow(0.850_001);

        assert_eq!(h.engine.run_slotting_pass().unwrap(), 1);
        assert_eq!(h.engine.twin().get(at).unwrap().zone(), Zone::LongTail);
        assert_eq!(h.engine.twin().get(above).unwrap().zone(), Zone::HotZone);
    }

    #[test]
    fn stow_mission_records_the_acting_robot() {
        let h = Harness::quiet();
        let stower = RobotId::serial("STOW", 0);
        h.engine
            .fleet()
            .register(RobotRecord::new(stower.clone(), RobotType::Stow, cool()))
            .unwrap();

        let record = h
            .engine
            .dispatch_stow(StowRequest::new("SKU-10002", "POD-B-07"))
            .unwrap();

        let unit = h.engine.twin().get(record.unit_id).unwrap();
        assert_eq!(unit.status(), UnitStatus::Stowed);
        assert_eq!(unit.last_robot(), Some(&stower));
        assert_eq!(h.missions().len(), 1);

        let found = h.engine.find_by_sku("SKU-10002");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unit_id, record.unit_id);
        assert_eq!(found[0].pod_location, "POD-B-07");
    }

    #[test]
    fn expired_lease_is_reclaimed_by_the_monitor() {
        let h = Harness::quiet();
        let robot = h.add_picker(0, cool());
        h.engine
            .fleet()
            .claim(&robot, wareflow_core::MissionId::new(), Duration::ZERO)
            .unwrap()
            .unwrap();
        thread::sleep(Duration::from_millis(5));

        let report = h.engine.run_monitor_pass().unwrap();

        assert_eq!(report.reclaimed, vec![robot.clone()]);
        assert_eq!(h.engine.fleet().get(&robot).unwrap().status(), RobotStatus::Healthy);
        let escalations = h.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].reason_code, ReasonCode::LeaseExpired);
    }

    #[test]
    fn archived_units_cannot_be_requested() {
        let h = Harness::quiet();
        let id = h.stow(0.2);
        h.engine.archive(id).unwrap();

        assert!(h.engine.request_pick(id).is_err());
        assert_eq!(h.engine.twin().get(id).unwrap().status(), UnitStatus::Stowed);
    }

    #[test]
    fn engine_refuses_a_lease_shorter_than_a_mission() {
        let mut config = EngineConfig::default();
        config.dispatch = config
            .dispatch
            .with_lease_ttl(Duration::from_millis(10))
            .with_handling_timeout(Duration::from_millis(100));

        let built = WarehouseEngine::builder(config).build();

        assert!(matches!(built, Err(EngineError::Config(msg)) if msg.contains("lease_ttl")));
    }

    #[test]
    fn engine_refuses_an_out_of_range_hot_threshold() {
        let mut config = EngineConfig::default();
        config.slotting.hot_threshold = 1.5;

        let built = WarehouseEngine::builder(config).build();

        assert!(matches!(built, Err(EngineError::Analysis(_))));
    }

    #[test]
    fn telemetry_report_triggers_an_early_monitor_pass() {
        let mut config = EngineConfig::default();
        config.maintenance.runner = RunnerConfig::every(Duration::from_secs(3600));
        let h = Harness::new(config, Box::new(ScriptedFaults::default()));
        let robot = h.add_picker(0, cool());

        h.engine.start().unwrap();
        // Let the startup pass go by; the next tick is an hour away.
        thread::sleep(Duration::from_millis(200));
        h.engine.record_telemetry(&robot, Telemetry::new(90.0, 0.2)).unwrap();

        assert!(wait_for(Duration::from_secs(2), || {
            h.engine.fleet().get(&robot).unwrap().status() == RobotStatus::MaintenanceRequired
        }));
        let summary = h.engine.shutdown();
        assert_eq!(summary.escalations, 1);
        assert_eq!(h.escalations.all()[0].reason_code, ReasonCode::Thermal);
    }

    /// Records which robots are mid-handling and counts overlaps.
    #[derive(Default)]
    struct OverlapWatch {
        active: Mutex<HashSet<RobotId>>,
        overlaps: AtomicUsize,
        inspected: AtomicUsize,
    }

    impl FaultInjector for Arc<OverlapWatch> {
        fn inspect(&self, task: &AssignmentTask) -> Option<FaultSignature> {
            self.inspected.fetch_add(1, Ordering::SeqCst);
            if !self.active.lock().insert(task.candidate_robot_id.clone()) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            self.active.lock().remove(&task.candidate_robot_id);
            None
        }
    }

    #[test]
    fn worker_pool_never_double_assigns_a_robot() {
        let watch = Arc::new(OverlapWatch::default());
        let mut config = EngineConfig::default();
        config.workers = 6;
        config.pick_retry = RetryPolicy::fixed(200, Duration::from_millis(2));
        let h = Harness::new(config, Box::new(Arc::clone(&watch)));
        let robots: Vec<RobotId> = (0..3).map(|i| h.add_picker(i, cool())).collect();

        let units: Vec<UnitId> = (0..40).map(|_| h.stow(0.9)).collect();
        h.engine.run_slotting_pass().unwrap();
        h.engine.start().unwrap();
        for id in &units {
            h.engine.request_pick(*id).unwrap();
        }

        assert!(h.engine.wait_idle(Duration::from_secs(20)));
        for id in &units {
            assert_eq!(h.engine.twin().get(*id).unwrap().status(), UnitStatus::Picked);
        }
        for robot in &robots {
            assert_eq!(h.engine.fleet().get(robot).unwrap().status(), RobotStatus::Healthy);
        }
        assert_eq!(watch.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(watch.inspected.load(Ordering::SeqCst), units.len());

        // Mission windows of one robot never overlap.
        let mut by_robot: HashMap<RobotId, Vec<MissionRecord>> = HashMap::new();
        for record in h.missions() {
            by_robot.entry(record.robot_id.clone()).or_default().push(record);
        }
        for records in by_robot.values_mut() {
            records.sort_by_key(|r| r.start_ts);
            for pair in records.windows(2) {
                assert!(pair[0].end_ts <= pair[1].start_ts);
            }
        }

        let summary = h.engine.shutdown();
        assert_eq!(summary.missions.completed, units.len() as u64);
        assert_eq!(summary.abandoned_picks, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            .. ProptestConfig::default()
        })]

        #[test]
        fn history_tail_always_matches_status(jams in proptest::collection::vec(any::<bool>(), 1..8)) {
            let script = jams.iter().map(|jam| jam.then_some(FaultSignature::Mechanical));
            let h = Harness::new(EngineConfig::default(), Box::new(ScriptedFaults::new(script)));
            h.add_picker(0, cool());

            for jam in &jams {
                let id = h.pending_hot_unit();
                let outcome = h.engine.dispatcher().dispatch_pick(id);
                prop_assert_eq!(outcome.is_err(), *jam);

                let unit = h.engine.twin().get(id).unwrap();
                let expected = if *jam { UnitStatus::Exception } else { UnitStatus::Picked };
                prop_assert_eq!(unit.status(), expected);
                prop_assert_eq!(unit.history().last().unwrap().status, unit.status());
                // STOWED, PENDING_PICK, IN_TRANSIT, then PICKED or EXCEPTION.
                prop_assert_eq!(unit.history().len(), 4);
            }
            prop_assert_eq!(h.missions().len(), jams.len());
        }

        #[test]
        fn slotting_promotes_exactly_the_units_above_threshold(
            scores in proptest::collection::vec(0.0f64..=1.0, 1..20)
        ) {
            let h = Harness::quiet();
            let ids: Vec<UnitId> = scores.iter().map(|s| h.stow(*s)).collect();

            let moved = h.engine.run_slotting_pass().unwrap();

            prop_assert_eq!(moved, scores.iter().filter(|s| **s > 0.85).count());
            for (id, score) in ids.iter().zip(&scores) {
                let zone = h.engine.twin().get(*id).unwrap().zone();
                prop_assert_eq!(zone == Zone::HotZone, *score > 0.85);
            }
        }
    }
}
