//! End-to-end warehouse run: fleet online, inbound stows, slotting, picks, summary.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use rand::Rng;
use tracing::{info, warn};

use wareflow_core::UnitId;
use wareflow_events::{EscalationEvent, JsonLinesSink, MissionRecord, Sink, TracingSink};
use wareflow_fleet::{FleetInit, RandomTelemetry, RobotType};
use wareflow_infra::{DispatchError, EngineConfig, WarehouseEngine};
use wareflow_inventory::{StowRequest, UnitStatus};

const DEFAULT_UNITS: usize = 100;
/// Robots reserved for inbound stows; the rest of the fleet picks.
const STOW_ROBOTS: usize = 2;
const FAST_TIME_SCALE: f64 = 0.01;
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

struct Args {
    units: usize,
    fast: bool,
    out_dir: Option<PathBuf>,
}

fn print_usage(program: &str) {
    println!("Usage:");
    println!("  {program} [units] [--fast] [--out DIR]");
    println!();
    println!("  units      inbound units to stow and pick (default {DEFAULT_UNITS})");
    println!("  --fast     scale handling latency by {FAST_TIME_SCALE}");
    println!("  --out DIR  write escalations.jsonl and missions.jsonl into DIR");
    println!();
    println!("Engine settings come from WAREFLOW_* variables; logging from RUST_LOG and WAREFLOW_LOG_FORMAT.");
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "wareflow-sim".to_string());

    let mut args = Args {
        units: DEFAULT_UNITS,
        fast: false,
        out_dir: None,
    };
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage(&program);
                return Ok(None);
            }
            "--fast" => args.fast = true,
            "--out" => {
                let dir = argv.next().context("--out needs a directory")?;
                args.out_dir = Some(PathBuf::from(dir));
            }
            other => {
                args.units = other
                    .parse()
                    .with_context(|| format!("invalid unit count: {other}"))?;
            }
        }
    }
    Ok(Some(args))
}

fn jsonl_sink(dir: &Path, name: &str) -> anyhow::Result<Arc<JsonLinesSink<BufWriter<File>>>> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    info!(path = %path.display(), "writing json lines");
    Ok(Arc::new(JsonLinesSink::new(BufWriter::new(file))))
}

fn build_engine(config: EngineConfig, out_dir: Option<&Path>) -> anyhow::Result<WarehouseEngine> {
    let builder = WarehouseEngine::builder(config);
    let builder = match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let escalations: Arc<dyn Sink<EscalationEvent>> = jsonl_sink(dir, "escalations.jsonl")?;
            let missions: Arc<dyn Sink<MissionRecord>> = jsonl_sink(dir, "missions.jsonl")?;
            builder.escalation_sink(escalations).mission_sink(missions)
        }
        None => builder
            .escalation_sink(Arc::new(TracingSink::new("escalation")))
            .mission_sink(Arc::new(TracingSink::new("analytics"))),
    };
    Ok(builder.build()?)
}

#[derive(Debug)]
struct Inbound {
    stowed: Vec<UnitId>,
    /// Units turned away because no STOW robot was free.
    skipped: usize,
}

/// Stow `count` units with random demand through the STOW robots.
fn inbound(engine: &WarehouseEngine, count: usize) -> anyhow::Result<Inbound> {
    let mut rng = rand::thread_rng();
    let mut inbound = Inbound {
        stowed: Vec::with_capacity(count),
        skipped: 0,
    };

    for index in 0..count {
        let request = StowRequest::new(
            format!("SKU-{:05}", rng.gen_range(0..50_000)),
            format!("POD-{:03}-{}", rng.gen_range(0..200), index % 4),
        )
        .with_demand(rng.gen_range(0.0..=1.0))
        .with_weight(rng.gen_range(50..20_000));
        let unit = request.unit_id;

        match engine.dispatch_stow(request) {
            Ok(record) => inbound.stowed.push(record.unit_id),
            Err(DispatchError::Failure { unit, reason, .. }) => {
                warn!(unit = %unit, reason = ?reason, "stow jammed");
            }
            Err(DispatchError::Interrupted { unit, .. }) => {
                warn!(unit = %unit, "stow interrupted");
            }
            Err(e) if e.is_transient() => {
                warn!(unit = %unit, error = %e, "stow skipped");
                inbound.skipped += 1;
            }
            Err(e) => return Err(e).context("stow failed"),
        }
    }
    Ok(inbound)
}

fn main() -> anyhow::Result<()> {
    wareflow_observability::init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let mut config = EngineConfig::from_env();
    if args.fast {
        config.dispatch.latency = config.dispatch.latency.with_time_scale(FAST_TIME_SCALE);
    }
    if config.fleet_size <= STOW_ROBOTS {
        bail!("fleet size {} leaves no pick robots", config.fleet_size);
    }

    let engine = build_engine(config, args.out_dir.as_deref())?;
    let init = FleetInit::new(engine.config().fleet_size)
        .with_types(vec![RobotType::Stow; STOW_ROBOTS])
        .with_default_type(RobotType::Pick);
    engine.initialize_fleet(&init, &mut RandomTelemetry::new())?;

    let started = Instant::now();
    let inbound = inbound(&engine, args.units)?;
    info!(
        requested = args.units,
        stowed = inbound.stowed.len(),
        skipped = inbound.skipped,
        "inbound done"
    );

    let promoted = engine.run_slotting_pass()?;
    let health = engine.run_monitor_pass()?;
    info!(promoted, flagged = health.flagged.len(), "initial passes done");

    engine.start()?;
    for unit_id in engine.twin().ids_with_status(UnitStatus::Stowed) {
        engine.request_pick(unit_id)?;
    }
    if !engine.wait_idle(IDLE_TIMEOUT) {
        warn!(timeout_s = IDLE_TIMEOUT.as_secs(), "picks still in flight at timeout");
    }

    let summary = engine.shutdown();
    let elapsed = started.elapsed();
    let units_per_hour = if elapsed.is_zero() {
        0.0
    } else {
        summary.missions.completed as f64 * 3600.0 / elapsed.as_secs_f64()
    };

    info!(
        completed = summary.missions.completed,
        failed = summary.missions.failed,
        interrupted = summary.missions.interrupted,
        escalations = summary.escalations,
        abandoned = summary.abandoned_picks,
        elapsed_s = elapsed.as_secs_f64(),
        units_per_hour,
        "simulation finished"
    );
    Ok(())
}
