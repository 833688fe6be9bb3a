use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use location_fusion_rs::session_log::SessionLog;
use location_fusion_rs::{FusionConfig, FusionEvent, FusionInput, FusionOrchestrator};
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// JSON config overriding the one recorded in the log
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snap published fixes onto the recorded roads
    #[arg(long, default_value_t = false)]
    snap: bool,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = SessionLog::load(path)?;

    let mut config = match args.config.as_ref() {
        Some(config_path) => FusionConfig::from_json_file(config_path)?,
        None => log.config.clone().unwrap_or_default(),
    };
    config.snap.snap_published |= args.snap;
    config.validate()?;

    let mut orchestrator = FusionOrchestrator::new(config);
    orchestrator.load_roads(log.roads.clone());

    let mut published_by_source: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut reseed_drift = Vec::new();
    let mut first_spoof_ts: Option<i64> = None;
    let mut spoof_transitions = 0u64;

    for input in log.inputs() {
        let events = match input {
            FusionInput::Sensor(frame) => orchestrator.on_raw_sensor(&frame),
            FusionInput::Sample(sample) => orchestrator.on_sensor_sample(&sample),
            FusionInput::SatelliteFix(fix) => {
                // How far dead reckoning wandered since the last reseed
                let inertial = orchestrator.integrator().current_fix();
                let events = orchestrator.on_satellite_fix(&fix);
                let reseeded = events
                    .iter()
                    .any(|e| matches!(e, FusionEvent::IntegratorReseeded { .. }));
                if let (true, Some(inertial)) = (reseeded, inertial) {
                    reseed_drift.push(inertial.distance_to(&fix));
                }
                if orchestrator.is_spoofed() && first_spoof_ts.is_none() {
                    first_spoof_ts = Some(fix.timestamp_millis);
                }
                events
            }
            FusionInput::PeerPacket {
                peer_id,
                bytes,
                received_at_millis,
            } => orchestrator.on_peer_packet(peer_id, &bytes, received_at_millis),
            FusionInput::Shutdown => break,
        };

        for event in &events {
            match event {
                FusionEvent::Published { fix } => {
                    *published_by_source.entry(fix.source.label()).or_insert(0) += 1;
                }
                FusionEvent::SpoofStateChanged { .. } => spoof_transitions += 1,
                _ => {}
            }
        }
    }

    let snapshot = orchestrator.snapshot();
    let counters = &snapshot.counters;
    let max_drift = reseed_drift.iter().copied().fold(0.0_f64, f64::max);

    Ok(json!({
        "log": path.display().to_string(),
        "inputs": log.input_count(),
        "trusted_fixes": counters.trusted_fixes,
        "suspicious_fixes": counters.suspicious_fixes,
        "spoofed_fixes": counters.spoofed_fixes,
        "inertial_updates": counters.inertial_updates,
        "published": published_by_source,
        "spoof_transitions": spoof_transitions,
        "first_spoof_ts": first_spoof_ts,
        "spoofed_at_end": snapshot.spoofed,
        "reseeds": snapshot.integrator.reseeds,
        "skipped_gaps": snapshot.integrator.skipped_gaps,
        "mean_reseed_drift_m": mean(&reseed_drift),
        "max_reseed_drift_m": max_drift,
        "peers": snapshot.peer_count,
        "dropped_peer_packets": counters.dropped_peer_packets,
        "peer_consensus": orchestrator.peer_consensus(),
        "road_segments": snapshot.road_segments,
        "last_published": snapshot.last_published,
        "status": snapshot.status.as_ref().map(|s| s.text.clone()),
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
