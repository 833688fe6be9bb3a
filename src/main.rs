use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use location_fusion_rs::live_status::LiveStatus;
use location_fusion_rs::map_match::RoadSegment;
use location_fusion_rs::session_log::SessionLog;
use location_fusion_rs::sim::{DriveProfile, DriveSimulator, SimEvent, SpoofInjection};
use location_fusion_rs::{FusionConfig, FusionInput, FusionOrchestrator, FusionRuntime, TrustLevel};

#[derive(Parser, Debug)]
#[command(name = "location_fusion")]
#[command(about = "Location fusion demo - simulated drive with optional GPS spoofing", long_about = None)]
struct Args {
    /// Cruise phase length in seconds
    #[arg(value_name = "SECONDS", default_value = "20")]
    cruise_secs: f64,

    /// Start spoofing satellite fixes this many seconds into the drive
    #[arg(long)]
    spoof_at: Option<f64>,

    /// Direction of travel in degrees (non-zero)
    #[arg(long, default_value = "60")]
    heading: f64,

    /// Feed raw frames through the preprocessor instead of clean samples
    #[arg(long)]
    raw: bool,

    /// Snap published fixes onto the simulated road
    #[arg(long)]
    snap: bool,

    /// JSON config file (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input queue capacity
    #[arg(long, default_value = "1024")]
    capacity: usize,

    /// Save the generated session as .json.gz for the replay tool
    #[arg(long)]
    record: bool,

    /// Output directory
    #[arg(long, default_value = "location_fusion_sessions")]
    output_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Location Fusion Starting", ts_now());
    println!("  Cruise: {} seconds", args.cruise_secs);
    println!("  Heading: {} deg", args.heading);
    match args.spoof_at {
        Some(secs) => println!("  Spoofing from: {} s", secs),
        None => println!("  Spoofing: off"),
    }
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir))?;

    let mut config = match &args.config {
        Some(path) => FusionConfig::from_json_file(path)?,
        None => FusionConfig::default(),
    };
    config.snap.snap_published |= args.snap;
    config.validate()?;

    let start_millis = Utc::now().timestamp_millis();
    let profile = DriveProfile {
        heading_deg: args.heading,
        cruise_secs: args.cruise_secs,
        start_millis,
        spoof: args.spoof_at.map(|secs| SpoofInjection {
            from_millis: start_millis + (secs * 1000.0) as i64,
            ..SpoofInjection::default()
        }),
        ..DriveProfile::default()
    };
    if profile.heading_deg.rem_euclid(360.0) == 0.0 {
        anyhow::bail!("heading must be non-zero: a zero bearing reads as unset");
    }

    let total_secs = profile.duration_millis() as f64 / 1000.0;
    let (end_lat, end_lon) = profile.position_at(total_secs);
    let road = RoadSegment::new(1, profile.start_lat, profile.start_lon, end_lat, end_lon);

    let mut orchestrator = FusionOrchestrator::new(config.clone());
    orchestrator.load_roads(vec![road.clone()]);

    let mut session = SessionLog {
        config: Some(config),
        roads: vec![road],
        ..SessionLog::default()
    };

    let handle = FusionRuntime::spawn(orchestrator, args.capacity);

    // Print every trust level change as it happens
    let mut status_rx = handle.subscribe_status();
    let watcher = tokio::spawn(async move {
        let mut last_level: Option<TrustLevel> = None;
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if let Some(status) = status {
                if last_level != Some(status.level) {
                    println!("[{}] {}", ts_now(), status.text);
                    last_level = Some(status.level);
                }
            }
        }
    });

    println!("[{}] Driving {:.0} s of simulated data...", ts_now(), total_secs);
    let wall_start = Utc::now();
    let mut fix_count = 0u64;

    for event in DriveSimulator::new(profile).with_raw_frames(args.raw) {
        let mut report = false;
        let input = match event {
            SimEvent::Raw(frame) => {
                if args.record {
                    session.raw_frames.push(frame.clone());
                }
                FusionInput::Sensor(frame)
            }
            SimEvent::Sample(sample) => {
                if args.record {
                    session.samples.push(sample.clone());
                }
                FusionInput::Sample(sample)
            }
            SimEvent::Satellite(fix) => {
                fix_count += 1;
                report = fix_count % 10 == 0;
                if args.record {
                    session.fixes.push(fix.clone());
                }
                FusionInput::SatelliteFix(fix)
            }
        };
        handle.send(input).await?;

        if report {
            if let Some(fix) = handle.location() {
                println!(
                    "[{}] {} fixes, location ({:.6}, {:.6}) via {}",
                    ts_now(),
                    fix_count,
                    fix.latitude,
                    fix.longitude,
                    fix.source.label()
                );
            }
        }
    }

    let snapshot = handle.shutdown().await?;
    watcher.await?;

    let uptime = Utc::now().signed_duration_since(wall_start).num_seconds().max(0) as u64;
    let status = LiveStatus::from_snapshot(&snapshot, uptime);
    let status_path = format!("{}/live_status_final.json", args.output_dir);
    status
        .save(&status_path)
        .with_context(|| format!("writing {}", status_path))?;

    if args.record {
        let session_path = format!("{}/session_{}.json.gz", args.output_dir, ts_now_clean());
        session.save(&session_path)?;
        println!("[{}] Recorded {} inputs to {}", ts_now(), session.input_count(), session_path);
    }

    let counters = &snapshot.counters;
    println!("\n=== Final Stats ===");
    println!(
        "Satellite fixes: {} trusted, {} suspicious, {} spoofed",
        counters.trusted_fixes, counters.suspicious_fixes, counters.spoofed_fixes
    );
    println!("Inertial updates: {}", counters.inertial_updates);
    println!("Published locations: {}", counters.published);
    println!("Integrator reseeds: {}, gaps skipped: {}", snapshot.integrator.reseeds, snapshot.integrator.skipped_gaps);
    if let Some(fix) = &snapshot.last_published {
        println!(
            "Last location: ({:.6}, {:.6}) via {}",
            fix.latitude,
            fix.longitude,
            fix.source.label()
        );
    }
    println!("Status: {}", status.status_text);

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
