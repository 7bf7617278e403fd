// src/main.rs

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use traffic_flow::analysis::VehicleTracker;
use traffic_flow::config::{AppConfig, ConfigOrigin, OutputPaths};
use traffic_flow::lane_config::{LaneGeometry, LaneGeometryStore};
use traffic_flow::pipeline::{
    FrameSink, FrameSource, PrefetchSource, Session, SessionConfig, SessionParts, SessionReport,
};
use traffic_flow::vehicle_detection::YoloDetector;
use traffic_flow::video_processor::{find_video_files, AnnotatedWriter, VideoReader};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let (config, origin) = AppConfig::load_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Traffic Flow Analysis Starting");
    match origin {
        ConfigOrigin::File => info!("✓ Configuration loaded from {}", config_path),
        ConfigOrigin::Default => warn!("{} not found, using default settings", config_path),
    }

    let store = LaneGeometryStore::new(&config.lanes.config_path);
    let geometry = store.load();

    let video_files = find_video_files(Path::new(&config.video.input))?;
    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input);
        return Ok(());
    }
    info!("Found {} video file(s) to process", video_files.len());

    let mut failures = 0;
    for (idx, video_path) in video_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );
        info!("========================================");

        match process_video(video_path, &config, &geometry) {
            Ok(report) => {
                info!(
                    "✓ Video processed successfully! ({} vehicles, {} events)",
                    report.total(),
                    report.events.len()
                );
            }
            Err(e) => {
                failures += 1;
                error!("Failed to process {}: {:#}", video_path.display(), e);
            }
        }
    }

    if config.lanes.save_on_exit {
        if let Err(e) = store.save(&geometry) {
            warn!("Could not save lane configuration: {}", e);
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} videos failed", failures, video_files.len());
    }
    info!("✓ All videos processed");
    Ok(())
}

fn process_video(path: &Path, config: &AppConfig, geometry: &LaneGeometry) -> Result<SessionReport> {
    let reader = VideoReader::open(path)?;
    let fps = reader.frame_rate();
    let native_size = reader.frame_size();
    let outputs = OutputPaths::for_input(&config.video.output_dir, path);

    let detector = YoloDetector::new(
        &config.detection.model_path,
        config.detection.confidence_threshold,
        config.detection.use_cuda,
        config.detection.num_threads,
    )?;
    let tracker = VehicleTracker::new(config.tracker.clone());

    let mut session_config = SessionConfig::new(native_size, fps);
    session_config.allowed_classes = config.detection.vehicle_classes.clone();
    session_config.annotate = config.video.save_annotated;
    session_config.progress_interval = config.video.progress_interval;

    let mut session = Session::new(
        SessionParts {
            detector: Box::new(detector),
            tracker: Box::new(tracker),
            geometry: geometry.clone(),
        },
        session_config,
    )
    .with_context(|| format!("Cannot start counting session for {}", path.display()))?;

    let mut writer = if config.video.save_annotated {
        Some(AnnotatedWriter::create(&outputs.annotated_video, native_size, fps)?)
    } else {
        None
    };
    let sink = writer.as_mut().map(|w| w as &mut dyn FrameSink);

    let run_result = if config.video.prefetch_frames > 0 {
        let mut source = PrefetchSource::spawn(reader, config.video.prefetch_frames)?;
        session.run(&mut source, sink)
    } else {
        let mut source = reader;
        session.run(&mut source, sink)
    };

    // partial results are still written when the frame loop fails
    let report = session.finish();
    std::fs::create_dir_all(&config.video.output_dir)
        .with_context(|| format!("Failed to create {}", config.video.output_dir))?;
    report.events.write_csv(&outputs.events_csv)?;
    report.events.write_json(&outputs.events_json)?;
    report.log_summary();
    if let Some(writer) = &writer {
        info!(
            "✓ Annotated video: {} ({} frames)",
            writer.path().display(),
            writer.frames_written()
        );
    }

    run_result.with_context(|| format!("Frame loop stopped early for {}", path.display()))?;
    Ok(report)
}
