// src/pipeline/session.rs
//
// ════════════════════════════════════════════════════════════════════════════
// COUNTING SESSION
// ════════════════════════════════════════════════════════════════════════════
//
// One session per video. Per frame, strictly in decode order:
//
//   frame ─► resize to reference ─► detect ─► class filter ─► map to native
//         ─► track ─► observe (confirmed, tracker order) ─► record ─► render
//
// The counter and recorder are owned here and mutated only from
// `process_frame`, so "first crossing wins" holds without locks. Decoding
// may happen on another thread (see `prefetch`), counting never does.

use crate::coordinate_mapper::CoordinateMapper;
use crate::error::CountingError;
use crate::event_recorder::{EventLog, EventRecorder};
use crate::lane_config::LaneGeometry;
use crate::lane_counter::{LaneCounter, LaneCounts};
use crate::overlay::{OverlayRenderer, OverlayStyle};
use crate::pipeline::metrics::{MetricsSummary, PipelineMetrics};
use crate::types::{CrossingEvent, Detection, FrameSize, TrackedObject};
use crate::vehicle_detection::Detector;
use anyhow::Result;
use image::{imageops, RgbImage};
use std::time::Instant;
use tracing::{debug, info};

/// Associates detections across frames.
pub trait Tracker: Send {
    /// `detections` are in native-frame pixels. Returns this frame's tracks in
    /// the tracker's own order.
    fn update(&mut self, detections: &[Detection], frame: &RgbImage) -> Vec<TrackedObject>;
}

pub trait FrameSource {
    /// Next decoded frame, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
    fn frame_rate(&self) -> f64;
    fn frame_size(&self) -> FrameSize;
    fn total_frames(&self) -> Option<u64>;
}

pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
}

pub struct SessionParts {
    pub detector: Box<dyn Detector>,
    pub tracker: Box<dyn Tracker>,
    pub geometry: LaneGeometry,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub native_size: FrameSize,
    pub fps: f64,
    pub allowed_classes: Vec<String>,
    pub annotate: bool,
    pub progress_interval: u64,
    pub overlay: OverlayStyle,
}

impl SessionConfig {
    pub fn new(native_size: FrameSize, fps: f64) -> Self {
        Self {
            native_size,
            fps,
            allowed_classes: ["car", "truck", "bus", "motorcycle", "motorbike"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            annotate: true,
            progress_interval: 30,
            overlay: OverlayStyle::default(),
        }
    }
}

/// What one frame produced.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub frame_index: u64,
    pub detections: usize,
    pub objects: Vec<TrackedObject>,
    pub events: Vec<CrossingEvent>,
    pub annotated: Option<RgbImage>,
}

pub struct Session {
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    geometry: LaneGeometry,
    mapper: CoordinateMapper,
    counter: LaneCounter,
    recorder: EventRecorder,
    renderer: OverlayRenderer,
    config: SessionConfig,
    metrics: PipelineMetrics,
    frame_index: u64,
}

impl Session {
    /// Geometry and counter are validated here, before any frame is read.
    pub fn new(parts: SessionParts, config: SessionConfig) -> Result<Self, CountingError> {
        let SessionParts {
            detector,
            tracker,
            geometry,
        } = parts;

        let mapper = CoordinateMapper::new(geometry.reference_size, config.native_size)?;
        let counter = LaneCounter::new(geometry.lanes.clone(), config.fps)?;

        info!(
            "✓ Session ready: detector={}, {} lanes, reference {} → native {} @ {:.2} fps",
            detector.name(),
            geometry.lane_count(),
            geometry.reference_size,
            config.native_size,
            counter.fps()
        );
        for line in geometry.describe() {
            info!("  {}", line);
        }

        Ok(Self {
            detector,
            tracker,
            geometry,
            mapper,
            counter,
            recorder: EventRecorder::new(),
            renderer: OverlayRenderer::new(config.overlay.clone()),
            config,
            metrics: PipelineMetrics::new(),
            frame_index: 0,
        })
    }

    /// Run one native-resolution frame through the whole chain.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameOutcome> {
        let native = self.config.native_size;
        if frame.dimensions() != (native.width, native.height) {
            anyhow::bail!(
                "Frame is {}x{}, session expects {}",
                frame.width(),
                frame.height(),
                native
            );
        }

        self.frame_index += 1;
        let frame_index = self.frame_index;

        // ── detect at reference resolution ──
        let reference = self.mapper.reference();
        let resized = (reference != native).then(|| {
            imageops::resize(
                frame,
                reference.width,
                reference.height,
                imageops::FilterType::Triangle,
            )
        });
        let detector_input = resized.as_ref().unwrap_or(frame);

        let t0 = Instant::now();
        let raw = self.detector.detect(detector_input)?;
        self.metrics
            .add_timing(&self.metrics.detect_time_us, t0.elapsed().as_micros() as u64);

        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| self.is_allowed(&d.class_name))
            .map(|d| Detection {
                bbox: self.mapper.map_box(&d.bbox),
                ..d
            })
            .collect();

        // ── track in native space ──
        let t1 = Instant::now();
        let objects = self.tracker.update(&detections, frame);
        self.metrics
            .add_timing(&self.metrics.track_time_us, t1.elapsed().as_micros() as u64);

        // ── count ──
        let mut events = Vec::new();
        for object in objects.iter().filter(|o| o.confirmed) {
            if let Some(event) = self.counter.observe(object, frame_index) {
                self.recorder.record(event.clone());
                events.push(event);
            }
        }

        // ── render ──
        let annotated = if self.config.annotate {
            let t2 = Instant::now();
            let out = self.renderer.render(
                frame,
                &self.geometry.lanes,
                &self.counter.snapshot(),
                &objects,
            );
            self.metrics
                .add_timing(&self.metrics.render_time_us, t2.elapsed().as_micros() as u64);
            Some(out)
        } else {
            None
        };

        self.metrics.inc(&self.metrics.total_frames);
        self.metrics.add(&self.metrics.detections, detections.len() as u64);
        self.metrics.add(&self.metrics.crossings, events.len() as u64);
        if !objects.is_empty() {
            self.metrics.inc(&self.metrics.frames_with_vehicles);
        }

        debug!(
            "Frame {}: {} detections, {} tracks, {} new crossings",
            frame_index,
            detections.len(),
            objects.len(),
            events.len()
        );

        Ok(FrameOutcome {
            frame_index,
            detections: detections.len(),
            objects,
            events,
            annotated,
        })
    }

    /// Drain `source`, writing annotated frames to `sink` when given. On error
    /// the counts and events gathered so far stay available through `finish`.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        mut sink: Option<&mut dyn FrameSink>,
    ) -> Result<()> {
        let total = source.total_frames();
        let interval = self.config.progress_interval;

        while let Some(frame) = source.next_frame()? {
            let outcome = self.process_frame(&frame)?;

            if let (Some(sink), Some(annotated)) = (sink.as_deref_mut(), &outcome.annotated) {
                sink.write_frame(annotated)?;
            }

            if interval > 0 && outcome.frame_index % interval == 0 {
                info!("{}", self.metrics.progress_line(total));
            }
        }

        Ok(())
    }

    fn is_allowed(&self, class_name: &str) -> bool {
        self.config
            .allowed_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class_name))
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn counter(&self) -> &LaneCounter {
        &self.counter
    }

    /// Close the session. The event log is flushed exactly once, here.
    pub fn finish(self) -> SessionReport {
        SessionReport {
            counts: self.counter.snapshot(),
            events: self.recorder.flush(),
            metrics: self.metrics.summary(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub counts: LaneCounts,
    pub events: EventLog,
    pub metrics: MetricsSummary,
}

impl SessionReport {
    pub fn total(&self) -> u64 {
        self.counts.total()
    }

    pub fn log_summary(&self) {
        info!("═══════════════════════════════════════");
        info!("Traffic Flow Analysis Summary");
        info!("═══════════════════════════════════════");
        for (lane, count) in self.counts.iter() {
            info!("Lane {}: {} vehicles", lane, count);
        }
        info!("Total vehicles counted: {}", self.total());
        info!(
            "Frames: {} | Avg FPS: {:.1} | Elapsed: {:.1}s",
            self.metrics.total_frames, self.metrics.fps, self.metrics.elapsed_secs
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory frames; pixel (0, 0) red channel carries the frame number.
    pub struct VecSource {
        frames: VecDeque<RgbImage>,
        size: FrameSize,
        total: u64,
        fail_after: Option<u64>,
        served: u64,
    }

    impl VecSource {
        pub fn numbered(count: u8, width: u32, height: u32) -> Self {
            let frames = (0..count)
                .map(|i| RgbImage::from_pixel(width, height, image::Rgb([i, 0, 0])))
                .collect();
            Self {
                frames,
                size: FrameSize::new(width, height),
                total: count as u64,
                fail_after: None,
                served: 0,
            }
        }

        pub fn failing_after(mut self, frames: u64) -> Self {
            self.fail_after = Some(frames);
            self
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.fail_after == Some(self.served) {
                return Err(anyhow!("decode failed at frame {}", self.served + 1));
            }
            self.served += 1;
            Ok(self.frames.pop_front())
        }

        fn frame_rate(&self) -> f64 {
            30.0
        }

        fn frame_size(&self) -> FrameSize {
            self.size
        }

        fn total_frames(&self) -> Option<u64> {
            Some(self.total)
        }
    }

    /// Replays one detection list per call; records nothing.
    pub struct ScriptedDetector {
        pub frames: VecDeque<Vec<Detection>>,
        pub seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl ScriptedDetector {
        pub fn new(frames: Vec<Vec<Detection>>) -> Self {
            Self {
                frames: frames.into(),
                seen_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
            self.seen_sizes.lock().unwrap().push(image.dimensions());
            Ok(self.frames.pop_front().unwrap_or_default())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Replays one track list per call and keeps the detections it was given.
    pub struct ScriptedTracker {
        pub frames: VecDeque<Vec<TrackedObject>>,
        pub received: Arc<Mutex<Vec<Vec<Detection>>>>,
    }

    impl ScriptedTracker {
        pub fn new(frames: Vec<Vec<TrackedObject>>) -> Self {
            Self {
                frames: frames.into(),
                received: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Tracker for ScriptedTracker {
        fn update(&mut self, detections: &[Detection], _frame: &RgbImage) -> Vec<TrackedObject> {
            self.received.lock().unwrap().push(detections.to_vec());
            self.frames.pop_front().unwrap_or_default()
        }
    }

    #[derive(Default)]
    pub struct CollectSink {
        pub frames: Vec<RgbImage>,
    }

    impl FrameSink for CollectSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }
}
