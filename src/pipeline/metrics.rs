// src/pipeline/metrics.rs
//
// Session throughput counters. Atomics so a decode thread or a log reporter
// can read them while the counting loop runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_vehicles: Arc<AtomicU64>,
    pub detections: Arc<AtomicU64>,
    pub crossings: Arc<AtomicU64>,
    pub detect_time_us: Arc<AtomicU64>,
    pub track_time_us: Arc<AtomicU64>,
    pub render_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_vehicles: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            crossings: Arc::new(AtomicU64::new(0)),
            detect_time_us: Arc::new(AtomicU64::new(0)),
            track_time_us: Arc::new(AtomicU64::new(0)),
            render_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Accumulate a stage duration; averaged per frame in the summary.
    pub fn add_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames();
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    /// `Progress: 12.5% | FPS: 20.1 | Frame: 30/240`. Without a known total the
    /// percentage is omitted.
    pub fn progress_line(&self, total_frames: Option<u64>) -> String {
        let frames = self.frames();
        match total_frames.filter(|t| *t > 0) {
            Some(total) => format!(
                "Progress: {:.1}% | FPS: {:.1} | Frame: {}/{}",
                frames as f64 * 100.0 / total as f64,
                self.fps(),
                frames,
                total
            ),
            None => format!("Progress: FPS: {:.1} | Frame: {}", self.fps(), frames),
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let frames = self.frames();
        let avg = |counter: &AtomicU64| {
            if frames > 0 {
                counter.load(Ordering::Relaxed) / frames
            } else {
                0
            }
        };
        MetricsSummary {
            total_frames: frames,
            fps: self.fps(),
            frames_with_vehicles: self.frames_with_vehicles.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            crossings: self.crossings.load(Ordering::Relaxed),
            avg_detect_us: avg(&self.detect_time_us),
            avg_track_us: avg(&self.track_time_us),
            avg_render_us: avg(&self.render_time_us),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_vehicles: u64,
    pub detections: u64,
    pub crossings: u64,
    pub avg_detect_us: u64,
    pub avg_track_us: u64,
    pub avg_render_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_averages() {
        let metrics = PipelineMetrics::new();
        for _ in 0..4 {
            metrics.inc(&metrics.total_frames);
        }
        metrics.add(&metrics.detections, 10);
        metrics.add_timing(&metrics.detect_time_us, 400);

        let summary = metrics.summary();
        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.detections, 10);
        assert_eq!(summary.avg_detect_us, 100);
        assert_eq!(summary.avg_render_us, 0);
    }

    #[test]
    fn test_progress_line() {
        let metrics = PipelineMetrics::new();
        for _ in 0..30 {
            metrics.inc(&metrics.total_frames);
        }
        let line = metrics.progress_line(Some(240));
        assert!(line.starts_with("Progress: 12.5% | FPS: "));
        assert!(line.ends_with("| Frame: 30/240"));

        let line = metrics.progress_line(None);
        assert!(line.ends_with("Frame: 30"));
        assert!(!line.contains('%'));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let reader = metrics.clone();
        metrics.inc(&metrics.crossings);
        assert_eq!(reader.summary().crossings, 1);
    }
}
