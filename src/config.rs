// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub tracker: TrackerConfig,
    pub lanes: LanesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// A video file, or a directory of videos processed one by one.
    pub input: String,
    pub output_dir: String,
    pub save_annotated: bool,
    pub progress_interval: u64,
    pub prefetch_frames: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input: "input/video.mp4".to_string(),
            output_dir: "output".to_string(),
            save_annotated: true,
            progress_interval: 30,
            prefetch_frames: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub vehicle_classes: Vec<String>,
    pub use_cuda: bool,
    pub num_threads: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.4,
            vehicle_classes: ["car", "truck", "bus", "motorcycle", "motorbike"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_cuda: false,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub min_iou: f32,
    pub max_coast_frames: u32,
    pub min_hits_to_confirm: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            max_coast_frames: 30,
            min_hits_to_confirm: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    pub config_path: String,
    pub save_on_exit: bool,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            config_path: "lane_config.json".to_string(),
            save_on_exit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "traffic_flow=info,ort=warn".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    /// Nothing is logged here; callers report the origin once logging is up.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, ConfigOrigin)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), ConfigOrigin::Default));
        }
        Ok((Self::load(path)?, ConfigOrigin::File))
    }
}

/// Where the active [`AppConfig`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    Default,
}

/// Per-video output files, named after the input stem.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub events_csv: PathBuf,
    pub events_json: PathBuf,
    pub annotated_video: PathBuf,
}

impl OutputPaths {
    pub fn for_input(output_dir: impl AsRef<Path>, input: &Path) -> Self {
        let dir = output_dir.as_ref();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self {
            events_csv: dir.join(format!("{}_events.csv", stem)),
            events_json: dir.join(format!("{}_events.json", stem)),
            annotated_video: dir.join(format!("{}_annotated.mp4", stem)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "video:\n  input: clips/\n  save_annotated: false\ntracker:\n  min_hits_to_confirm: 1\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.video.input, "clips/");
        assert!(!config.video.save_annotated);
        assert_eq!(config.video.progress_interval, 30);
        assert_eq!(config.tracker.min_hits_to_confirm, 1);
        assert_eq!(config.tracker.max_coast_frames, 30);
        assert!((config.detection.confidence_threshold - 0.4).abs() < 1e-6);
        assert_eq!(config.lanes.config_path, "lane_config.json");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let (config, origin) = AppConfig::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(origin, ConfigOrigin::Default);
        assert_eq!(config.logging.filter, "traffic_flow=info,ort=warn");
        assert!(config
            .detection
            .vehicle_classes
            .contains(&"motorbike".to_string()));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "video: [unclosed").unwrap();
        assert!(AppConfig::load_or_default(&path).is_err());
    }

    #[test]
    fn test_present_file_reports_file_origin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "video:\n  prefetch_frames: 0\n").unwrap();

        let (config, origin) = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(origin, ConfigOrigin::File);
        assert_eq!(config.video.prefetch_frames, 0);
        assert_eq!(config.video.output_dir, "output");
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::for_input("out", Path::new("clips/highway.mp4"));
        assert_eq!(paths.events_csv, Path::new("out/highway_events.csv"));
        assert_eq!(paths.events_json, Path::new("out/highway_events.json"));
        assert_eq!(paths.annotated_video, Path::new("out/highway_annotated.mp4"));
    }
}
