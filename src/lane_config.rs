// src/lane_config.rs
//
// Lane geometry store. Lanes and the reference frame size are read once per
// session from a JSON file:
//
//   {
//     "lanes": [[[100, 720], [500, 400]], ...],
//     "target_frame_size": [960, 540],
//     "description": "Lane coordinates for traffic flow analysis"
//   }
//
// A missing or malformed file never stops a session: the built-in default is
// substituted and a warning is logged.

use crate::error::LaneConfigError;
use crate::types::{FrameSize, LaneRegion, Point};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_DESCRIPTION: &str = "Lane coordinates for traffic flow analysis";

/// Built-in lanes: three side-by-side regions across a 1280x720 frame.
pub const DEFAULT_LANES: [[[i32; 2]; 2]; 3] = [
    [[100, 720], [500, 400]],
    [[550, 720], [900, 400]],
    [[950, 720], [1300, 400]],
];

pub const DEFAULT_REFERENCE_SIZE: FrameSize = FrameSize::new(960, 540);

/// On-disk record. `lanes` is required, the rest falls back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LaneConfigFile {
    lanes: Vec<[[i32; 2]; 2]>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    target_frame_size: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOrigin {
    File,
    Default,
}

/// Lanes plus the coordinate frame detection runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneGeometry {
    pub lanes: Vec<LaneRegion>,
    pub reference_size: FrameSize,
    pub description: String,
    pub origin: GeometryOrigin,
}

impl Default for LaneGeometry {
    fn default() -> Self {
        Self {
            lanes: DEFAULT_LANES
                .iter()
                .enumerate()
                .map(|(i, [p1, p2])| LaneRegion::new(i + 1, Point::from(*p1), Point::from(*p2)))
                .collect(),
            reference_size: DEFAULT_REFERENCE_SIZE,
            description: DEFAULT_DESCRIPTION.to_string(),
            origin: GeometryOrigin::Default,
        }
    }
}

impl LaneGeometry {
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// `Lane i: Start(x1, y1) -> End(x2, y2)` per lane.
    pub fn describe(&self) -> Vec<String> {
        self.lanes
            .iter()
            .map(|lane| {
                format!(
                    "Lane {}: Start({}, {}) -> End({}, {})",
                    lane.id, lane.p1.x, lane.p1.y, lane.p2.x, lane.p2.y
                )
            })
            .collect()
    }

    /// Lanes whose corners are not near-bottom-left / far-top-right.
    pub fn ill_formed_lanes(&self) -> Vec<&LaneRegion> {
        self.lanes.iter().filter(|l| !l.is_well_formed()).collect()
    }

    fn from_file(file: LaneConfigFile) -> Self {
        let reference_size = file
            .target_frame_size
            .map(|[w, h]| FrameSize::new(w, h))
            .unwrap_or(DEFAULT_REFERENCE_SIZE);

        Self {
            lanes: file
                .lanes
                .iter()
                .enumerate()
                .map(|(i, [p1, p2])| LaneRegion::new(i + 1, Point::from(*p1), Point::from(*p2)))
                .collect(),
            reference_size,
            description: file
                .description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            origin: GeometryOrigin::File,
        }
    }

    fn to_file(&self) -> LaneConfigFile {
        LaneConfigFile {
            lanes: self
                .lanes
                .iter()
                .map(|l| [l.p1.into(), l.p2.into()])
                .collect(),
            description: Some(self.description.clone()),
            target_frame_size: Some([self.reference_size.width, self.reference_size.height]),
        }
    }
}

/// File-backed lane configuration.
#[derive(Debug, Clone)]
pub struct LaneGeometryStore {
    path: PathBuf,
}

impl LaneGeometryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, substituting the default on any problem.
    ///
    /// When no file exists the default is also written out so there is
    /// something to edit next time.
    pub fn load(&self) -> LaneGeometry {
        let geometry = match self.try_load() {
            Ok(geometry) => {
                info!(
                    "✓ Lane configuration loaded from {} ({} lanes, reference {})",
                    self.path.display(),
                    geometry.lane_count(),
                    geometry.reference_size
                );
                geometry
            }
            Err(LaneConfigError::Missing(_)) => {
                info!(
                    "No lane configuration at {}. Using default configuration.",
                    self.path.display()
                );
                let geometry = LaneGeometry::default();
                if let Err(e) = self.save(&geometry) {
                    warn!("Could not write default lane configuration: {}", e);
                }
                geometry
            }
            Err(e) => {
                warn!("{}", e);
                warn!("Using default lane configuration");
                LaneGeometry::default()
            }
        };

        for lane in geometry.ill_formed_lanes() {
            warn!(
                "Lane {} has p1={:?} p2={:?}; expected x to increase and y to decrease from p1 to p2. It will never match.",
                lane.id, lane.p1, lane.p2
            );
        }

        geometry
    }

    /// Strict load: every problem is reported to the caller.
    pub fn try_load(&self) -> Result<LaneGeometry, LaneConfigError> {
        if !self.path.exists() {
            return Err(LaneConfigError::Missing(self.path.clone()));
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| LaneConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let file: LaneConfigFile =
            serde_json::from_str(&contents).map_err(|source| LaneConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;

        Ok(LaneGeometry::from_file(file))
    }

    /// Write the configuration. Saving the same geometry twice yields the same file.
    pub fn save(&self, geometry: &LaneGeometry) -> Result<(), LaneConfigError> {
        let json = serde_json::to_string_pretty(&geometry.to_file())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LaneConfigError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        fs::write(&self.path, json).map_err(|source| LaneConfigError::Write {
            path: self.path.clone(),
            source,
        })?;

        info!("Lane configuration saved to {}", self.path.display());
        Ok(())
    }
}
