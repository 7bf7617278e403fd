// src/lib.rs
//
// Per-lane vehicle counting over tracked detections.

pub mod analysis;
pub mod config;
pub mod coordinate_mapper;
pub mod error;
pub mod event_recorder;
pub mod lane_config;
pub mod lane_counter;
pub mod overlay;
pub mod pipeline;
pub mod types;
pub mod vehicle_detection;
#[cfg(feature = "video")]
pub mod video_processor;

pub use error::{CountingError, GeometryError, LaneConfigError, StateInvariantViolation};
pub use lane_config::{LaneGeometry, LaneGeometryStore};
pub use lane_counter::{LaneCounter, LaneCounts};
pub use types::{BBox, CrossingEvent, Detection, FrameSize, LaneId, LaneRegion, Point, TrackId, TrackedObject};
