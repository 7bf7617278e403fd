// src/analysis/mod.rs
//
// Object association between detection and counting:
//   Detections (native pixels) → vehicle_tracker → TrackedObject → LaneCounter

pub mod vehicle_tracker;

pub use vehicle_tracker::{Track, TrackState, VehicleTracker};
