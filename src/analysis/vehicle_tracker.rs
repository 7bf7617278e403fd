// src/analysis/vehicle_tracker.rs
//
// IoU-based multi-object tracker feeding the lane counter.
//
// Design:
//   - Greedy IoU matching (sufficient for the few dozen vehicles per frame)
//   - Tracks coast through brief detection gaps (occlusion, missed frames)
//   - Tentative tracks are confirmed after N consecutive hits
//   - Class is locked at confirmation; a cross-class match is penalized so a
//     car/truck flicker does not steal a neighbouring identity
//   - Ids increase monotonically and are never handed out twice

use crate::config::TrackerConfig;
use crate::pipeline::Tracker;
use crate::types::{BBox, Detection, TrackedObject};
use image::RgbImage;
use tracing::debug;

/// IoU multiplier when a detection's class differs from a confirmed track's.
const CROSS_CLASS_IOU_PENALTY: f32 = 0.5;

/// Frames without a hit before a confirmed track is marked lost.
const LOST_AFTER_FRAMES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub bbox: BBox,
    pub state: TrackState,
    pub class_name: String,
    pub consecutive_hits: u32,
    pub age: u32,
    pub frames_since_hit: u32,
    pub last_confidence: f32,
    confirmed_class: Option<String>,
}

impl Track {
    fn new(id: u64, det: &Detection) -> Self {
        Self {
            id,
            bbox: det.bbox,
            state: TrackState::Tentative,
            class_name: det.class_name.clone(),
            consecutive_hits: 1,
            age: 1,
            frames_since_hit: 0,
            last_confidence: det.confidence,
            confirmed_class: None,
        }
    }

    /// Confirmed or lost-then-recovered. Lost tracks keep their identity.
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, TrackState::Confirmed | TrackState::Lost)
    }

    fn update_with_detection(&mut self, det: &Detection, min_hits: u32) {
        self.bbox = det.bbox;
        self.last_confidence = det.confidence;
        self.consecutive_hits += 1;
        self.frames_since_hit = 0;
        self.age += 1;

        if self.confirmed_class.is_none() {
            self.class_name = det.class_name.clone();
        }

        match self.state {
            TrackState::Tentative if self.consecutive_hits >= min_hits => {
                self.state = TrackState::Confirmed;
                self.confirmed_class = Some(self.class_name.clone());
                debug!("Track {} confirmed as {}", self.id, self.class_name);
            }
            TrackState::Lost => {
                self.state = TrackState::Confirmed;
                self.consecutive_hits = 1;
            }
            _ => {}
        }
    }

    fn mark_missed(&mut self) {
        self.frames_since_hit += 1;
        self.consecutive_hits = 0;
        self.age += 1;
        if self.state == TrackState::Confirmed && self.frames_since_hit > LOST_AFTER_FRAMES {
            self.state = TrackState::Lost;
        }
    }

    fn to_object(&self) -> TrackedObject {
        TrackedObject::new(self.id, self.bbox, self.is_confirmed())
    }
}

pub struct VehicleTracker {
    pub config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl VehicleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
        }
    }

    /// Associate one frame of detections and return the tracks hit this frame,
    /// in track creation order.
    pub fn step(&mut self, detections: &[Detection]) -> Vec<TrackedObject> {
        let min_hits = self.config.min_hits_to_confirm.max(1);

        // ────────────────────────────────────────────────────────────────
        // IoU matching, best pairs first
        // ────────────────────────────────────────────────────────────────
        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; detections.len()];

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let raw = track.bbox.iou(&det.bbox);
                if raw < self.config.min_iou {
                    continue;
                }
                let score = match &track.confirmed_class {
                    Some(locked) if *locked != det.class_name => raw * CROSS_CLASS_IOU_PENALTY,
                    _ => raw,
                };
                if score >= self.config.min_iou {
                    pairs.push((ti, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        for (ti, di, _) in &pairs {
            if matched_tracks[*ti] || matched_dets[*di] {
                continue;
            }
            matched_tracks[*ti] = true;
            matched_dets[*di] = true;
            self.tracks[*ti].update_with_detection(&detections[*di], min_hits);
        }

        // ────────────────────────────────────────────────────────────────
        // Unmatched tracks coast, unmatched detections start new tracks
        // ────────────────────────────────────────────────────────────────
        for (ti, matched) in matched_tracks.iter().enumerate() {
            if !matched {
                self.tracks[ti].mark_missed();
            }
        }

        for (di, matched) in matched_dets.iter().enumerate() {
            if *matched {
                continue;
            }
            let det = &detections[di];
            let mut track = Track::new(self.next_id, det);
            if min_hits <= 1 {
                track.state = TrackState::Confirmed;
                track.confirmed_class = Some(track.class_name.clone());
            }
            debug!(
                "New track T{}: class={}, bbox=[{:.0},{:.0},{:.0},{:.0}]",
                track.id, track.class_name, det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2
            );
            self.next_id += 1;
            self.tracks.push(track);
        }

        // ────────────────────────────────────────────────────────────────
        // Prune
        // ────────────────────────────────────────────────────────────────
        let max_coast = self.config.max_coast_frames;
        self.tracks.retain(|t| {
            if t.frames_since_hit > max_coast {
                debug!("Track {} pruned (coasted {} frames)", t.id, t.frames_since_hit);
                return false;
            }
            if t.state == TrackState::Tentative && t.age > min_hits * 3 {
                debug!("Track {} pruned (tentative too long: age={})", t.id, t.age);
                return false;
            }
            true
        });

        self.tracks
            .iter()
            .filter(|t| t.frames_since_hit == 0)
            .map(Track::to_object)
            .collect()
    }

    pub fn all_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get_track(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn confirmed_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_confirmed()).count()
    }
}

impl Tracker for VehicleTracker {
    fn update(&mut self, detections: &[Detection], _frame: &RgbImage) -> Vec<TrackedObject> {
        self.step(detections)
    }
}
