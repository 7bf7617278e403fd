// src/lane_counter.rs
//
// ════════════════════════════════════════════════════════════════════════════
// LANE ASSIGNMENT & COUNTING
// ════════════════════════════════════════════════════════════════════════════
//
// Every confirmed track is credited to at most one lane, once, on the first
// frame its centroid falls inside a lane region:
//
//   observation ──► confirmed? ──► centroid ──► first matching lane
//                                                   │
//                         already counted? ◄────────┘
//                               │ no
//                               ▼
//             counts[lane] += 1, remember id, emit CrossingEvent
//
// Lanes are tested in configuration order and the first match wins, so with
// overlapping regions the lowest lane number takes the vehicle. Once counted a
// track is inert for the rest of the session: no exit detection, no
// re-entry counting, no counting in a second lane.
//
// Track ids are assumed unique for the session. A tracker that recycles ids
// will have the recycled vehicle suppressed.

use crate::error::{CountingError, GeometryError, StateInvariantViolation};
use crate::types::{CrossingEvent, LaneId, LaneRegion, Point, TrackId, TrackedObject};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Owned snapshot of per-lane counts, keyed by lane number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LaneCounts(BTreeMap<LaneId, u64>);

impl LaneCounts {
    pub fn get(&self, lane: LaneId) -> Option<u64> {
        self.0.get(&lane).copied()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LaneId, u64)> + '_ {
        self.0.iter().map(|(lane, count)| (*lane, *count))
    }
}

impl FromIterator<(LaneId, u64)> for LaneCounts {
    fn from_iter<I: IntoIterator<Item = (LaneId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct LaneCounter {
    lanes: Vec<LaneRegion>,
    counts: Vec<u64>,
    counted: HashSet<TrackId>,
    fps: f64,
    last_frame_index: Option<u64>,
}

impl LaneCounter {
    /// One counter per configured lane. Lane ids must be `1..=N` in order.
    pub fn new(lanes: Vec<LaneRegion>, fps: f64) -> Result<Self, CountingError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(GeometryError::InvalidFrameRate(fps).into());
        }

        for (position, lane) in lanes.iter().enumerate() {
            let expected = LaneId(position + 1);
            if lane.id != expected {
                return Err(StateInvariantViolation::LaneIdMismatch {
                    position,
                    expected,
                    found: lane.id,
                }
                .into());
            }
        }

        if lanes.is_empty() {
            warn!("No lanes configured; nothing will be counted");
        }

        let counts = vec![0; lanes.len()];
        Ok(Self {
            lanes,
            counts,
            counted: HashSet::new(),
            fps,
            last_frame_index: None,
        })
    }

    /// Feed one tracked object seen on `frame_index`.
    ///
    /// Returns the crossing event when this observation is the one that
    /// counts the track.
    pub fn observe(&mut self, object: &TrackedObject, frame_index: u64) -> Option<CrossingEvent> {
        if let Some(last) = self.last_frame_index {
            if frame_index < last {
                warn!(
                    "Frame index went backwards ({} after {}); observations are expected in frame order",
                    frame_index, last
                );
            }
        }
        self.last_frame_index = Some(frame_index);

        if !object.confirmed {
            return None;
        }

        let centroid = object.centroid();
        let lane = self.lane_for(centroid)?;

        if self.counted.contains(&object.id) {
            return None;
        }

        // lane ids were checked against the counter table at construction
        let slot = lane.index()?;
        self.counts[slot] += 1;
        self.counted.insert(object.id);

        let event = CrossingEvent {
            track_id: object.id,
            lane,
            frame_index,
            timestamp_secs: frame_index as f64 / self.fps,
        };

        debug!(
            "Track {} counted in lane {} at frame {} ({}), centroid=({}, {})",
            object.id,
            lane,
            frame_index,
            event.timestamp_label(),
            centroid.x,
            centroid.y
        );

        Some(event)
    }

    /// First lane, in configuration order, containing `point`.
    pub fn lane_for(&self, point: Point) -> Option<LaneId> {
        self.lanes
            .iter()
            .find(|lane| lane.contains(point))
            .map(|lane| lane.id)
    }

    pub fn lanes(&self) -> &[LaneRegion] {
        &self.lanes
    }

    /// Counts indexed by `lane - 1`.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, lane: LaneId) -> Result<u64, StateInvariantViolation> {
        lane.index()
            .and_then(|i| self.counts.get(i).copied())
            .ok_or(StateInvariantViolation::LaneOutOfRange {
                lane,
                configured: self.counts.len(),
            })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn snapshot(&self) -> LaneCounts {
        self.lanes
            .iter()
            .zip(self.counts.iter())
            .map(|(lane, count)| (lane.id, *count))
            .collect()
    }

    pub fn is_counted(&self, id: TrackId) -> bool {
        self.counted.contains(&id)
    }

    pub fn counted_identities(&self) -> &HashSet<TrackId> {
        &self.counted
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane_config::LaneGeometry;
    use crate::types::BBox;

    fn default_counter() -> LaneCounter {
        LaneCounter::new(LaneGeometry::default().lanes, 30.0).unwrap()
    }

    /// Box whose integer centroid is exactly (cx, cy).
    fn object_at(id: u64, cx: i32, cy: i32, confirmed: bool) -> TrackedObject {
        let (cx, cy) = (cx as f32, cy as f32);
        TrackedObject::new(id, BBox::new(cx - 20.0, cy - 10.0, cx + 20.0, cy + 10.0), confirmed)
    }

    #[test]
    fn test_counts_initialized_per_lane() {
        let counter = default_counter();
        assert_eq!(counter.counts(), &[0, 0, 0]);
        assert_eq!(counter.total(), 0);
        assert_eq!(counter.snapshot().len(), 3);
    }

    #[test]
    fn test_end_to_end_three_frames() {
        let mut counter = default_counter();
        let a = 1;
        let b = 2;

        // frame 1: A confirmed inside lane 1
        let event = counter.observe(&object_at(a, 300, 500, true), 1).unwrap();
        assert_eq!(event.track_id, TrackId(a));
        assert_eq!(event.lane, LaneId(1));
        assert_eq!(event.frame_index, 1);
        assert!((event.timestamp_secs - 1.0 / 30.0).abs() < 1e-9);

        // frame 2: A inside lane 2, already counted
        assert!(counter.observe(&object_at(a, 700, 500, true), 2).is_none());

        // frame 3: B unconfirmed inside lane 3
        assert!(counter.observe(&object_at(b, 1100, 500, false), 3).is_none());

        assert_eq!(counter.counts(), &[1, 0, 0]);
        assert_eq!(counter.count(LaneId(1)).unwrap(), 1);
        assert_eq!(counter.count(LaneId(2)).unwrap(), 0);
        assert_eq!(counter.count(LaneId(3)).unwrap(), 0);
        assert!(counter.is_counted(TrackId(a)));
        assert!(!counter.is_counted(TrackId(b)));
    }

    #[test]
    fn test_at_most_once_per_identity() {
        let mut counter = default_counter();
        let mut events = 0;
        for frame in 1..=50u64 {
            // the same identity wanders across all three lanes
            let cx = [300, 700, 1100][(frame % 3) as usize];
            if counter.observe(&object_at(9, cx, 500, true), frame).is_some() {
                events += 1;
            }
        }
        assert_eq!(events, 1);
        assert_eq!(counter.total(), 1);
        assert_eq!(counter.counted_identities().len(), 1);
    }

    #[test]
    fn test_unconfirmed_then_confirmed() {
        let mut counter = default_counter();
        assert!(counter.observe(&object_at(4, 300, 500, false), 1).is_none());
        assert!(!counter.is_counted(TrackId(4)));

        let event = counter.observe(&object_at(4, 700, 500, true), 2).unwrap();
        assert_eq!(event.lane, LaneId(2));
        assert_eq!(counter.counts(), &[0, 1, 0]);
    }

    #[test]
    fn test_outside_all_lanes_is_not_counted() {
        let mut counter = default_counter();
        assert!(counter.observe(&object_at(1, 525, 500, true), 1).is_none());
        assert!(counter.observe(&object_at(1, 300, 100, true), 2).is_none());
        assert!(!counter.is_counted(TrackId(1)));

        // later entry still counts
        assert!(counter.observe(&object_at(1, 300, 500, true), 3).is_some());
    }

    #[test]
    fn test_regressing_frame_index_still_counts() {
        let mut counter = default_counter();
        assert!(counter.observe(&object_at(1, 525, 500, true), 10).is_none());

        let event = counter.observe(&object_at(1, 300, 500, true), 5).unwrap();
        assert_eq!(event.lane, LaneId(1));
        assert_eq!(event.frame_index, 5);
        assert_eq!(counter.count(LaneId(1)).unwrap(), 1);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn test_huge_box_is_outside_all_lanes() {
        let mut counter = default_counter();
        let object = TrackedObject::new(1, BBox::new(3.0e9, 3.0e9, 3.1e9, 3.1e9), true);
        assert!(counter.observe(&object, 1).is_none());
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let lanes = vec![
            LaneRegion::new(1, Point::new(100, 720), Point::new(500, 400)),
            LaneRegion::new(2, Point::new(300, 720), Point::new(900, 400)),
        ];
        let mut counter = LaneCounter::new(lanes, 25.0).unwrap();

        let event = counter.observe(&object_at(1, 400, 500, true), 1).unwrap();
        assert_eq!(event.lane, LaneId(1));
        assert_eq!(counter.lane_for(Point::new(700, 500)), Some(LaneId(2)));
    }

    #[test]
    fn test_timestamp_is_frame_over_fps() {
        let mut counter = LaneCounter::new(LaneGeometry::default().lanes, 25.0).unwrap();
        assert_eq!(counter.fps(), 25.0);
        let event = counter.observe(&object_at(3, 300, 500, true), 250).unwrap();
        assert!((event.timestamp_secs - 10.0).abs() < 1e-9);
        assert_eq!(event.timestamp_label(), "00:00:10");
    }

    #[test]
    fn test_invalid_fps_is_rejected() {
        for fps in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            let err = LaneCounter::new(LaneGeometry::default().lanes, fps).err().unwrap();
            assert!(matches!(
                err,
                CountingError::Geometry(GeometryError::InvalidFrameRate(_))
            ));
        }
    }

    #[test]
    fn test_lane_ids_must_match_positions() {
        let lanes = vec![
            LaneRegion::new(1, Point::new(0, 100), Point::new(50, 0)),
            LaneRegion::new(3, Point::new(60, 100), Point::new(90, 0)),
        ];
        let err = LaneCounter::new(lanes, 30.0).err().unwrap();
        assert_eq!(
            err,
            CountingError::StateInvariant(StateInvariantViolation::LaneIdMismatch {
                position: 1,
                expected: LaneId(2),
                found: LaneId(3),
            })
        );
    }

    #[test]
    fn test_count_out_of_range() {
        let counter = default_counter();
        assert!(matches!(
            counter.count(LaneId(4)),
            Err(StateInvariantViolation::LaneOutOfRange { configured: 3, .. })
        ));
        assert!(counter.count(LaneId(0)).is_err());
    }

    #[test]
    fn test_no_lanes_counts_nothing() {
        let mut counter = LaneCounter::new(Vec::new(), 30.0).unwrap();
        assert!(counter.observe(&object_at(1, 300, 500, true), 1).is_none());
        assert_eq!(counter.total(), 0);
        assert!(counter.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_matches_counts() {
        let mut counter = default_counter();
        counter.observe(&object_at(1, 300, 500, true), 1);
        counter.observe(&object_at(2, 1100, 500, true), 1);
        counter.observe(&object_at(3, 1100, 600, true), 2);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get(LaneId(1)), Some(1));
        assert_eq!(snapshot.get(LaneId(2)), Some(0));
        assert_eq!(snapshot.get(LaneId(3)), Some(2));
        assert_eq!(snapshot.total(), 3);
    }
}
