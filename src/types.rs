// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from(p: [i32; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(960, 540)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned box in corner form `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_array(b: [f32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Corners truncated to whole pixels.
    pub fn to_pixels(&self) -> [i32; 4] {
        [
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        ]
    }

    /// Integer midpoint of the pixel-truncated box, floored.
    pub fn centroid(&self) -> Point {
        let [x1, y1, x2, y2] = self.to_pixels();
        Point::new(midpoint(x1, x2), midpoint(y1, y2))
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Identity assigned by the tracker. Stable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based lane number, equal to the lane's position in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub usize);

impl LaneId {
    /// Zero-based slot in per-lane tables.
    pub fn index(&self) -> Option<usize> {
        self.0.checked_sub(1)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rectangular lane region given by two corners.
///
/// `p1` is the near corner (bottom-left, larger y) and `p2` the far corner
/// (top-right, smaller y). Regions given the other way round are kept as-is
/// and never match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneRegion {
    pub id: LaneId,
    pub p1: Point,
    pub p2: Point,
}

impl LaneRegion {
    pub fn new(id: usize, p1: Point, p2: Point) -> Self {
        Self {
            id: LaneId(id),
            p1,
            p2,
        }
    }

    /// `x1 <= cx <= x2 && y1 >= cy >= y2`
    pub fn contains(&self, p: Point) -> bool {
        self.p1.x <= p.x && p.x <= self.p2.x && self.p1.y >= p.y && p.y >= self.p2.y
    }

    pub fn is_well_formed(&self) -> bool {
        self.p1.x <= self.p2.x && self.p1.y >= self.p2.y
    }
}

/// Per-frame tracker output in native-frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub id: TrackId,
    pub bbox: BBox,
    pub confirmed: bool,
}

impl TrackedObject {
    pub fn new(id: u64, bbox: BBox, confirmed: bool) -> Self {
        Self {
            id: TrackId(id),
            bbox,
            confirmed,
        }
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }
}

/// Detector output. Boxes are in the coordinates of the image handed to the
/// detector (the reference-size frame).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_name: String,
}

/// The first counted entry of a track into a lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub lane: LaneId,
    pub frame_index: u64,
    pub timestamp_secs: f64,
}

impl CrossingEvent {
    /// Video offset as `HH:MM:SS`, whole seconds.
    pub fn timestamp_label(&self) -> String {
        format_clock(self.timestamp_secs)
    }
}

pub(crate) fn format_clock(secs: f64) -> String {
    let whole = if secs.is_finite() && secs > 0.0 {
        (secs.floor() as u64 % 86_400) as u32
    } else {
        0
    };
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(whole, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "00:00:00".to_string())
}

/// Floored midpoint; always within `i32` range.
fn midpoint(a: i32, b: i32) -> i32 {
    (a as i64 + b as i64).div_euclid(2) as i32
}
