// src/overlay/mod.rs
//
// Annotated-frame rendering.
//
//   ┌──────────────────────────────────────────────┐
//   │ Total - L1: 4 | L2: 7 | L3: 2                │
//   │                                              │
//   │        ID:12                                 │
//   │        ┌────┐                                │
//   │  ┌─────│────┼──┐  ┌────────────┐  ┌──────────│
//   │  │     └────┘  │  │  (20% tint)│  │          │
//   │  │             │  │            │  │          │
//   │  └─────────────┘  └────────────┘  └──────────│
//   │  L1: 4            L2: 7           L3: 2      │
//   └──────────────────────────────────────────────┘
//
// Rendering reads counts and tracks and produces a new frame. It never
// touches counting state, so it can be skipped, repeated or replayed.

pub mod glyphs;

use crate::lane_counter::LaneCounts;
use crate::types::{LaneRegion, Point, TrackedObject};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Overlay colors (RGB).
pub mod colors {
    use image::Rgb;

    pub const LANE: Rgb<u8> = Rgb([255, 255, 0]);
    pub const LANE_LABEL: Rgb<u8> = Rgb([255, 255, 255]);
    pub const TOTALS: Rgb<u8> = Rgb([255, 255, 0]);
    pub const OBJECT_BOX: Rgb<u8> = Rgb([0, 0, 255]);
    pub const OBJECT_ID: Rgb<u8> = Rgb([0, 255, 0]);
}

/// Blend factors for translucent layers.
pub mod alpha {
    pub const LANE_FILL: f32 = 0.2;
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub lane_color: Rgb<u8>,
    pub lane_fill_alpha: f32,
    pub lane_outline_px: u32,
    pub lane_label_scale: u32,
    pub totals_scale: u32,
    pub totals_origin: Point,
    pub box_thickness_px: u32,
    pub id_label_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            lane_color: colors::LANE,
            lane_fill_alpha: alpha::LANE_FILL,
            lane_outline_px: 2,
            lane_label_scale: 2,
            totals_scale: 3,
            totals_origin: Point::new(10, 30),
            box_thickness_px: 2,
            id_label_scale: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn render(
        &self,
        frame: &RgbImage,
        lanes: &[LaneRegion],
        counts: &LaneCounts,
        objects: &[TrackedObject],
    ) -> RgbImage {
        let style = &self.style;
        let mut out = frame.clone();

        for object in objects.iter().filter(|o| o.confirmed) {
            let [x1, y1, x2, y2] = object.bbox.to_pixels();
            draw_thick_rect(
                &mut out,
                x1,
                y1,
                x2,
                y2,
                colors::OBJECT_BOX,
                style.box_thickness_px,
            );
            draw_text(
                &mut out,
                &format!("ID:{}", object.id),
                x1,
                y1.saturating_sub(5),
                colors::OBJECT_ID,
                style.id_label_scale,
            );
        }

        let mut tinted = out.clone();
        for lane in lanes {
            if let Some(rect) = lane_rect(&tinted, lane) {
                draw_filled_rect_mut(&mut tinted, rect, style.lane_color);
            }
        }
        blend_into(&mut out, &tinted, style.lane_fill_alpha);

        for lane in lanes {
            let (x0, y0, x1, y1) = normalized_corners(lane);
            draw_thick_rect(&mut out, x0, y0, x1, y1, style.lane_color, style.lane_outline_px);

            let count = counts.get(lane.id).unwrap_or(0);
            draw_text(
                &mut out,
                &format!("L{}: {}", lane.id, count),
                lane.p1.x,
                lane.p1.y.saturating_sub(10),
                colors::LANE_LABEL,
                style.lane_label_scale,
            );
        }

        draw_text(
            &mut out,
            &totals_label(counts),
            style.totals_origin.x,
            style.totals_origin.y,
            colors::TOTALS,
            style.totals_scale,
        );

        out
    }
}

/// Render with the default style.
pub fn render(
    frame: &RgbImage,
    lanes: &[LaneRegion],
    counts: &LaneCounts,
    objects: &[TrackedObject],
) -> RgbImage {
    OverlayRenderer::default().render(frame, lanes, counts, objects)
}

/// `Total - L1: a | L2: b | ...`
pub fn totals_label(counts: &LaneCounts) -> String {
    let parts: Vec<String> = counts
        .iter()
        .map(|(lane, count)| format!("L{}: {}", lane, count))
        .collect();
    format!("Total - {}", parts.join(" | "))
}

fn normalized_corners(lane: &LaneRegion) -> (i32, i32, i32, i32) {
    (
        lane.p1.x.min(lane.p2.x),
        lane.p1.y.min(lane.p2.y),
        lane.p1.x.max(lane.p2.x),
        lane.p1.y.max(lane.p2.y),
    )
}

fn lane_rect(img: &RgbImage, lane: &LaneRegion) -> Option<Rect> {
    let (x0, y0, x1, y1) = normalized_corners(lane);
    if x0 == x1 || y0 == y1 {
        return None;
    }
    clip_rect(img, x0 as i64, y0 as i64, x1 as i64, y1 as i64)
}

/// Inclusive `(left, top)-(right, bottom)` clamped to one pixel outside the
/// frame on every side. Edges beyond the frame stay invisible.
fn clip_rect(img: &RgbImage, left: i64, top: i64, right: i64, bottom: i64) -> Option<Rect> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (left, right) = (left.clamp(-1, w), right.clamp(-1, w));
    let (top, bottom) = (top.clamp(-1, h), bottom.clamp(-1, h));
    if right < left || bottom < top {
        return None;
    }
    let width = u32::try_from(right - left + 1).ok()?;
    let height = u32::try_from(bottom - top + 1).ok()?;
    Some(Rect::at(left as i32, top as i32).of_size(width, height))
}

/// `dst = src * alpha + dst * (1 - alpha)` where the two differ.
fn blend_into(dst: &mut RgbImage, src: &RgbImage, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        if d == s {
            continue;
        }
        for c in 0..3 {
            let v = s[c] as f32 * alpha + d[c] as f32 * (1.0 - alpha);
            d[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Rectangle outline growing outward from `(x0, y0)-(x1, y1)`.
pub fn draw_thick_rect(
    img: &mut RgbImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Rgb<u8>,
    thickness: u32,
) {
    let (left, right) = (x0.min(x1) as i64, x0.max(x1) as i64);
    let (top, bottom) = (y0.min(y1) as i64, y0.max(y1) as i64);

    for offset in 0..thickness.max(1) as i64 {
        if let Some(rect) = clip_rect(img, left - offset, top - offset, right + offset, bottom + offset) {
            draw_hollow_rect_mut(img, rect, color);
        }
    }
}

/// Width in pixels of `text` at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * glyphs::GLYPH_ADVANCE * scale.max(1)
}

/// Draw `text` with its baseline-left corner at `(x, baseline)`. Clipped to the frame.
pub fn draw_text(img: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1) as i64;
    let top = baseline as i64 - glyphs::GLYPH_HEIGHT as i64 * scale;
    let (w, h) = (img.width() as i64, img.height() as i64);
    if top >= h || baseline < 0 {
        return;
    }

    for (i, ch) in text.chars().enumerate() {
        let origin_x = x as i64 + i as i64 * glyphs::GLYPH_ADVANCE as i64 * scale;
        if origin_x >= w {
            break;
        }
        for (row, bits) in glyphs::glyph(ch).iter().enumerate() {
            for col in 0..glyphs::GLYPH_WIDTH as i64 {
                if (bits >> (glyphs::GLYPH_WIDTH as i64 - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = top + row as i64 * scale + dy;
                        if px >= 0 && py >= 0 && px < w && py < h {
                            img.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}
