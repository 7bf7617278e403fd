// src/coordinate_mapper.rs
//
// Detector-space -> native-frame coordinate mapping.
//
// Detection runs on a frame resized to the reference size; the tracker and
// everything downstream work in native pixels. Each axis is scaled
// independently, so a non-uniform resize is undone exactly.

use crate::error::GeometryError;
use crate::types::{BBox, FrameSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    reference: FrameSize,
    native: FrameSize,
    scale_x: f32,
    scale_y: f32,
}

impl CoordinateMapper {
    pub fn new(reference: FrameSize, native: FrameSize) -> Result<Self, GeometryError> {
        if reference.is_degenerate() {
            return Err(GeometryError::DegenerateReferenceSize(reference));
        }
        if native.is_degenerate() {
            return Err(GeometryError::DegenerateNativeSize(native));
        }

        Ok(Self {
            reference,
            native,
            scale_x: native.width as f32 / reference.width as f32,
            scale_y: native.height as f32 / reference.height as f32,
        })
    }

    pub fn reference(&self) -> FrameSize {
        self.reference
    }

    pub fn native(&self) -> FrameSize {
        self.native
    }

    /// `(scale_x, scale_y)` from reference to native.
    pub fn scale(&self) -> (f32, f32) {
        (self.scale_x, self.scale_y)
    }

    /// Reference space -> native space.
    pub fn map_box(&self, b: &BBox) -> BBox {
        BBox::new(
            b.x1 * self.scale_x,
            b.y1 * self.scale_y,
            b.x2 * self.scale_x,
            b.y2 * self.scale_y,
        )
    }

    /// Native space -> reference space.
    pub fn unmap_box(&self, b: &BBox) -> BBox {
        BBox::new(
            b.x1 / self.scale_x,
            b.y1 / self.scale_y,
            b.x2 / self.scale_x,
            b.y2 / self.scale_y,
        )
    }
}

/// One-shot mapping of a reference-space box into native space.
pub fn map_box(b: &BBox, reference: FrameSize, native: FrameSize) -> Result<BBox, GeometryError> {
    Ok(CoordinateMapper::new(reference, native)?.map_box(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_box_close(a: &BBox, b: &BBox, tol: f32) {
        for (x, y) in a.to_array().iter().zip(b.to_array().iter()) {
            assert!((x - y).abs() <= tol, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_scale_960_to_1280() {
        let mapper = CoordinateMapper::new(FrameSize::new(960, 540), FrameSize::new(1280, 720))
            .unwrap();
        let (sx, sy) = mapper.scale();
        assert!((sx - 4.0 / 3.0).abs() < 1e-6);
        assert!((sy - 4.0 / 3.0).abs() < 1e-6);

        let mapped = mapper.map_box(&BBox::new(96.0, 54.0, 480.0, 270.0));
        assert_box_close(&mapped, &BBox::new(128.0, 72.0, 640.0, 360.0), 1e-3);
    }

    #[test]
    fn test_axes_scale_independently() {
        let mapped = map_box(
            &BBox::new(10.0, 10.0, 20.0, 20.0),
            FrameSize::new(100, 100),
            FrameSize::new(200, 50),
        )
        .unwrap();
        assert_box_close(&mapped, &BBox::new(20.0, 5.0, 40.0, 10.0), 1e-6);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let mapper = CoordinateMapper::new(FrameSize::new(960, 540), FrameSize::new(1920, 1080))
            .unwrap();
        let original = BBox::new(123.4, 56.7, 789.0, 432.1);
        let back = mapper.unmap_box(&mapper.map_box(&original));
        assert_box_close(&back, &original, 1e-3);

        let odd = CoordinateMapper::new(FrameSize::new(640, 360), FrameSize::new(1366, 768))
            .unwrap();
        let back = odd.unmap_box(&odd.map_box(&original));
        assert_box_close(&back, &original, 1e-3);
    }

    #[test]
    fn test_zero_reference_dimension_fails_fast() {
        let err = CoordinateMapper::new(FrameSize::new(0, 540), FrameSize::new(1280, 720))
            .unwrap_err();
        assert_eq!(
            err,
            GeometryError::DegenerateReferenceSize(FrameSize::new(0, 540))
        );

        assert!(map_box(
            &BBox::new(0.0, 0.0, 1.0, 1.0),
            FrameSize::new(960, 0),
            FrameSize::new(1280, 720)
        )
        .is_err());
    }

    #[test]
    fn test_zero_native_dimension_fails_fast() {
        let err = CoordinateMapper::new(FrameSize::new(960, 540), FrameSize::new(1280, 0))
            .unwrap_err();
        assert!(matches!(err, GeometryError::DegenerateNativeSize(_)));
    }
}
