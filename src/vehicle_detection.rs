// src/vehicle_detection.rs
//
// Detector seam plus the YOLOv8 ONNX implementation (feature `yolo`).
// Boxes come back in the pixel space of the image handed to `detect`.

use crate::types::{BBox, Detection};
use anyhow::Result;
use image::{imageops, RgbImage};

#[cfg(feature = "yolo")]
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
#[cfg(feature = "yolo")]
use tracing::{debug, info};

pub const YOLO_INPUT_SIZE: u32 = 640;
pub const NMS_IOU_THRESHOLD: f32 = 0.45;
const LETTERBOX_FILL: u8 = 114;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Object detector used by a counting session.
pub trait Detector: Send {
    /// Detect objects in `image`. Boxes are in `image` pixel coordinates.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Detector name for logging.
    fn name(&self) -> &str;
}

pub fn class_name(class_id: usize) -> &'static str {
    COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

/// Placement of the source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Model-input coordinates back to source-image coordinates.
    pub fn restore(&self, b: &BBox) -> BBox {
        BBox::new(
            (b.x1 - self.pad_x) / self.scale,
            (b.y1 - self.pad_y) / self.scale,
            (b.x2 - self.pad_x) / self.scale,
            (b.y2 - self.pad_y) / self.scale,
        )
    }
}

/// Resize keeping aspect ratio, pad to `size`x`size`, normalize to CHW `[0, 1]`.
pub fn letterbox(image: &RgbImage, size: u32) -> (Vec<f32>, Letterbox) {
    let (src_w, src_h) = image.dimensions();
    let scale = (size as f32 / src_w.max(1) as f32).min(size as f32 / src_h.max(1) as f32);
    let scaled_w = ((src_w as f32 * scale) as u32).clamp(1, size);
    let scaled_h = ((src_h as f32 * scale) as u32).clamp(1, size);
    let pad_x = (size - scaled_w) / 2;
    let pad_y = (size - scaled_h) / 2;

    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, image::Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let plane = (size * size) as usize;
    let mut input = vec![0.0f32; 3 * plane];
    for (x, y, px) in canvas.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        for c in 0..3 {
            input[c * plane + idx] = px[c] as f32 / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decode a YOLOv8 `[1, 4 + classes, predictions]` output into source-space
/// detections above `conf_thresh`, then apply NMS.
pub fn decode_predictions(
    output: &[f32],
    num_predictions: usize,
    letterbox: &Letterbox,
    conf_thresh: f32,
) -> Vec<Detection> {
    let num_classes = (output.len() / num_predictions.max(1)).saturating_sub(4);
    let mut detections = Vec::new();

    for i in 0..num_predictions {
        let cx = output[i];
        let cy = output[num_predictions + i];
        let w = output[num_predictions * 2 + i];
        let h = output[num_predictions * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[num_predictions * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh {
            continue;
        }

        let model_box = BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
        detections.push(Detection {
            bbox: letterbox.restore(&model_box),
            confidence: max_conf,
            class_name: class_name(best_class).to_string(),
        });
    }

    nms(detections, NMS_IOU_THRESHOLD)
}

/// Class-agnostic greedy non-maximum suppression.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) < iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

#[cfg(feature = "yolo")]
pub struct YoloDetector {
    session: Session,
    confidence_threshold: f32,
}

#[cfg(feature = "yolo")]
impl YoloDetector {
    pub fn new(
        model_path: &str,
        confidence_threshold: f32,
        use_cuda: bool,
        num_threads: usize,
    ) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let mut builder = Session::builder()?;
        if use_cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads.max(1))?
            .commit_from_file(model_path)?;

        info!("✓ YOLO detector initialized (conf >= {:.2})", confidence_threshold);
        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<(Vec<f32>, usize)> {
        let size = YOLO_INPUT_SIZE as usize;
        let shape = [1, 3, size, size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let num_predictions = shape.get(2).copied().unwrap_or(0).max(0) as usize;

        Ok((data.to_vec(), num_predictions))
    }
}

#[cfg(feature = "yolo")]
impl Detector for YoloDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (input, placement) = letterbox(image, YOLO_INPUT_SIZE);
        let (output, num_predictions) = self.infer(input)?;
        let detections =
            decode_predictions(&output, num_predictions, &placement, self.confidence_threshold);
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "YOLOv8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection {
            bbox: BBox::new(x1, y1, x2, y2),
            confidence: conf,
            class_name: "car".to_string(),
        }
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(2), "car");
        assert_eq!(class_name(3), "motorcycle");
        assert_eq!(class_name(5), "bus");
        assert_eq!(class_name(7), "truck");
        assert_eq!(class_name(500), "unknown");
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 100.0, 100.0, 0.6),
                det(5.0, 5.0, 105.0, 105.0, 0.9),
                det(300.0, 300.0, 350.0, 350.0, 0.5),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_wide_frame() {
        let image = RgbImage::from_pixel(960, 540, image::Rgb([255, 0, 0]));
        let (input, placement) = letterbox(&image, 640);
        assert_eq!(input.len(), 3 * 640 * 640);
        assert!((placement.scale - 640.0 / 960.0).abs() < 1e-6);
        assert_eq!(placement.pad_x, 0.0);
        assert_eq!(placement.pad_y, 140.0);

        // top padding row is grey, image row is red
        let plane = 640 * 640;
        assert!((input[0] - 114.0 / 255.0).abs() < 1e-6);
        let inside = 320 * 640 + 320;
        assert!((input[inside] - 1.0).abs() < 1e-6);
        assert!(input[plane + inside].abs() < 1e-6);
    }

    #[test]
    fn test_decode_restores_source_coordinates() {
        let placement = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 100.0,
        };
        // two predictions, three classes: [cx, cy, w, h, c0, c1, c2] x 2
        let n = 2;
        let mut output = vec![0.0f32; 7 * n];
        let mut set = |row: usize, i: usize, v: f32| output[row * n + i] = v;
        set(0, 0, 100.0);
        set(1, 0, 200.0);
        set(2, 0, 40.0);
        set(3, 0, 20.0);
        set(4 + 2, 0, 0.8); // class 2 = car
        set(4, 1, 0.1); // below threshold

        let dets = decode_predictions(&output, n, &placement, 0.4);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "car");
        assert_eq!(dets[0].bbox, BBox::new(160.0, 180.0, 240.0, 220.0));
    }
}
