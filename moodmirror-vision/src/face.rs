//! Pre/post-processing around the three pretrained models.
//!
//! The models are opaque collaborators; this module only adapts frames to
//! each model's published tensor contract and maps tensor output back to
//! image coordinates:
//!
//! - detector: RGB `[1, 3, 240, 320]`, `(v - 127) / 128`; outputs face
//!   scores `[1, N, 2]` (background, face) and corner-form boxes
//!   `[1, N, 4]` normalized to the input frame.
//! - landmarks: RGB `[1, 3, 112, 112]`, `v / 255`; output `[1, 136]` x,y
//!   pairs normalized to the crop.
//! - expression: grayscale `[1, 1, 64, 64]`, `v / 255`; output `[1, 7]`
//!   logits in vocabulary order.

use anyhow::{anyhow, Context};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::error::{Error, Result};
use crate::expression::{ExpressionScores, EXPRESSION_COUNT};

/// Detector input resolution (width, height). Frames are resized to this
/// bounded size before inference regardless of capture resolution.
pub const DETECTOR_INPUT: (u32, u32) = (320, 240);
const LANDMARK_INPUT: u32 = 112;
const EXPRESSION_INPUT: u32 = 64;
/// Margin added around the detection box before the landmark crop.
const LANDMARK_CROP_MARGIN: f32 = 0.2;
pub const LANDMARK_COUNT: usize = 68;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Face bounding box in pixel coordinates, corner + size form.
#[derive(Debug, Clone, Copy)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.width * self.height + other.width * other.height - inter;
        inter / union
    }
}

/// One detector hit.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: FaceBox,
    pub score: f32,
}

/// One fully analyzed face. Geometry is relative to `dimensions`.
#[derive(Debug, Clone)]
pub struct FaceAnalysis {
    pub detection: Detection,
    pub landmarks: Vec<Point>,
    pub expressions: ExpressionScores,
    pub dimensions: Dimensions,
}

impl FaceAnalysis {
    /// Rescale all geometry proportionally to `target`, e.g. the on-screen
    /// size of the video the overlay is drawn over. Expression scores are
    /// untouched.
    pub fn resized_to(&self, target: Dimensions) -> FaceAnalysis {
        let sx = target.width as f32 / self.dimensions.width.max(1) as f32;
        let sy = target.height as f32 / self.dimensions.height.max(1) as f32;
        FaceAnalysis {
            detection: Detection {
                bbox: FaceBox {
                    x: self.detection.bbox.x * sx,
                    y: self.detection.bbox.y * sy,
                    width: self.detection.bbox.width * sx,
                    height: self.detection.bbox.height * sy,
                },
                score: self.detection.score,
            },
            landmarks: self
                .landmarks
                .iter()
                .map(|p| Point {
                    x: p.x * sx,
                    y: p.y * sy,
                })
                .collect(),
            expressions: self.expressions,
            dimensions: target,
        }
    }
}

/// Detector tuning, separate from the fixed model contract.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub score_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            iou_threshold: 0.3,
        }
    }
}

/// Detect faces in a frame. Results are in pixel coordinates of `img` and
/// sorted by descending confidence.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    options: &DetectorOptions,
) -> Result<Vec<Detection>> {
    run_detector(session, img, options).map_err(Error::Detection)
}

fn run_detector(
    session: &mut Session,
    img: &DynamicImage,
    options: &DetectorOptions,
) -> anyhow::Result<Vec<Detection>> {
    let (frame_w, frame_h) = img.dimensions();
    let (in_w, in_h) = DETECTOR_INPUT;
    let resized = img.resize_exact(in_w, in_h, FilterType::Triangle).to_rgb8();
    let input = rgb_to_chw(&resized, |v| (v - 127.0) / 128.0);
    let input = Array4::from_shape_vec((1, 3, in_h as usize, in_w as usize), input)?;
    let input_tensor = Value::from_array(input)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (score_shape, score_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .context("extracting detector scores")?;
    let (box_shape, box_data) = outputs[1]
        .try_extract_tensor::<f32>()
        .context("extracting detector boxes")?;

    let score_shape: Vec<i64> = score_shape.iter().copied().collect();
    let box_shape: Vec<i64> = box_shape.iter().copied().collect();
    if score_shape.len() != 3 || score_shape[0] != 1 || score_shape[2] != 2 {
        return Err(anyhow!("unexpected score shape {score_shape:?}"));
    }
    if box_shape.len() != 3 || box_shape[0] != 1 || box_shape[2] != 4 {
        return Err(anyhow!("unexpected box shape {box_shape:?}"));
    }
    if score_shape[1] != box_shape[1] {
        return Err(anyhow!(
            "detector output mismatch: {} scores vs {} boxes",
            score_shape[1],
            box_shape[1]
        ));
    }

    decode_detections(
        score_data,
        box_data,
        options,
        Dimensions {
            width: frame_w,
            height: frame_h,
        },
    )
}

/// Decode the detector's raw score/box tensors into pixel-space detections,
/// threshold and suppress overlaps. Exposed for decode tests.
pub fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    options: &DetectorOptions,
    frame: Dimensions,
) -> anyhow::Result<Vec<Detection>> {
    let count = scores.len() / 2;
    if boxes.len() != count * 4 {
        return Err(anyhow!(
            "detector output mismatch: {} scores vs {} box coords",
            scores.len(),
            boxes.len()
        ));
    }

    let mut candidates = Vec::new();
    for i in 0..count {
        let score = scores[i * 2 + 1];
        if score < options.score_threshold {
            continue;
        }
        let x1 = boxes[i * 4].clamp(0.0, 1.0) * frame.width as f32;
        let y1 = boxes[i * 4 + 1].clamp(0.0, 1.0) * frame.height as f32;
        let x2 = boxes[i * 4 + 2].clamp(0.0, 1.0) * frame.width as f32;
        let y2 = boxes[i * 4 + 3].clamp(0.0, 1.0) * frame.height as f32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        candidates.push(Detection {
            bbox: FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            },
            score,
        });
    }

    Ok(nms(candidates, options.iou_threshold))
}

/// Greedy non-maximum suppression; keeps descending score order.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);
        for j in (i + 1)..detections.len() {
            if !suppressed[j]
                && detections[i].bbox.iou(&detections[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Extract 68 landmark points for a detected face, in pixel coordinates
/// of `img`.
pub fn extract_landmarks(
    session: &mut Session,
    img: &DynamicImage,
    bbox: &FaceBox,
) -> Result<Vec<Point>> {
    run_landmarks(session, img, bbox).map_err(Error::Detection)
}

fn run_landmarks(
    session: &mut Session,
    img: &DynamicImage,
    bbox: &FaceBox,
) -> anyhow::Result<Vec<Point>> {
    let (crop, region) = crop_region(img, bbox, LANDMARK_CROP_MARGIN);
    let resized = crop
        .resize_exact(LANDMARK_INPUT, LANDMARK_INPUT, FilterType::Triangle)
        .to_rgb8();
    let input = rgb_to_chw(&resized, |v| v / 255.0);
    let input = Array4::from_shape_vec(
        (1, 3, LANDMARK_INPUT as usize, LANDMARK_INPUT as usize),
        input,
    )?;
    let input_tensor = Value::from_array(input)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .context("extracting landmark tensor")?;
    if data.len() < LANDMARK_COUNT * 2 {
        return Err(anyhow!(
            "landmark output too small: {} values",
            data.len()
        ));
    }

    let points = (0..LANDMARK_COUNT)
        .map(|i| Point {
            x: region.x + data[i * 2] * region.width,
            y: region.y + data[i * 2 + 1] * region.height,
        })
        .collect();
    Ok(points)
}

/// Classify the expression of a detected face.
pub fn classify_expression(
    session: &mut Session,
    img: &DynamicImage,
    bbox: &FaceBox,
) -> Result<ExpressionScores> {
    run_expression(session, img, bbox).map_err(Error::Detection)
}

fn run_expression(
    session: &mut Session,
    img: &DynamicImage,
    bbox: &FaceBox,
) -> anyhow::Result<ExpressionScores> {
    let (crop, _region) = crop_region(img, bbox, 0.0);
    let gray = crop
        .resize_exact(EXPRESSION_INPUT, EXPRESSION_INPUT, FilterType::Triangle)
        .to_luma8();
    let input: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    let input = Array4::from_shape_vec(
        (1, 1, EXPRESSION_INPUT as usize, EXPRESSION_INPUT as usize),
        input,
    )?;
    let input_tensor = Value::from_array(input)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .context("extracting expression tensor")?;
    if data.len() < EXPRESSION_COUNT {
        return Err(anyhow!(
            "expression output too small: {} logits",
            data.len()
        ));
    }

    let mut logits = [0.0f32; EXPRESSION_COUNT];
    logits.copy_from_slice(&data[..EXPRESSION_COUNT]);
    Ok(ExpressionScores::from_logits(logits))
}

/// Square crop around `bbox`, grown by `margin` and clamped to the image.
/// Returns the crop plus the region it covers in source coordinates.
fn crop_region(img: &DynamicImage, bbox: &FaceBox, margin: f32) -> (DynamicImage, FaceBox) {
    let (img_w, img_h) = img.dimensions();
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let side = bbox.width.max(bbox.height).max(1.0) * (1.0 + margin);
    let x0 = (cx - side / 2.0).max(0.0);
    let y0 = (cy - side / 2.0).max(0.0);
    let x1 = (cx + side / 2.0).min(img_w as f32);
    let y1 = (cy + side / 2.0).min(img_h as f32);
    let region = FaceBox {
        x: x0,
        y: y0,
        width: (x1 - x0).max(1.0),
        height: (y1 - y0).max(1.0),
    };
    let crop = img.crop_imm(
        region.x as u32,
        region.y as u32,
        region.width as u32,
        region.height as u32,
    );
    (crop, region)
}

/// Planar CHW float layout from packed RGB bytes.
fn rgb_to_chw(img: &RgbImage, normalize: impl Fn(f32) -> f32) -> Vec<f32> {
    let count = (img.width() * img.height()) as usize;
    let pixels = img.as_raw();
    let mut out = vec![0.0f32; 3 * count];
    let (r, rest) = out.split_at_mut(count);
    let (g, b) = rest.split_at_mut(count);
    for i in 0..count {
        r[i] = normalize(pixels[i * 3] as f32);
        g[i] = normalize(pixels[i * 3 + 1] as f32);
        b[i] = normalize(pixels[i * 3 + 2] as f32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn iou_overlap() {
        let a = FaceBox {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
        };
        let b = FaceBox {
            x: 15.0,
            y: 15.0,
            width: 20.0,
            height: 20.0,
        };
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);

        let far = FaceBox {
            x: 100.0,
            y: 100.0,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn nms_suppresses_overlaps() {
        let near_duplicate = |x: f32, score: f32| Detection {
            bbox: FaceBox {
                x,
                y: 10.0,
                width: 20.0,
                height: 20.0,
            },
            score,
        };
        let detections = vec![
            near_duplicate(10.0, 0.9),
            near_duplicate(12.0, 0.8),
            near_duplicate(100.0, 0.85),
        ];
        let kept = nms(detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.85);
    }

    #[test]
    fn decode_thresholds_and_scales() {
        // Two candidates: one confident face covering the center quarter,
        // one below threshold.
        let scores = vec![0.1, 0.9, 0.8, 0.2];
        let boxes = vec![0.25, 0.25, 0.75, 0.75, 0.0, 0.0, 1.0, 1.0];
        let detections = decode_detections(
            &scores,
            &boxes,
            &DetectorOptions::default(),
            dims(320, 240),
        )
        .unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert!((d.bbox.x - 80.0).abs() < 1e-3);
        assert!((d.bbox.y - 60.0).abs() < 1e-3);
        assert!((d.bbox.width - 160.0).abs() < 1e-3);
        assert!((d.bbox.height - 120.0).abs() < 1e-3);
        assert!((d.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_mismatched_tensors() {
        let scores = vec![0.1, 0.9];
        let boxes = vec![0.0, 0.0, 1.0];
        assert!(decode_detections(
            &scores,
            &boxes,
            &DetectorOptions::default(),
            dims(320, 240)
        )
        .is_err());
    }

    #[test]
    fn resize_scales_geometry_only() {
        let analysis = FaceAnalysis {
            detection: Detection {
                bbox: FaceBox {
                    x: 10.0,
                    y: 20.0,
                    width: 100.0,
                    height: 50.0,
                },
                score: 0.75,
            },
            landmarks: vec![Point { x: 60.0, y: 45.0 }],
            expressions: ExpressionScores::from_probabilities([
                0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ]),
            dimensions: dims(640, 480),
        };
        let resized = analysis.resized_to(dims(320, 960));
        assert!((resized.detection.bbox.x - 5.0).abs() < 1e-4);
        assert!((resized.detection.bbox.y - 40.0).abs() < 1e-4);
        assert!((resized.detection.bbox.width - 50.0).abs() < 1e-4);
        assert!((resized.detection.bbox.height - 100.0).abs() < 1e-4);
        assert!((resized.landmarks[0].x - 30.0).abs() < 1e-4);
        assert!((resized.landmarks[0].y - 90.0).abs() < 1e-4);
        assert_eq!(resized.dimensions, dims(320, 960));
        assert_eq!(resized.expressions.dominant().0, Expression::Happy);
        assert_eq!(resized.detection.score, 0.75);
    }

    #[test]
    fn crop_region_stays_inside_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let bbox = FaceBox {
            x: 90.0,
            y: 70.0,
            width: 30.0,
            height: 30.0,
        };
        let (crop, region) = crop_region(&img, &bbox, 0.2);
        assert!(region.x >= 0.0 && region.y >= 0.0);
        assert!(region.x + region.width <= 100.0);
        assert!(region.y + region.height <= 80.0);
        assert!(crop.width() >= 1 && crop.height() >= 1);
    }
}
