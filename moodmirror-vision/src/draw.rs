//! Overlay surface and draw helpers.
//!
//! The overlay is a transparent RGBA canvas sized to the on-screen video
//! rect. Callers resize it to the current rendered dimensions, clear it,
//! then draw box, landmarks and score bars in that order.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::face::{Dimensions, FaceAnalysis};

const BOX_COLOR: Rgba<u8> = Rgba([66, 133, 244, 255]);
const LANDMARK_COLOR: Rgba<u8> = Rgba([234, 67, 53, 255]);
const BAR_FILL: Rgba<u8> = Rgba([52, 168, 83, 230]);
const BAR_TRACK: Rgba<u8> = Rgba([0, 0, 0, 110]);

const LANDMARK_RADIUS: i32 = 2;
const BAR_WIDTH: f32 = 72.0;
const BAR_HEIGHT: u32 = 4;
const BAR_GAP: u32 = 3;

pub struct Overlay {
    image: RgbaImage,
}

impl Overlay {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            image: RgbaImage::new(dims.width.max(1), dims.height.max(1)),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// Reallocate the canvas when the target size changed, so the overlay's
    /// pixel dimensions always equal the video's rendered dimensions.
    pub fn match_dimensions(&mut self, dims: Dimensions) {
        let dims = Dimensions {
            width: dims.width.max(1),
            height: dims.height.max(1),
        };
        if self.dimensions() != dims {
            self.image = RgbaImage::new(dims.width, dims.height);
        }
    }

    /// Reset every pixel to fully transparent.
    pub fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }
}

/// Draw the detection bounding box.
pub fn draw_detection(canvas: &mut RgbaImage, analysis: &FaceAnalysis) {
    let bbox = &analysis.detection.bbox;
    for inset in 0..2 {
        if let Some(rect) = clamped_rect(
            canvas,
            bbox.x + inset as f32,
            bbox.y + inset as f32,
            bbox.width - 2.0 * inset as f32,
            bbox.height - 2.0 * inset as f32,
        ) {
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }
    }
}

/// Draw one dot per landmark point.
pub fn draw_landmarks(canvas: &mut RgbaImage, analysis: &FaceAnalysis) {
    for point in &analysis.landmarks {
        draw_filled_circle_mut(
            canvas,
            (point.x.round() as i32, point.y.round() as i32),
            LANDMARK_RADIUS,
            LANDMARK_COLOR,
        );
    }
}

/// Draw one horizontal bar per expression below the box, ranked order,
/// length proportional to confidence.
pub fn draw_expression_scores(canvas: &mut RgbaImage, analysis: &FaceAnalysis) {
    let bbox = &analysis.detection.bbox;
    let x = bbox.x;
    let mut y = bbox.y + bbox.height + BAR_GAP as f32;
    for (_, score) in analysis.expressions.ranked() {
        if let Some(track) = clamped_rect(canvas, x, y, BAR_WIDTH, BAR_HEIGHT as f32) {
            draw_filled_rect_mut(canvas, track, BAR_TRACK);
        }
        let fill = BAR_WIDTH * score.clamp(0.0, 1.0);
        if let Some(bar) = clamped_rect(canvas, x, y, fill, BAR_HEIGHT as f32) {
            draw_filled_rect_mut(canvas, bar, BAR_FILL);
        }
        y += (BAR_HEIGHT + BAR_GAP) as f32;
    }
}

/// Intersect an f32 rect with the canvas; `None` when nothing is visible.
fn clamped_rect(canvas: &RgbaImage, x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
    let x0 = x.max(0.0).floor() as i64;
    let y0 = y.max(0.0).floor() as i64;
    let x1 = ((x + width).min(canvas.width() as f32)).ceil() as i64;
    let y1 = ((y + height).min(canvas.height() as f32)).ceil() as i64;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}
