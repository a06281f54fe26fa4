use image::{DynamicImage, GenericImageView};

use crate::error::Result;
use crate::face::{self, DetectorOptions, Dimensions, FaceAnalysis};
use crate::model::ModelSet;

/// Full analysis: detect best face → landmarks → expression scores.
pub struct Analyzer {
    models: ModelSet,
    options: DetectorOptions,
}

impl Analyzer {
    pub fn new(models: ModelSet, options: DetectorOptions) -> Self {
        Self { models, options }
    }

    /// Analyze the single most confident face in a frame.
    ///
    /// `Ok(None)` when no face clears the detector threshold; geometry in
    /// the result is in pixel coordinates of `img`.
    pub fn detect_single_face(&mut self, img: &DynamicImage) -> Result<Option<FaceAnalysis>> {
        let detections = face::detect_faces(&mut self.models.detector, img, &self.options)?;
        let Some(detection) = detections.into_iter().next() else {
            return Ok(None);
        };

        let landmarks =
            face::extract_landmarks(&mut self.models.landmarks, img, &detection.bbox)?;
        let expressions =
            face::classify_expression(&mut self.models.expression, img, &detection.bbox)?;

        let (width, height) = img.dimensions();
        Ok(Some(FaceAnalysis {
            detection,
            landmarks,
            expressions,
            dimensions: Dimensions { width, height },
        }))
    }
}
