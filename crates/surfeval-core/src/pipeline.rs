//! Single-image liveness inference.
//!
//! For each detected face: regress landmarks, reconstruct the face surface
//! mask, black out everything else in the frame, then classify the masked
//! image with the same preprocessing used for dataset evaluation.

use image::RgbImage;
use ndarray::Axis;
use thiserror::Error;

use crate::classifier::{argmax, softmax, Classifier, ClassifierError};
use crate::depth::{apply_mask, DepthError, DepthReconstructor};
use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkRegressor};
use crate::transform::EvalTransform;
use crate::types::{FaceRect, Landmarks};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("depth error: {0}")]
    Depth(#[from] DepthError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("classifier returned no scores")]
    EmptyScores,
}

/// Classification of one detected face.
#[derive(Debug, Clone)]
pub struct FaceVerdict {
    pub face: FaceRect,
    pub landmarks: Landmarks,
    /// Predicted class index (1 = live).
    pub liveness: usize,
    /// Softmax probability of the predicted class.
    pub probability: f32,
    /// The full frame with everything outside the face surface zeroed.
    pub masked: RgbImage,
}

/// Detector, landmark regressor, depth reconstructor and classifier wired together.
pub struct SingleImagePipeline<D, L, R, C> {
    pub detector: D,
    pub landmarks: L,
    pub depth: R,
    pub classifier: C,
    pub transform: EvalTransform,
}

impl<D, L, R, C> SingleImagePipeline<D, L, R, C>
where
    D: FaceDetector,
    L: LandmarkRegressor,
    R: DepthReconstructor,
    C: Classifier,
{
    pub fn new(detector: D, landmarks: L, depth: R, classifier: C) -> Self {
        Self {
            detector,
            landmarks,
            depth,
            classifier,
            transform: EvalTransform::default(),
        }
    }

    /// Classify every face found in `image`. No faces yields an empty list.
    pub fn run(&mut self, image: &RgbImage) -> Result<Vec<FaceVerdict>, PipelineError> {
        let faces = self.detector.detect(image)?;
        if faces.is_empty() {
            tracing::warn!("no face detected");
            return Ok(Vec::new());
        }

        let mut verdicts = Vec::with_capacity(faces.len());
        for face in faces {
            let landmarks = self.landmarks.regress(image, &face)?;
            let mask = self.depth.reconstruct_depth_mask(image, &landmarks)?;
            let masked = apply_mask(image, &mask);

            let input = self.transform.apply(&masked).insert_axis(Axis(0));
            let scores = self.classifier.classify(&input)?;
            if scores.nrows() == 0 || scores.ncols() == 0 {
                return Err(PipelineError::EmptyScores);
            }

            let row = scores.row(0);
            let liveness = argmax(row);
            let probability = softmax(row)[liveness];

            tracing::info!(
                x = face.x,
                y = face.y,
                confidence = face.confidence,
                mask_pixels = mask.coverage(),
                liveness,
                probability,
                "face classified"
            );

            verdicts.push(FaceVerdict {
                face,
                landmarks,
                liveness,
                probability,
                masked,
            });
        }

        Ok(verdicts)
    }
}
