//! 68-point facial landmark regression via ONNX Runtime.
//!
//! The regressor sees a square crop around the detected face, enlarged so
//! the jaw line fits, and returns 136 values: `(x, y)` pairs normalized to
//! the crop. They are mapped back to image coordinates here.

use crate::crop::{crop_with_padding, round_half_even};
use crate::types::{FaceRect, Landmarks, RoiBox};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 112;
const LANDMARK_COUNT: usize = 68;
/// Face rect enlargement before cropping.
const FACE_CROP_SCALE: f32 = 1.2;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face rect has no area")]
    EmptyFace,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Regresses landmark points for one detected face.
pub trait LandmarkRegressor {
    fn regress(&mut self, image: &RgbImage, face: &FaceRect) -> Result<Landmarks, LandmarkError>;
}

/// Square box centered on the face rect with side `scale * max(w, h)`.
pub fn face_crop_box(face: &FaceRect, scale: f32) -> RoiBox {
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let half = face.width.max(face.height) * scale / 2.0;
    RoiBox {
        x0: cx - half,
        y0: cy - half,
        x1: cx + half,
        y1: cy + half,
    }
}

/// Region of interest used for dense reconstruction, derived from landmarks.
///
/// The landmark bounding box is squared around its center, then grown to a
/// square whose side is the diagonal of that square. Returns `None` for an
/// empty landmark set.
pub fn roi_box_from_landmarks(points: &[(f32, f32)]) -> Option<RoiBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.0, first.1, first.0, first.1);
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let cx = (min_x + max_x) / 2.0;
    let cy = (min_y + max_y) / 2.0;
    let radius = (max_x - min_x).max(max_y - min_y) / 2.0;
    let side = 2.0 * radius;
    let diagonal = (side * side + side * side).sqrt();

    Some(RoiBox {
        x0: cx - diagonal / 2.0,
        y0: cy - diagonal / 2.0,
        x1: cx - diagonal / 2.0 + diagonal,
        y1: cy - diagonal / 2.0 + diagonal,
    })
}

/// ONNX-backed 68-point landmark regressor.
pub struct OnnxLandmarkRegressor {
    session: Session,
}

impl OnnxLandmarkRegressor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, LandmarkError> {
        if !Path::new(model_path).exists() {
            return Err(LandmarkError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded landmark regressor");
        Ok(Self { session })
    }

    /// Resize a face crop to the network input as an NCHW tensor in [0, 1].
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let resized = imageops::resize(
            crop,
            LANDMARK_INPUT_SIZE,
            LANDMARK_INPUT_SIZE,
            FilterType::Triangle,
        );
        let size = LANDMARK_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

impl LandmarkRegressor for OnnxLandmarkRegressor {
    fn regress(&mut self, image: &RgbImage, face: &FaceRect) -> Result<Landmarks, LandmarkError> {
        if face.area() <= 0.0 {
            return Err(LandmarkError::EmptyFace);
        }

        let roi = face_crop_box(face, FACE_CROP_SCALE);
        let crop = crop_with_padding(image, &roi);
        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        denormalize_landmarks(raw, &roi, crop.width() as f32, crop.height() as f32)
    }
}

/// Map crop-normalized `(x, y)` pairs back to image coordinates.
///
/// The crop origin is the rounded ROI corner, matching `crop_with_padding`.
pub fn denormalize_landmarks(
    raw: &[f32],
    roi: &RoiBox,
    crop_width: f32,
    crop_height: f32,
) -> Result<Landmarks, LandmarkError> {
    if raw.len() != LANDMARK_COUNT * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            LANDMARK_COUNT * 2,
            raw.len()
        )));
    }

    let origin_x = round_half_even(roi.x0) as f32;
    let origin_y = round_half_even(roi.y0) as f32;
    Ok(raw
        .chunks_exact(2)
        .map(|p| (origin_x + p[0] * crop_width, origin_y + p[1] * crop_height))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_crop_box_is_square_and_centered() {
        let face = FaceRect {
            x: 10.0,
            y: 20.0,
            width: 40.0,
            height: 20.0,
            confidence: 1.0,
        };
        let roi = face_crop_box(&face, 1.5);
        assert_eq!(roi.x1 - roi.x0, 60.0);
        assert_eq!(roi.y1 - roi.y0, 60.0);
        assert_eq!((roi.x0 + roi.x1) / 2.0, 30.0);
        assert_eq!((roi.y0 + roi.y1) / 2.0, 30.0);
    }

    #[test]
    fn test_roi_from_landmarks_geometry() {
        // bbox 100..140 x 50..70 -> center (120, 60), radius 20, square side 40,
        // diagonal 40 * sqrt(2)
        let pts = [(100.0, 50.0), (140.0, 70.0), (120.0, 60.0)];
        let roi = roi_box_from_landmarks(&pts).unwrap();
        let side = 40.0f32 * 2.0f32.sqrt();
        assert!((roi.x1 - roi.x0 - side).abs() < 1e-4);
        assert!((roi.y1 - roi.y0 - side).abs() < 1e-4);
        assert!(((roi.x0 + roi.x1) / 2.0 - 120.0).abs() < 1e-4);
        assert!(((roi.y0 + roi.y1) / 2.0 - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_roi_from_empty_landmarks() {
        assert!(roi_box_from_landmarks(&[]).is_none());
    }

    #[test]
    fn test_denormalize_maps_to_image() {
        let roi = RoiBox {
            x0: 9.6,
            y0: 20.2,
            x1: 109.6,
            y1: 120.2,
        };
        let mut raw = vec![0.0f32; LANDMARK_COUNT * 2];
        raw[0] = 0.5;
        raw[1] = 0.25;
        let pts = denormalize_landmarks(&raw, &roi, 100.0, 100.0).unwrap();
        assert_eq!(pts.len(), LANDMARK_COUNT);
        assert_eq!(pts[0], (60.0, 45.0));
        assert_eq!(pts[1], (10.0, 20.0));
    }

    #[test]
    fn test_denormalize_rejects_wrong_length() {
        let roi = RoiBox {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        };
        let err = denormalize_landmarks(&[0.0; 10], &roi, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, LandmarkError::InferenceFailed(_)));
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = RgbImage::new(80, 80);
        let tensor = OnnxLandmarkRegressor::preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = OnnxLandmarkRegressor::load("/nonexistent/surfeval/landmarks.onnx", 1)
            .err()
            .unwrap();
        assert!(matches!(err, LandmarkError::ModelNotFound(_)));
    }
}
