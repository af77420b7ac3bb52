//! Face detector via ONNX Runtime.
//!
//! Expects an UltraFace-style graph: a 320x240 RGB input normalized with
//! `(p - 127) / 128`, a `scores` output of shape `[1, N, 2]` (background,
//! face) and a `boxes` output of shape `[1, N, 4]` holding normalized corner
//! coordinates.

use crate::types::FaceRect;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_WIDTH: u32 = 320;
const DETECTOR_INPUT_HEIGHT: u32 = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds faces in an image.
pub trait FaceDetector {
    /// Detect faces, sorted by confidence (highest first).
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRect>, DetectorError>;
}

/// ONNX-backed face detector.
pub struct OnnxFaceDetector {
    session: Session,
    score_threshold: f32,
    nms_threshold: f32,
}

impl OnnxFaceDetector {
    /// Load the detector ONNX model from the given path.
    pub fn load(
        model_path: &str,
        score_threshold: f32,
        nms_threshold: f32,
        intra_threads: usize,
    ) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            score_threshold,
            nms_threshold,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face detector"
        );

        Ok(Self {
            session,
            score_threshold,
            nms_threshold,
        })
    }

    /// Resize to the network input and convert to a normalized NCHW tensor.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let resized = imageops::resize(
            image,
            DETECTOR_INPUT_WIDTH,
            DETECTOR_INPUT_HEIGHT,
            FilterType::Triangle,
        );
        let (w, h) = (DETECTOR_INPUT_WIDTH as usize, DETECTOR_INPUT_HEIGHT as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, h, w));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
            }
        }

        tensor
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRect>, DetectorError> {
        let input = Self::preprocess(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        if outputs.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "expected scores and boxes outputs, got {}",
                outputs.len()
            )));
        }

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let (width, height) = image.dimensions();
        let candidates = decode_detections(
            scores,
            boxes,
            width as f32,
            height as f32,
            self.score_threshold,
        )?;
        let faces = non_max_suppression(candidates, self.nms_threshold);

        tracing::debug!(faces = faces.len(), "detection complete");
        Ok(faces)
    }
}

/// Turn raw `[N, 2]` scores and `[N, 4]` normalized corner boxes into pixel rects.
pub fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    width: f32,
    height: f32,
    score_threshold: f32,
) -> Result<Vec<FaceRect>, DetectorError> {
    if scores.len() % 2 != 0 || boxes.len() % 4 != 0 || scores.len() / 2 != boxes.len() / 4 {
        return Err(DetectorError::InferenceFailed(format!(
            "score/box length mismatch: {} scores, {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let faces = scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(s, _)| s[1] > score_threshold)
        .map(|(s, b)| {
            let x0 = (b[0] * width).clamp(0.0, width);
            let y0 = (b[1] * height).clamp(0.0, height);
            let x1 = (b[2] * width).clamp(0.0, width);
            let y1 = (b[3] * height).clamp(0.0, height);
            FaceRect {
                x: x0,
                y: y0,
                width: (x1 - x0).max(0.0),
                height: (y1 - y0).max(0.0),
                confidence: s[1],
            }
        })
        .collect();

    Ok(faces)
}

/// Greedy non-maximum suppression. Output is sorted by confidence, highest first.
pub fn non_max_suppression(mut faces: Vec<FaceRect>, iou_threshold: f32) -> Vec<FaceRect> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceRect> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.iou(&face) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}
