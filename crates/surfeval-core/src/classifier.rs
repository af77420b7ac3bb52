//! Liveness classifier via ONNX Runtime.
//!
//! The classifier is a ResNet-style network exported to ONNX, taking an
//! `N x 3 x 224 x 224` batch in [0, 1] and returning one raw score per class.

use ndarray::{Array2, Array4, ArrayView1};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("classifier returned {got} classes, expected {expected}")]
    ClassCountMismatch { expected: usize, got: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps an image batch to per-class scores, one row per image.
pub trait Classifier {
    fn classify(&mut self, images: &Array4<f32>) -> Result<Array2<f32>, ClassifierError>;
}

/// Index of the highest score. Ties resolve to the first index.
pub fn argmax(scores: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax of one score row.
pub fn softmax(scores: ArrayView1<f32>) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// ONNX-backed two-class liveness classifier.
pub struct OnnxClassifier {
    session: Session,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Load the exported classifier from `model_path`.
    pub fn load(
        model_path: &str,
        num_classes: usize,
        intra_threads: usize,
    ) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::CheckpointNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            num_classes,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded liveness classifier"
        );

        Ok(Self {
            session,
            num_classes,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&mut self, images: &Array4<f32>) -> Result<Array2<f32>, ClassifierError> {
        let batch = images.shape()[0];
        let input = images.as_standard_layout();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("score extraction: {e}")))?;

        if batch == 0 || raw.len() % batch != 0 {
            return Err(ClassifierError::InferenceFailed(format!(
                "{} scores cannot be split across {batch} images",
                raw.len()
            )));
        }
        let classes = raw.len() / batch;
        if classes != self.num_classes {
            return Err(ClassifierError::ClassCountMismatch {
                expected: self.num_classes,
                got: classes,
            });
        }

        Array2::from_shape_vec((batch, classes), raw.to_vec())
            .map_err(|e| ClassifierError::InferenceFailed(format!("score reshape: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_argmax_picks_largest() {
        assert_eq!(argmax(arr1(&[0.1, 2.0, -1.0]).view()), 1);
    }

    #[test]
    fn test_argmax_tie_prefers_first() {
        assert_eq!(argmax(arr1(&[0.5, 0.5]).view()), 0);
        assert_eq!(argmax(arr1(&[-1.0, 3.0, 3.0]).view()), 1);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(arr1(&[1.0, 2.0, 3.0]).view());
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_softmax_handles_large_scores() {
        let p = softmax(arr1(&[1000.0, 1000.0]).view());
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!(p.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_load_reports_missing_checkpoint() {
        let err = OnnxClassifier::load("/nonexistent/surfeval/classifier.onnx", 2, 1)
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::CheckpointNotFound(_)));
    }
}
