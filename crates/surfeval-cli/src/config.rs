use std::path::PathBuf;

use surfeval_core::detector::{DEFAULT_NMS_THRESHOLD, DEFAULT_SCORE_THRESHOLD};
use surfeval_models::{DEPTH_RECONSTRUCTOR, FACE_DETECTOR, LANDMARK_REGRESSOR};

const DEFAULT_MODEL_DIR: &str = "face_segmentation/models";

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the detector, landmark and depth ONNX models.
    pub model_dir: PathBuf,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Minimum face score kept by the detector.
    pub detector_score_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub detector_nms_threshold: f32,
    /// Whether model files are checked for presence and sidecar digests before loading.
    pub verify_models: bool,
}

impl Config {
    /// Load configuration from `SURFEVAL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed_f32 = |key: &str, default: f32| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            model_dir: lookup("SURFEVAL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            intra_threads: lookup("SURFEVAL_INTRA_THREADS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(2),
            detector_score_threshold: parsed_f32(
                "SURFEVAL_DETECTOR_SCORE_THRESHOLD",
                DEFAULT_SCORE_THRESHOLD,
            ),
            detector_nms_threshold: parsed_f32(
                "SURFEVAL_DETECTOR_NMS_THRESHOLD",
                DEFAULT_NMS_THRESHOLD,
            ),
            verify_models: lookup("SURFEVAL_VERIFY_MODELS")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_path(FACE_DETECTOR.name)
    }

    /// Path to the 68-point landmark model.
    pub fn landmark_model_path(&self) -> String {
        self.model_path(LANDMARK_REGRESSOR.name)
    }

    /// Path to the dense depth model.
    pub fn depth_model_path(&self) -> String {
        self.model_path(DEPTH_RECONSTRUCTOR.name)
    }

    fn model_path(&self, name: &str) -> String {
        self.model_dir.join(name).to_string_lossy().into_owned()
    }
}
