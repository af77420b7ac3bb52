//! surfeval-core: anti-spoofing evaluation engine.
//!
//! Computes APCER / BPCER / ACER for a binary liveness classifier over a
//! CASIA-SURF protocol split, and runs single-image inference through a
//! detector, landmark regressor and dense depth reconstructor. Every model
//! is an ONNX graph run via ONNX Runtime, hidden behind a trait so the loop
//! and the pipeline can be driven by stubs.

pub mod classifier;
pub mod crop;
pub mod dataset;
pub mod depth;
pub mod detector;
pub mod evaluate;
pub mod landmarks;
pub mod metrics;
pub mod pipeline;
pub mod transform;
pub mod types;

pub use classifier::{Classifier, OnnxClassifier};
pub use dataset::{CasiaSurfDataset, DataLoader, Mode};
pub use depth::{DepthMask, DepthReconstructor, OnnxDepthReconstructor};
pub use detector::{FaceDetector, OnnxFaceDetector};
pub use evaluate::{evaluate, EvalReport};
pub use landmarks::{LandmarkRegressor, OnnxLandmarkRegressor};
pub use metrics::{ConfusionCounts, Metrics};
pub use pipeline::{FaceVerdict, SingleImagePipeline};
pub use transform::EvalTransform;
pub use types::{Batch, ErrorRecord, FaceRect, Landmarks, Sample};
