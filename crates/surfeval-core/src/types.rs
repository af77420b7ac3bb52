use ndarray::{Array3, Array4};
use serde::Serialize;
use std::path::PathBuf;

/// Label of a bona fide (live) presentation.
pub const LABEL_LIVE: u8 = 1;
/// Label of an attack (spoof) presentation.
pub const LABEL_SPOOF: u8 = 0;

/// A single preprocessed dataset sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// CHW image tensor, values in [0, 1].
    pub image: Array3<f32>,
    pub label: u8,
    pub source: PathBuf,
}

/// A batch of samples stacked into one NCHW tensor.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<u8>,
    pub sources: Vec<PathBuf>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Axis-aligned face rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another rectangle.
    pub fn iou(&self, other: &FaceRect) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Facial landmark points `(x, y)` in image pixel coordinates.
pub type Landmarks = Vec<(f32, f32)>;

/// Square region of interest `[x0, y0, x1, y1]`, possibly extending past the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A sample the classifier got wrong, kept for inspection.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub image: Array3<f32>,
    pub label: u8,
    pub predicted: usize,
    /// Softmax probability of the predicted class.
    pub probability: f32,
    pub source: PathBuf,
}
