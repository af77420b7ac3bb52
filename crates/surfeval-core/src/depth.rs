//! Dense face depth and the binary mask derived from it.
//!
//! The reconstructor crops the landmark ROI, resizes it to 120x120 and runs
//! a dense-depth graph that outputs a `[1, 1, 120, 120]` depth map. The map
//! is resized back onto the ROI and pasted into a full-size mask; every
//! pixel with positive depth belongs to the face surface.

use crate::crop::{crop_with_padding, rounded_bounds};
use crate::landmarks::roi_box_from_landmarks;
use crate::types::{Landmarks, RoiBox};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DEPTH_INPUT_SIZE: u32 = 120;
const DEPTH_MEAN: f32 = 127.5;
const DEPTH_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum DepthError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("no landmarks to derive a region of interest from")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Per-pixel face membership for a full image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl DepthMask {
    /// A mask with no face pixels.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = value;
        }
    }

    /// Number of face pixels.
    pub fn coverage(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Mark pixels inside `roi` whose depth is positive.
    ///
    /// `depth` covers the rounded ROI and is resized to it; parts of the ROI
    /// outside the mask bounds are dropped.
    pub fn paste_depth(&mut self, roi: &RoiBox, depth: &ImageBuffer<Luma<f32>, Vec<f32>>) {
        let (sx, sy, ex, ey) = rounded_bounds(roi);
        let (dw, dh) = ((ex - sx).max(0) as u32, (ey - sy).max(0) as u32);
        if dw == 0 || dh == 0 {
            return;
        }

        let resized = imageops::resize(depth, dw, dh, FilterType::Triangle);
        for (x, y, value) in resized.enumerate_pixels() {
            let ix = sx + x as i64;
            let iy = sy + y as i64;
            if ix < 0 || iy < 0 || value.0[0] <= 0.0 {
                continue;
            }
            self.set(ix as u32, iy as u32, true);
        }
    }
}

/// Zero every pixel outside the mask. The mask must match the image size.
pub fn apply_mask(image: &RgbImage, mask: &DepthMask) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        if mask.get(x, y) {
            *image.get_pixel(x, y)
        } else {
            image::Rgb([0, 0, 0])
        }
    })
}

/// Produces a face-surface mask from landmarks.
pub trait DepthReconstructor {
    fn reconstruct_depth_mask(
        &mut self,
        image: &RgbImage,
        landmarks: &Landmarks,
    ) -> Result<DepthMask, DepthError>;
}

/// ONNX-backed dense depth reconstructor.
pub struct OnnxDepthReconstructor {
    session: Session,
}

impl OnnxDepthReconstructor {
    /// Load the depth ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, DepthError> {
        if !Path::new(model_path).exists() {
            return Err(DepthError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded depth reconstructor");
        Ok(Self { session })
    }

    /// Resize the ROI crop to 120x120 and normalize with `(p - 127.5) / 128`.
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let resized = imageops::resize(
            crop,
            DEPTH_INPUT_SIZE,
            DEPTH_INPUT_SIZE,
            FilterType::Triangle,
        );
        let size = DEPTH_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - DEPTH_MEAN) / DEPTH_STD;
            }
        }
        tensor
    }
}

impl DepthReconstructor for OnnxDepthReconstructor {
    fn reconstruct_depth_mask(
        &mut self,
        image: &RgbImage,
        landmarks: &Landmarks,
    ) -> Result<DepthMask, DepthError> {
        let roi = roi_box_from_landmarks(landmarks).ok_or(DepthError::NoLandmarks)?;
        let crop = crop_with_padding(image, &roi);
        if crop.width() == 0 || crop.height() == 0 {
            return Ok(DepthMask::empty(image.width(), image.height()));
        }
        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DepthError::InferenceFailed(format!("depth extraction: {e}")))?;

        let depth = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(
            DEPTH_INPUT_SIZE,
            DEPTH_INPUT_SIZE,
            raw.to_vec(),
        )
        .ok_or_else(|| {
            DepthError::InferenceFailed(format!(
                "expected {}x{} depth map, got {} values",
                DEPTH_INPUT_SIZE,
                DEPTH_INPUT_SIZE,
                raw.len()
            ))
        })?;

        let mut mask = DepthMask::empty(image.width(), image.height());
        mask.paste_depth(&roi, &depth);

        tracing::debug!(coverage = mask.coverage(), "depth mask reconstructed");
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_apply_mask_zeroes_outside() {
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut mask = DepthMask::empty(4, 3);
        mask.set(1, 1, true);
        mask.set(3, 2, true);
        let out = apply_mask(&img, &mask);
        assert_eq!(out.get_pixel(1, 1), &Rgb([10, 20, 30]));
        assert_eq!(out.get_pixel(3, 2), &Rgb([10, 20, 30]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.pixels().filter(|p| p.0 != [0, 0, 0]).count(), 2);
    }

    #[test]
    fn test_mask_bounds_are_safe() {
        let mut mask = DepthMask::empty(2, 2);
        mask.set(5, 5, true);
        assert!(!mask.get(5, 5));
        assert_eq!(mask.coverage(), 0);
    }

    #[test]
    fn test_paste_positive_depth() {
        let mut mask = DepthMask::empty(10, 10);
        let depth = ImageBuffer::<Luma<f32>, Vec<f32>>::from_pixel(4, 4, Luma([1.0]));
        let roi = RoiBox {
            x0: 2.0,
            y0: 3.0,
            x1: 6.0,
            y1: 7.0,
        };
        mask.paste_depth(&roi, &depth);
        assert_eq!(mask.coverage(), 16);
        assert!(mask.get(2, 3));
        assert!(mask.get(5, 6));
        assert!(!mask.get(6, 7));
    }

    #[test]
    fn test_paste_clips_to_image() {
        let mut mask = DepthMask::empty(5, 5);
        let depth = ImageBuffer::<Luma<f32>, Vec<f32>>::from_pixel(4, 4, Luma([2.0]));
        let roi = RoiBox {
            x0: -2.0,
            y0: -2.0,
            x1: 2.0,
            y1: 2.0,
        };
        mask.paste_depth(&roi, &depth);
        assert_eq!(mask.coverage(), 4);
        assert!(mask.get(0, 0) && mask.get(1, 1));
    }

    #[test]
    fn test_paste_ignores_zero_depth() {
        let mut mask = DepthMask::empty(6, 6);
        let depth = ImageBuffer::<Luma<f32>, Vec<f32>>::from_pixel(3, 3, Luma([0.0]));
        let roi = RoiBox {
            x0: 0.0,
            y0: 0.0,
            x1: 3.0,
            y1: 3.0,
        };
        mask.paste_depth(&roi, &depth);
        assert_eq!(mask.coverage(), 0);
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = RgbImage::new(50, 50);
        let tensor = OnnxDepthReconstructor::preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 120, 120]);
        assert!((tensor[[0, 0, 0, 0]] + DEPTH_MEAN / DEPTH_STD).abs() < 1e-6);
    }

    #[test]
    fn test_load_missing_model() {
        let err = OnnxDepthReconstructor::load("/nonexistent/surfeval/depth.onnx", 1)
            .err()
            .unwrap();
        assert!(matches!(err, DepthError::ModelNotFound(_)));
    }
}
