//! Classifier input preprocessing.
//!
//! Non-zero crop, shorter-side resize, center crop, then conversion to a CHW
//! float tensor in [0, 1]. Images produced by the depth-masking pipeline have
//! black borders around the face, which the non-zero crop removes before the
//! geometry steps.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;

const DEFAULT_RESIZE: u32 = 256;
const DEFAULT_CROP: u32 = 224;

/// Preprocessing applied to every image before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalTransform {
    /// Target length of the shorter edge after resizing.
    pub resize: u32,
    /// Side of the square center crop.
    pub crop: u32,
}

impl Default for EvalTransform {
    fn default() -> Self {
        Self {
            resize: DEFAULT_RESIZE,
            crop: DEFAULT_CROP,
        }
    }
}

impl EvalTransform {
    pub fn apply(&self, image: &RgbImage) -> Array3<f32> {
        let cropped = non_zero_crop(image);
        let resized = resize_shorter_side(&cropped, self.resize);
        let centered = center_crop(&resized, self.crop);
        to_tensor(&centered)
    }
}

/// Crop to the bounding box of pixels with any nonzero channel.
///
/// An all-black image is returned unchanged.
pub fn non_zero_crop(image: &RgbImage) -> RgbImage {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0.iter().all(|&c| c == 0) {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bounds {
        Some((x0, y0, x1, y1)) => {
            imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        None => image.clone(),
    }
}

/// Resize so the shorter edge equals `size`, keeping the aspect ratio.
///
/// The longer edge is truncated, not rounded.
pub fn resize_shorter_side(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let (new_w, new_h) = if w <= h {
        (size, (size as u64 * h as u64 / w as u64) as u32)
    } else {
        ((size as u64 * w as u64 / h as u64) as u32, size)
    };

    if (new_w, new_h) == (w, h) {
        return image.clone();
    }

    imageops::resize(image, new_w.max(1), new_h.max(1), FilterType::Triangle)
}

/// Take a centered `size`x`size` crop, zero-padding images that are smaller.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();

    let padded;
    let source = if w < size || h < size {
        let pw = w.max(size);
        let ph = h.max(size);
        let mut canvas = RgbImage::new(pw, ph);
        imageops::replace(
            &mut canvas,
            image,
            ((pw - w) / 2) as i64,
            ((ph - h) / 2) as i64,
        );
        padded = canvas;
        &padded
    } else {
        image
    };

    let (w, h) = source.dimensions();
    let top = half_offset(h - size);
    let left = half_offset(w - size);
    imageops::crop_imm(source, left, top, size, size).to_image()
}

/// `d / 2` rounded half to even, so a 117-pixel margin starts the crop at 58.
fn half_offset(d: u32) -> u32 {
    if d % 4 == 1 {
        d / 2
    } else {
        (d + 1) / 2
    }
}

/// Convert an RGB image to a CHW tensor scaled to [0, 1].
pub fn to_tensor(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array3::<f32>::zeros((3, h as usize, w as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
        }
    }

    tensor
}

/// Convert a CHW tensor in [0, 1] back to an RGB image. Values are clamped.
pub fn to_image(tensor: &Array3<f32>) -> RgbImage {
    let (_, h, w) = tensor.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let channel = |c: usize| (tensor[[c, y, x]].clamp(0.0, 1.0) * 255.0).round() as u8;
        image::Rgb([channel(0), channel(1), channel(2)])
    })
}
