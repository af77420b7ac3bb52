use crate::types::RoiBox;
use image::RgbImage;

/// Round to the nearest integer, ties to even.
pub fn round_half_even(v: f32) -> i64 {
    let t = v.trunc();
    if (v - t).abs() == 0.5 && (t as i64) % 2 == 0 {
        t as i64
    } else {
        v.round() as i64
    }
}

/// Integer bounds of a ROI after rounding: `(sx, sy, ex, ey)`.
pub fn rounded_bounds(roi: &RoiBox) -> (i64, i64, i64, i64) {
    (
        round_half_even(roi.x0),
        round_half_even(roi.y0),
        round_half_even(roi.x1),
        round_half_even(roi.y1),
    )
}

/// Crop `roi` out of `image`. Parts of the ROI outside the image are black.
pub fn crop_with_padding(image: &RgbImage, roi: &RoiBox) -> RgbImage {
    let (sx, sy, ex, ey) = rounded_bounds(roi);
    let dw = (ex - sx).max(0);
    let dh = (ey - sy).max(0);
    let mut out = RgbImage::new(dw as u32, dh as u32);

    let (w, h) = (image.width() as i64, image.height() as i64);
    let x_start = sx.max(0);
    let y_start = sy.max(0);
    let x_end = ex.min(w);
    let y_end = ey.min(h);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let pixel = *image.get_pixel(x as u32, y as u32);
            out.put_pixel((x - sx) as u32, (y - sy) as u32, pixel);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 7]))
    }

    #[test]
    fn test_crop_inside_image() {
        let img = gradient(20, 20);
        let roi = RoiBox {
            x0: 2.0,
            y0: 3.0,
            x1: 8.0,
            y1: 10.0,
        };
        let crop = crop_with_padding(&img, &roi);
        assert_eq!(crop.dimensions(), (6, 7));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([2, 3, 7]));
        assert_eq!(crop.get_pixel(5, 6), &Rgb([7, 9, 7]));
    }

    #[test]
    fn test_crop_pads_outside_regions() {
        let img = gradient(10, 10);
        let roi = RoiBox {
            x0: -2.0,
            y0: -1.0,
            x1: 4.0,
            y1: 12.0,
        };
        let crop = crop_with_padding(&img, &roi);
        assert_eq!(crop.dimensions(), (6, 13));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(crop.get_pixel(2, 1), &Rgb([0, 0, 7]));
        assert_eq!(crop.get_pixel(5, 10), &Rgb([3, 9, 7]));
        // Rows below the image stay black
        assert_eq!(crop.get_pixel(3, 12), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_rounds_bounds() {
        let img = gradient(10, 10);
        let roi = RoiBox {
            x0: 1.4,
            y0: 1.6,
            x1: 5.7,
            y1: 5.2,
        };
        // (1, 2) .. (6, 5)
        let crop = crop_with_padding(&img, &roi);
        assert_eq!(crop.dimensions(), (5, 3));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([1, 2, 7]));
    }

    #[test]
    fn test_crop_bounds_round_ties_to_even() {
        let roi = RoiBox {
            x0: 2.5,
            y0: -0.5,
            x1: 7.5,
            y1: -3.5,
        };
        assert_eq!(rounded_bounds(&roi), (2, 0, 8, -4));

        let img = gradient(10, 10);
        let roi = RoiBox {
            x0: 1.5,
            y0: 0.0,
            x1: 4.5,
            y1: 2.0,
        };
        // (2, 0) .. (4, 2)
        let crop = crop_with_padding(&img, &roi);
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([2, 0, 7]));
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.5), 0);
        assert_eq!(round_half_even(1.5), 2);
        assert_eq!(round_half_even(2.5), 2);
        assert_eq!(round_half_even(-2.5), -2);
        assert_eq!(round_half_even(-1.5), -2);
        assert_eq!(round_half_even(2.4), 2);
        assert_eq!(round_half_even(2.6), 3);
    }

    #[test]
    fn test_crop_fully_outside_is_black() {
        let img = gradient(5, 5);
        let roi = RoiBox {
            x0: 10.0,
            y0: 10.0,
            x1: 13.0,
            y1: 12.0,
        };
        let crop = crop_with_padding(&img, &roi);
        assert_eq!(crop.dimensions(), (3, 2));
        assert!(crop.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
