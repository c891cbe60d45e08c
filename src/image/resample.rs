//! Bilinear downscaling for the coarse search levels.
//!
//! Sampling uses pixel-center alignment: destination pixel `d` reads the
//! source at `(d + 0.5) * factor - 0.5`, clamped to the image, so decimated
//! levels stay registered with the full-resolution image.

use super::{ImageView, OwnedImage};

/// Downscales a view by an integer factor with bilinear interpolation.
///
/// The destination size is the rounded quotient, never below one pixel.
pub(crate) fn downscale(src: ImageView<'_>, factor: i32) -> OwnedImage {
    debug_assert!(factor >= 1);
    let f = factor as f64;
    let dst_width = ((src.width() as f64 / f).round() as usize).max(1);
    let dst_height = ((src.height() as f64 / f).round() as usize).max(1);

    let mut data = Vec::with_capacity(dst_width * dst_height);
    for dy in 0..dst_height {
        let sy = ((dy as f64 + 0.5) * f - 0.5).clamp(0.0, (src.height() - 1) as f64);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(src.height() - 1);
        let fy = (sy - y0 as f64) as f32;
        let row0 = src.row(y0).expect("row y0 within bounds");
        let row1 = src.row(y1).expect("row y1 within bounds");
        for dx in 0..dst_width {
            let sx = ((dx as f64 + 0.5) * f - 0.5).clamp(0.0, (src.width() - 1) as f64);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(src.width() - 1);
            let fx = (sx - x0 as f64) as f32;

            let top = row0[x0] * (1.0 - fx) + row0[x1] * fx;
            let bottom = row1[x0] * (1.0 - fx) + row1[x1] * fx;
            data.push(top * (1.0 - fy) + bottom * fy);
        }
    }

    OwnedImage::from_vec(data, dst_width, dst_height).expect("sized buffer")
}

#[cfg(test)]
mod tests {
    use super::downscale;
    use crate::image::OwnedImage;

    #[test]
    fn factor_one_is_identity() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let img = OwnedImage::from_vec(data.clone(), 4, 3).unwrap();
        let out = downscale(img.view(), 1);
        assert_eq!((out.width(), out.height()), (4, 3));
        assert_eq!(out.as_slice(), data.as_slice());
    }

    #[test]
    fn halves_dimensions_and_averages() {
        let img = OwnedImage::from_vec(vec![0.0, 2.0, 4.0, 6.0], 2, 2).unwrap();
        let out = downscale(img.view(), 2);
        assert_eq!((out.width(), out.height()), (1, 1));
        assert!((out.as_slice()[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn constant_image_stays_constant() {
        let img = OwnedImage::from_vec(vec![7.5; 64 * 48], 64, 48).unwrap();
        let out = downscale(img.view(), 4);
        assert_eq!((out.width(), out.height()), (16, 12));
        assert!(out.as_slice().iter().all(|&v| (v - 7.5).abs() < 1e-5));
    }
}
