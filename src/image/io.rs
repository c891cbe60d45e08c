//! Filesystem tile source backed by the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Decodes any supported
//! bit depth and converts to grayscale `f32` in the sample's native range
//! (8-bit sources yield 0..=255, 16-bit sources 0..=65535).

use std::path::Path;

use image::DynamicImage;

use super::{OwnedImage, TileSource};
use crate::util::{StitchError, StitchResult};

/// Loads tile images straight from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTileSource;

impl TileSource for FsTileSource {
    fn load(&self, path: &Path) -> StitchResult<OwnedImage> {
        let img = image::open(path).map_err(|err| StitchError::ImageLoad {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        owned_from_dynamic(&img, path)
    }
}

fn owned_from_dynamic(img: &DynamicImage, path: &Path) -> StitchResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data: Vec<f32> = match img {
        DynamicImage::ImageLuma16(gray) => gray.as_raw().iter().map(|&v| f32::from(v)).collect(),
        DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => {
            let gray = img.to_luma16();
            gray.as_raw().iter().map(|&v| f32::from(v)).collect()
        }
        _ => {
            let gray = img.to_luma8();
            gray.as_raw().iter().map(|&v| f32::from(v)).collect()
        }
    };
    OwnedImage::from_vec(data, width, height).map_err(|_| StitchError::ImageLoad {
        path: path.display().to_string(),
        reason: "decoded image has no pixels".to_string(),
    })
}
