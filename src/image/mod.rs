//! Pixel buffers for tile registration.
//!
//! All correlation work happens on `f32` grayscale buffers. `ImageView` is
//! a borrowed 2D view into a 1D slice with an explicit stride, so overlap
//! ROIs are zero-copy slices of the cached tile buffers. Tiles of any bit
//! depth are converted to `f32` once, when the tile source decodes them.

use std::path::Path;

use crate::util::{StitchError, StitchResult};

pub(crate) mod resample;

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed grayscale `f32` view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> ImageView<'a> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [f32], width: usize, height: usize) -> StitchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [f32], width: usize, height: usize, stride: usize) -> StitchResult<Self> {
        if width == 0 || height == 0 {
            return Err(StitchError::InvalidDimensions { width, height });
        }
        if stride < width {
            return Err(StitchError::InvalidStride { width, stride });
        }
        let needed = (height - 1) * stride + width;
        if data.len() < needed {
            return Err(StitchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [f32]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> StitchResult<ImageView<'a>> {
        if width == 0 || height == 0 {
            return Err(StitchError::InvalidDimensions { width, height });
        }
        if x + width > self.width || y + height > self.height {
            return Err(StitchError::RoiOutOfBounds {
                x,
                y,
                width,
                height,
                img_width: self.width,
                img_height: self.height,
            });
        }
        ImageView::new(&self.data[y * self.stride + x..], width, height, self.stride)
    }

    /// Symmetric center crop, clamped to the view size.
    ///
    /// Requesting a crop at least as large as the view returns the view
    /// itself, so this never fails.
    pub fn center_crop(&self, crop_width: usize, crop_height: usize) -> ImageView<'a> {
        let w = crop_width.min(self.width).max(1);
        let h = crop_height.min(self.height).max(1);
        let x = (self.width - w) / 2;
        let y = (self.height - h) / 2;
        ImageView {
            data: &self.data[y * self.stride + x..],
            width: w,
            height: h,
            stride: self.stride,
        }
    }
}

/// Owned contiguous grayscale `f32` image.
#[derive(Clone, Debug)]
pub struct OwnedImage {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> StitchResult<Self> {
        if width == 0 || height == 0 {
            return Err(StitchError::InvalidDimensions { width, height });
        }
        let needed = width * height;
        if data.len() != needed {
            return Err(StitchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns a borrowed view of the whole image.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

/// Decodes tile pixel buffers on demand.
///
/// Implementations must be shareable across the solver worker threads; the
/// scan set handles per-tile caching, so `load` is called at most a handful
/// of times per tile.
pub trait TileSource: Sync {
    fn load(&self, path: &Path) -> StitchResult<OwnedImage>;
}
