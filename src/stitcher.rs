//! Mean-blend canvas assembly.
//!
//! Places every tile's center crop at its solved position on a decimated
//! canvas, averages overlapped regions by per-pixel coverage counts, and
//! encodes a 16-bit grayscale result. Tiles are evicted as soon as they
//! have been blended, so peak memory stays near one tile plus the canvas.

use std::path::Path;

use crate::geom::{Point2i, Size2i};
use crate::image::{resample::downscale, TileSource};
use crate::scanset::ScanSet;
use crate::sink::{EventSink, LogLevel, ProgressStep};
use crate::util::{StitchError, StitchResult};

/// Assembles the stitched canvas and writes it to `path`.
///
/// `crop_size` must match the crop used during overlap measurement so the
/// committed positions line up; `decimate` reduces the output resolution
/// by that factor.
pub fn compose_canvas(
    set: &mut ScanSet,
    source: &dyn TileSource,
    sink: &dyn EventSink,
    path: &Path,
    crop_size: Size2i,
    decimate: i32,
) -> StitchResult<()> {
    if set.grid_width() == 0 {
        return Err(StitchError::GridNotGenerated);
    }
    if decimate < 1 || crop_size.width <= 0 || crop_size.height <= 0 {
        return Err(StitchError::InvalidConfig {
            reason: "compose_canvas needs decimate >= 1 and a positive crop size",
        });
    }

    let crop = Point2i::new(crop_size.width, crop_size.height);
    let out_size = (set.stitch_rect.br() + crop + Point2i::new(1, 1) - set.stitch_rect.tl()) / decimate;
    let (out_w, out_h) = (out_size.x.max(1) as usize, out_size.y.max(1) as usize);
    sink.log(
        LogLevel::Info,
        &format!(
            "stitcher: assembling {out_w} x {out_h} canvas ({decimate} times reduced resolution)"
        ),
    );

    let mut accum = vec![0.0f64; out_w * out_h];
    let mut counts = vec![0u32; out_w * out_h];
    let width = set.grid_width() as i32;
    let height = set.grid_height() as i32;
    let total = (width * height) as usize;
    let origin = set.stitch_rect.tl();

    for x in 0..width {
        for y in 0..height {
            let done = (x * height + y) as usize;
            sink.progress(
                ProgressStep::Composite,
                done,
                total,
                &format!("stitching tile {x},{y}"),
            );

            let placed = {
                let tile = set.tile_at(x, y)?;
                let img = tile.image(source)?;
                let cropped = img
                    .view()
                    .center_crop(crop_size.width as usize, crop_size.height as usize);
                let scaled = downscale(cropped, decimate);
                let at = (tile.stitch_pos - origin).max(Point2i::ZERO) / decimate;
                (scaled, at)
            };
            let (scaled, at) = placed;

            for sy in 0..scaled.height() {
                let oy = at.y as usize + sy;
                if oy >= out_h {
                    break;
                }
                let row = scaled.view().row(sy).expect("row in bounds");
                for (sx, &value) in row.iter().enumerate() {
                    let ox = at.x as usize + sx;
                    if ox >= out_w {
                        break;
                    }
                    let idx = oy * out_w + ox;
                    accum[idx] += f64::from(value);
                    counts[idx] += 1;
                }
            }
            set.tile_at_mut(x, y)?.evict();
        }
    }

    sink.log(LogLevel::Info, "stitcher: averaging overlapped areas");
    let mut pixels = Vec::with_capacity(out_w * out_h);
    for (sum, count) in accum.into_iter().zip(counts) {
        let value = if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        };
        pixels.push(value.clamp(0.0, f64::from(u16::MAX)) as u16);
    }

    sink.log(
        LogLevel::Info,
        &format!("stitcher: encoding result into \"{}\"", path.display()),
    );
    let buffer = image::ImageBuffer::<image::Luma<u16>, _>::from_raw(
        out_w as u32,
        out_h as u32,
        pixels,
    )
    .ok_or(StitchError::InvalidDimensions {
        width: out_w,
        height: out_h,
    })?;
    buffer.save(path).map_err(|err| StitchError::DocumentIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    sink.progress(ProgressStep::Composite, total, total, "encoded output file");
    Ok(())
}
