//! Stage-to-image calibration.
//!
//! The preferred path fits the full 2×3 affine map from one anchor tile
//! and its `Down`/`Right` neighbors. The legacy path treats the axes as
//! independent pixel-per-stage-unit vectors; it survives for projects
//! whose persisted calibration was produced that way.

use crate::geom::{Affine2x3, Point2d, Point2i};
use crate::image::TileSource;
use crate::scanset::{Direction, ScanSet};
use crate::sink::{EventSink, LogLevel, ProgressStep};
use crate::solver::OverlapSolver;
use crate::util::math::solve_3x3;
use crate::util::{StitchError, StitchResult};

/// Solves the exact 2×3 affine mapping the three stage-side points onto
/// the three pixel-side points.
fn affine_from_correspondences(s: [Point2d; 3], p: [Point2d; 3]) -> StitchResult<Affine2x3> {
    let a = [
        [s[0].x, s[0].y, 1.0],
        [s[1].x, s[1].y, 1.0],
        [s[2].x, s[2].y, 1.0],
    ];
    let row_x = solve_3x3(a, [p[0].x, p[1].x, p[2].x]);
    let row_y = solve_3x3(a, [p[0].y, p[1].y, p[2].y]);
    match (row_x, row_y) {
        (Some(rx), Some(ry)) => Ok(Affine2x3 { m: [rx, ry] }),
        _ => Err(StitchError::DegenerateCalibration {
            reason: "stage correspondences are collinear",
        }),
    }
}

impl OverlapSolver {
    /// Bootstraps the affine map from the anchor cell `(x, y)`.
    ///
    /// Measures the displacements to the `Down` and `Right` neighbors with
    /// the configured guess mode (typically `Fixed` for this call) and
    /// fits the map through the three correspondences. Returns the summed
    /// pair scores.
    pub fn calibrate_affine(
        &self,
        set: &mut ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
        x: i32,
        y: i32,
    ) -> StitchResult<f32> {
        let anchor = set.tile_at(x, y)?.stage_pos;
        let stage_b = set.neighbor_at(x, y, Direction::Down)?.stage_pos - anchor;
        let stage_c = set.neighbor_at(x, y, Direction::Right)?.stage_pos - anchor;

        sink.progress(ProgressStep::Calibration, 0, 3, "measuring first anchor pair");
        let (score_b, p_b) = self.solve_edge(set, source, sink, x, y, Direction::Down)?;
        sink.progress(ProgressStep::Calibration, 1, 3, "measuring second anchor pair");
        let (score_c, p_c) = self.solve_edge(set, source, sink, x, y, Direction::Right)?;

        sink.progress(ProgressStep::Calibration, 2, 3, "fitting stage to pixel map");
        let s = [Point2d::ZERO, stage_b, stage_c];
        let p = [Point2d::ZERO, p_b.to_f64(), p_c.to_f64()];
        set.affine = affine_from_correspondences(s, p)?;

        sink.progress(ProgressStep::Calibration, 3, 3, "fitted stage to pixel map");
        sink.log(LogLevel::Info, &format!("affine map: {:?}", set.affine.m));
        Ok(score_b + score_c)
    }

    /// Rebuilds the affine map from the already-solved positions of three
    /// tiles, without fresh measurements. Used to re-bootstrap a loaded
    /// project.
    pub fn affine_from_solved(
        set: &mut ScanSet,
        ta: Point2i,
        tb: Point2i,
        tc: Point2i,
    ) -> StitchResult<()> {
        let anchor = set.tile_at(ta.x, ta.y)?;
        let (stage_a, stitch_a) = (anchor.stage_pos, anchor.stitch_pos);
        let b = set.tile_at(tb.x, tb.y)?;
        let (stage_b, stitch_b) = (b.stage_pos, b.stitch_pos);
        let c = set.tile_at(tc.x, tc.y)?;
        let (stage_c, stitch_c) = (c.stage_pos, c.stitch_pos);

        let s = [Point2d::ZERO, stage_b - stage_a, stage_c - stage_a];
        let p = [
            Point2d::ZERO,
            (stitch_b - stitch_a).to_f64(),
            (stitch_c - stitch_a).to_f64(),
        ];
        set.affine = affine_from_correspondences(s, p)?;
        Ok(())
    }

    /// Legacy calibration: measures the edge from `(x, y)` in `dir` and
    /// derives the pixel-per-stage-unit vector for that axis alone.
    pub fn calibrate_axis(
        &self,
        set: &mut ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
        x: i32,
        y: i32,
        dir: Direction,
    ) -> StitchResult<f32> {
        sink.progress(ProgressStep::Calibration, 0, 1, "measuring axis vector");
        let ds = set.neighbor_at(x, y, dir)?.stage_pos - set.tile_at(x, y)?.stage_pos;
        let (score, dr) = self.solve_edge(set, source, sink, x, y, dir)?;

        if dir.is_vertical() {
            if ds.y == 0.0 {
                return Err(StitchError::DegenerateCalibration {
                    reason: "zero stage displacement along y",
                });
            }
            set.stage_to_img_y = dr.to_f64() / ds.y;
        } else {
            if ds.x == 0.0 {
                return Err(StitchError::DegenerateCalibration {
                    reason: "zero stage displacement along x",
                });
            }
            set.stage_to_img_x = dr.to_f64() / ds.x;
        }
        sink.progress(ProgressStep::Calibration, 1, 1, "measured axis vector");
        Ok(score)
    }

    /// Stage-space alignment residual per tile, row-major.
    ///
    /// Maps each tile's solved position back through the inverse affine
    /// and reports the distance to its recorded stage offset. Large values
    /// point at a poor calibration or a failed relaxation region.
    pub fn alignment_residuals(set: &ScanSet) -> StitchResult<Vec<f64>> {
        let inverse = set
            .affine
            .invert()
            .ok_or(StitchError::DegenerateCalibration {
                reason: "affine map is not invertible",
            })?;
        let width = set.grid_width() as i32;
        let height = set.grid_height() as i32;
        if width == 0 {
            return Err(StitchError::GridNotGenerated);
        }

        let stitch_origin = set.tile_at(0, 0)?.stitch_pos;
        let mut out = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let tile = set.tile_at(x, y)?;
                let back = inverse.apply((tile.stitch_pos - stitch_origin).to_f64());
                let residual = back - (tile.stage_pos - set.stage_origin);
                out.push(residual.norm());
            }
        }
        Ok(out)
    }
}

/// Seeds every tile's stitch position through the affine map:
/// `round(M · (stage - stage_origin))`.
pub fn apply_initial_grid(set: &mut ScanSet) -> StitchResult<()> {
    let width = set.grid_width() as i32;
    let height = set.grid_height() as i32;
    if width == 0 {
        return Err(StitchError::GridNotGenerated);
    }
    let affine = set.affine;
    let origin = set.stage_origin;
    for y in 0..height {
        for x in 0..width {
            let tile = set.tile_at_mut(x, y)?;
            tile.stitch_pos = affine.apply(tile.stage_pos - origin).round();
        }
    }
    Ok(())
}

/// Seeds every tile's stitch position from the legacy axis vectors:
/// `round(dx · stageToImgX + dy · stageToImgY)`.
pub fn apply_initial_grid_axes(set: &mut ScanSet) -> StitchResult<()> {
    let width = set.grid_width() as i32;
    let height = set.grid_height() as i32;
    if width == 0 {
        return Err(StitchError::GridNotGenerated);
    }
    let (to_x, to_y) = (set.stage_to_img_x, set.stage_to_img_y);
    let origin = set.stage_origin;
    for y in 0..height {
        for x in 0..width {
            let tile = set.tile_at_mut(x, y)?;
            let ds = tile.stage_pos - origin;
            tile.stitch_pos = (to_x * ds.x + to_y * ds.y).round();
        }
    }
    Ok(())
}
