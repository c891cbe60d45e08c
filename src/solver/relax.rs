//! Global layout relaxation.
//!
//! Every interior tile has four independent estimates of its position,
//! one per measured neighbor edge. Each iteration replaces every position
//! with the average of the estimates from its non-outlier edges, all cells
//! at once (Jacobi, not Gauss-Seidel), which keeps the result
//! deterministic. Edges whose magnitude strays too far from the expected
//! edge length are treated as failed matches and contribute nothing.

use crate::geom::{Point2d, Rect2i};
use crate::scanset::{Direction, ScanSet};
use crate::sink::{EventSink, LogLevel, ProgressStep};
use crate::util::{StitchError, StitchResult};

/// Iterative position solver. Keeps its working grid between [`setup`]
/// and [`run`]; all other state lives in the scan set.
///
/// [`setup`]: RelaxationSolver::setup
/// [`run`]: RelaxationSolver::run
#[derive(Default)]
pub struct RelaxationSolver {
    width: usize,
    height: usize,
    pos: Vec<Point2d>,
    sanity_norm: f64,
    max_sanity_diff: f64,
    iterations: usize,
}

impl RelaxationSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expected edge length used by the outlier gate, estimated during
    /// setup as the mean displacement magnitude.
    pub fn sanity_norm(&self) -> f64 {
        self.sanity_norm
    }

    /// Total iterations executed since the last setup.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Copies the current stitch positions into the working grid and
    /// estimates the sanity norm.
    ///
    /// The estimate averages over interior tiles (all four edges
    /// measured); grids too small to have an interior fall back to every
    /// in-grid edge.
    pub fn setup(
        &mut self,
        set: &ScanSet,
        max_sanity_diff: f64,
        sink: &dyn EventSink,
    ) -> StitchResult<()> {
        let width = set.grid_width();
        let height = set.grid_height();
        if width == 0 {
            return Err(StitchError::GridNotGenerated);
        }

        sink.log(LogLevel::Info, "relaxation: initializing solver");
        self.width = width;
        self.height = height;
        self.max_sanity_diff = max_sanity_diff;
        self.iterations = 0;

        self.pos = Vec::with_capacity(width * height);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                self.pos.push(set.tile_at(x, y)?.stitch_pos.to_f64());
            }
        }

        let mut total = 0.0f64;
        let mut count = 0usize;
        if width >= 3 && height >= 3 {
            for y in 1..height as i32 - 1 {
                for x in 1..width as i32 - 1 {
                    let tile = set.tile_at(x, y)?;
                    for dir in Direction::ALL {
                        total += tile.displacements[dir].norm() / 4.0;
                    }
                    count += 1;
                }
            }
        } else {
            for y in 0..height as i32 {
                for x in 0..width as i32 {
                    let tile = set.tile_at(x, y)?;
                    for dir in Direction::ALL {
                        if set.has_neighbor(x, y, dir) {
                            total += tile.displacements[dir].norm();
                            count += 1;
                        }
                    }
                }
            }
        }
        self.sanity_norm = if count > 0 { total / count as f64 } else { 0.0 };
        Ok(())
    }

    /// Runs `iters` Jacobi iterations and commits the result.
    ///
    /// Commits rounded positions back into the scan set and recomputes the
    /// canvas bounding rectangle from the componentwise extrema.
    pub fn run(
        &mut self,
        set: &mut ScanSet,
        iters: usize,
        sink: &dyn EventSink,
    ) -> StitchResult<()> {
        if self.pos.is_empty() {
            return Err(StitchError::InvalidConfig {
                reason: "relaxation run requires setup",
            });
        }

        sink.log(
            LogLevel::Info,
            &format!("relaxation: starting run of {iters} iterations"),
        );
        let mut next = self.pos.clone();
        for it in 0..iters {
            let mut moved = 0.0f64;
            for y in 0..self.height as i32 {
                for x in 0..self.width as i32 {
                    let idx = y as usize * self.width + x as usize;
                    let (acc, n) = self.accumulate_neighbors(set, x, y)?;
                    if n == 0 {
                        sink.log(LogLevel::Warn, &format!("no valid neighbors at {x}, {y}"));
                        next[idx] = self.pos[idx];
                        continue;
                    }
                    let avg = acc / f64::from(n);
                    moved += (self.pos[idx] - avg).norm();
                    next[idx] = avg;
                }
            }
            std::mem::swap(&mut self.pos, &mut next);
            self.iterations += 1;
            sink.progress(
                ProgressStep::Relaxation,
                it,
                iters,
                &format!("solving grid (current movement={moved:.3})"),
            );
        }

        sink.log(LogLevel::Info, "relaxation: committing results");
        let mut min = self.pos[0];
        let mut max = self.pos[0];
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let p = self.pos[y as usize * self.width + x as usize];
                min = min.min(p);
                max = max.max(p);
                set.tile_at_mut(x, y)?.stitch_pos = p.round();
            }
        }
        set.stitch_rect = Rect2i::from_corners(min.round(), max.round());
        sink.log(LogLevel::Info, "relaxation done");
        Ok(())
    }

    /// Sums the positions predicted by the non-outlier edges of `(x, y)`.
    fn accumulate_neighbors(&self, set: &ScanSet, x: i32, y: i32) -> StitchResult<(Point2d, u32)> {
        let tile = set.tile_at(x, y)?;
        let mut acc = Point2d::ZERO;
        let mut n = 0u32;
        for dir in Direction::ALL {
            if !set.has_neighbor(x, y, dir) {
                continue;
            }
            let ds = tile.displacements[dir];
            if (ds.norm() - self.sanity_norm).abs() > self.max_sanity_diff {
                continue;
            }
            let step = dir.unit();
            let neighbor_idx = (y + step.y) as usize * self.width + (x + step.x) as usize;
            acc += self.pos[neighbor_idx] - ds.to_f64();
            n += 1;
        }
        Ok((acc, n))
    }
}
