//! Solvers that turn a scan set into a coherent layout.
//!
//! [`OverlapSolver`] measures pairwise tile displacements; the calibration
//! routines in this module bootstrap the stage→image map from an anchor
//! cell; [`RelaxationSolver`] reconciles the measured edges into global
//! positions.

mod calibrate;
mod relax;

pub use calibrate::{apply_initial_grid, apply_initial_grid_axes};
pub use relax::RelaxationSolver;

use crate::geom::{Point2i, Size2i};
use crate::image::TileSource;
use crate::scanset::{Direction, ScanSet, Tile};
use crate::search::{refine_overlap, RangeShrink};
use crate::sink::{EventSink, LogLevel, ProgressStep};
use crate::util::{StitchError, StitchResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// How the pair solver seeds the search window for an edge.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum GuessMode {
    /// Transform the stage-coordinate difference through the current
    /// stage→image affine map.
    #[default]
    Stage,
    /// Use the difference of the current solved positions.
    Result,
    /// Use the configured per-axis constants, negated for `Up`/`Left`.
    Fixed,
}

/// Pair-solver configuration.
#[derive(Clone, Debug)]
pub struct OverlapConfig {
    pub guess_mode: GuessMode,
    /// Deviations of the result from the guess beyond this many pixels are
    /// logged as warnings (never failures).
    pub max_distance: f64,
    /// log2 of the coarsest decimation fed to the hierarchical search.
    pub log_steps: u32,
    /// Symmetric center crop applied to both tiles before searching.
    pub crop_size: Size2i,
    /// Search half-extent for horizontal edges.
    pub range_h: Point2i,
    /// Search half-extent for vertical edges.
    pub range_v: Point2i,
    /// Fixed guess for horizontal edges (`GuessMode::Fixed`).
    pub guess_h: Point2i,
    /// Fixed guess for vertical edges (`GuessMode::Fixed`).
    pub guess_v: Point2i,
    /// Window shrink mode between search passes.
    pub shrink: RangeShrink,
    /// Enables parallel edge solves when the `rayon` feature is available.
    ///
    /// When the feature is disabled, setting this is a configuration
    /// error; sweeps stay sequential otherwise.
    pub parallel: bool,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            guess_mode: GuessMode::Stage,
            max_distance: 64.0,
            log_steps: 3,
            crop_size: Size2i::new(512, 512),
            range_h: Point2i::new(48, 24),
            range_v: Point2i::new(24, 48),
            guess_h: Point2i::ZERO,
            guess_v: Point2i::ZERO,
            shrink: RangeShrink::Quarter,
            parallel: false,
        }
    }
}

impl OverlapConfig {
    /// Validates the configuration, returning an error if any parameter is
    /// invalid.
    pub fn validate(&self) -> StitchResult<()> {
        if self.crop_size.width <= 0 || self.crop_size.height <= 0 {
            return Err(StitchError::InvalidConfig {
                reason: "crop_size must be positive in both axes",
            });
        }
        if self.range_h.x < 0 || self.range_h.y < 0 || self.range_v.x < 0 || self.range_v.y < 0 {
            return Err(StitchError::InvalidConfig {
                reason: "search ranges must be non-negative",
            });
        }
        if self.log_steps > 12 {
            return Err(StitchError::InvalidConfig {
                reason: "log_steps must be at most 12",
            });
        }
        if !self.max_distance.is_finite() || self.max_distance < 0.0 {
            return Err(StitchError::InvalidConfig {
                reason: "max_distance must be a non-negative finite value",
            });
        }
        #[cfg(not(feature = "rayon"))]
        if self.parallel {
            return Err(StitchError::ParallelUnavailable);
        }
        Ok(())
    }

    pub(crate) fn use_parallel(&self) -> bool {
        self.parallel && cfg!(feature = "rayon")
    }
}

/// Measures pairwise displacements across the grid.
pub struct OverlapSolver {
    cfg: OverlapConfig,
}

impl OverlapSolver {
    /// Creates a solver with a validated configuration.
    pub fn new(cfg: OverlapConfig) -> StitchResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &OverlapConfig {
        &self.cfg
    }

    fn range_for(&self, dir: Direction) -> Point2i {
        if dir.is_vertical() {
            self.cfg.range_v
        } else {
            self.cfg.range_h
        }
    }

    /// Loads, crops, and searches one tile pair around `guess`.
    ///
    /// A failed image load is reported through the sink and yields a NaN
    /// score with the guess as the offset; the caller must not commit such
    /// a result.
    fn measure_pair(
        &self,
        a: &Tile,
        b: &Tile,
        source: &dyn TileSource,
        sink: &dyn EventSink,
        guess: Point2i,
        range: Point2i,
    ) -> (f32, Point2i) {
        let img_a = match a.image(source) {
            Ok(img) => img,
            Err(err) => {
                sink.fatal(&format!(
                    "could not load image for overlap: \"{}\" ({err})",
                    a.path.display()
                ));
                return (f32::NAN, guess);
            }
        };
        let img_b = match b.image(source) {
            Ok(img) => img,
            Err(err) => {
                sink.fatal(&format!(
                    "could not load image for overlap: \"{}\" ({err})",
                    b.path.display()
                ));
                return (f32::NAN, guess);
            }
        };

        let crop_w = self.cfg.crop_size.width as usize;
        let crop_h = self.cfg.crop_size.height as usize;
        let crop_a = img_a.view().center_crop(crop_w, crop_h);
        let crop_b = img_b.view().center_crop(crop_w, crop_h);

        let hit = refine_overlap(crop_a, crop_b, guess, range, self.cfg.log_steps, self.cfg.shrink);
        (hit.score, hit.offset)
    }

    fn guess_for(&self, set: &ScanSet, a: &Tile, b: &Tile, dir: Direction) -> Point2i {
        match self.cfg.guess_mode {
            GuessMode::Stage => set.affine.apply(b.stage_pos - a.stage_pos).round(),
            GuessMode::Result => b.stitch_pos - a.stitch_pos,
            GuessMode::Fixed => {
                let g = if dir.is_vertical() {
                    self.cfg.guess_v
                } else {
                    self.cfg.guess_h
                };
                match dir {
                    Direction::Up | Direction::Left => -g,
                    Direction::Down | Direction::Right => g,
                }
            }
        }
    }

    /// Measures the displacement between tile `(x, y)` and its neighbor in
    /// direction `dir`, using the configured guess mode.
    ///
    /// Does not write displacement slots; the sweeps do that after
    /// collecting a whole row or column.
    pub fn solve_edge(
        &self,
        set: &ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
        x: i32,
        y: i32,
        dir: Direction,
    ) -> StitchResult<(f32, Point2i)> {
        let a = set.tile_at(x, y)?;
        let b = set.neighbor_at(x, y, dir)?;
        let guess = self.guess_for(set, a, b, dir);
        let (score, dr) = self.measure_pair(a, b, source, sink, guess, self.range_for(dir));

        if !score.is_nan() {
            let deviation = (dr - guess).norm();
            if deviation > self.cfg.max_distance {
                sink.log(
                    LogLevel::Warn,
                    &format!(
                        "overly large difference {deviation:.1} from guess encountered at ({x:3}, {y:3})"
                    ),
                );
            }
        }
        Ok((score, dr))
    }

    /// Measures every vertical edge, one grid row at a time.
    ///
    /// Rows proceed sequentially; edges within a row may solve in
    /// parallel. Each edge writes `Down` on the upper tile and the negated
    /// vector to `Up` on the lower tile, so concurrent solves never touch
    /// the same slot.
    pub fn compute_overlaps_y(
        &self,
        set: &mut ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
    ) -> StitchResult<()> {
        self.cfg.validate()?;
        let width = set.grid_width() as i32;
        let height = set.grid_height() as i32;
        if width == 0 {
            return Err(StitchError::GridNotGenerated);
        }

        sink.log(LogLevel::Info, "computing vertical overlaps");
        let n_max = (height - 1).max(0) as usize;
        sink.progress(ProgressStep::OverlapsY, 0, n_max, "computing overlaps");
        for y in 0..height - 1 {
            let results = self.solve_line(set, source, sink, width, y, Direction::Down);
            for (x, result) in results.into_iter().enumerate() {
                let (score, dr) = result?;
                if score.is_nan() {
                    continue;
                }
                let x = x as i32;
                set.tile_at_mut(x, y)?.displacements[Direction::Down] = dr;
                set.neighbor_at_mut(x, y, Direction::Down)?.displacements[Direction::Up] = -dr;
            }
            sink.progress(ProgressStep::OverlapsY, y as usize, n_max, "computing overlaps");
        }
        Ok(())
    }

    /// Measures every horizontal edge, one grid column at a time.
    pub fn compute_overlaps_x(
        &self,
        set: &mut ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
    ) -> StitchResult<()> {
        self.cfg.validate()?;
        let width = set.grid_width() as i32;
        let height = set.grid_height() as i32;
        if width == 0 {
            return Err(StitchError::GridNotGenerated);
        }

        sink.log(LogLevel::Info, "computing horizontal overlaps");
        let n_max = (width - 1).max(0) as usize;
        sink.progress(ProgressStep::OverlapsX, 0, n_max, "computing overlaps");
        for x in 0..width - 1 {
            let results = self.solve_line(set, source, sink, height, x, Direction::Right);
            for (y, result) in results.into_iter().enumerate() {
                let (score, dr) = result?;
                if score.is_nan() {
                    continue;
                }
                let y = y as i32;
                set.tile_at_mut(x, y)?.displacements[Direction::Right] = dr;
                set.neighbor_at_mut(x, y, Direction::Right)?.displacements[Direction::Left] = -dr;
            }
            sink.progress(ProgressStep::OverlapsX, x as usize, n_max, "computing overlaps");
        }
        Ok(())
    }

    /// Solves all edges of one row (`Down`) or column (`Right`).
    ///
    /// `fixed` is the shared coordinate, `count` the extent along the free
    /// axis. Results come back in free-axis order regardless of the
    /// execution mode.
    fn solve_line(
        &self,
        set: &ScanSet,
        source: &dyn TileSource,
        sink: &dyn EventSink,
        count: i32,
        fixed: i32,
        dir: Direction,
    ) -> Vec<StitchResult<(f32, Point2i)>> {
        let solve = |free: i32| {
            let (x, y) = if dir.is_vertical() {
                (free, fixed)
            } else {
                (fixed, free)
            };
            self.solve_edge(set, source, sink, x, y, dir)
        };

        if self.cfg.use_parallel() {
            #[cfg(feature = "rayon")]
            return (0..count).into_par_iter().map(solve).collect();
        }
        (0..count).map(solve).collect()
    }
}
