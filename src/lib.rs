//! Gridstitch assembles a large mosaic from a rectangular grid of
//! overlapping tiles acquired by a motorized scanning stage.
//!
//! Nominal stage positions are inexact, so the pipeline recovers the true
//! pixel offset between every pair of neighboring tiles by hierarchical
//! overlap search, fits the stage→image affine map from one measured
//! anchor, and relaxes all measured edges into a globally consistent
//! position grid.

pub mod geom;
pub mod image;
pub mod project;
pub mod scanset;
pub mod score;
pub mod search;
pub mod sink;
pub mod solver;
#[cfg(feature = "image-io")]
pub mod stitcher;
mod util;

pub use geom::{Affine2x3, Point2d, Point2i, Rect2i, Size2i};
pub use image::{ImageView, OwnedImage, TileSource};
pub use project::SaveFlags;
pub use scanset::{Direction, Displacements, ScanSet, Tile};
pub use score::{overlap_roi, score_overlap, BAD_SCORE};
pub use search::{best_overlap_at_scale, refine_overlap, RangeShrink, SearchHit};
pub use sink::{EventSink, LogLevel, NullSink, ProgressStep};
pub use solver::{
    apply_initial_grid, apply_initial_grid_axes, GuessMode, OverlapConfig, OverlapSolver,
    RelaxationSolver,
};
pub use util::{StitchError, StitchResult};

#[cfg(feature = "tracing")]
pub use sink::TracingSink;

#[cfg(feature = "image-io")]
pub use image::io::FsTileSource;
