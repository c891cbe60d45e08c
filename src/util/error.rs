//! Error types for gridstitch.

use thiserror::Error;

/// Result alias for gridstitch operations.
pub type StitchResult<T> = std::result::Result<T, StitchError>;

/// Errors that can occur while building or solving a scan set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StitchError {
    /// The provided dimensions are invalid (must be non-zero).
    #[error("invalid dimensions: width={width} height={height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The provided stride is smaller than the image width.
    #[error("invalid stride: width={width} stride={stride}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is too small for the requested view.
    #[error("buffer too small: needed={needed} got={got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The requested ROI lies outside the image bounds.
    #[error(
        "roi out of bounds: x={x} y={y} width={width} height={height} img_width={img_width} img_height={img_height}"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// A tile image could not be decoded or read.
    #[error("could not load image \"{path}\": {reason}")]
    ImageLoad { path: String, reason: String },
    /// Neighbor resolution walked off the grid.
    #[error("no tile at grid cell ({x}, {y})")]
    MissingTile { x: i32, y: i32 },
    /// The tile coverage does not form a complete rectangular grid.
    #[error("irregular grid: {reason}")]
    IrregularGrid { reason: String },
    /// A scan-set operation requires the grid index to exist.
    #[error("grid has not been generated")]
    GridNotGenerated,
    /// A project or overlap document is malformed.
    #[error("could not parse document: {reason}")]
    LoadParse { reason: String },
    /// A document or output file could not be read or written.
    #[error("document io on \"{path}\": {reason}")]
    DocumentIo { path: String, reason: String },
    /// The calibration correspondences are linearly dependent.
    #[error("degenerate calibration: {reason}")]
    DegenerateCalibration { reason: &'static str },
    /// A solver configuration value is out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Parallel execution requested without the `rayon` feature.
    #[error("parallel execution requested but the rayon feature is disabled")]
    ParallelUnavailable,
}
