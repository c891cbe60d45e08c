//! In-memory model of the tile grid.
//!
//! Tiles are appended first, then [`ScanSet::generate_grid`] freezes the
//! set and builds the cell index. Displacements are written by the overlap
//! sweeps, stitch positions by calibration seeding and relaxation. Pixel
//! buffers load lazily through a [`TileSource`] into a per-tile once-init
//! cache shared by the worker threads; eviction needs `&mut` access and
//! happens only between phases.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Index, IndexMut};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::geom::{Affine2x3, Point2d, Point2i, Rect2i};
use crate::image::{OwnedImage, TileSource};
use crate::util::{StitchError, StitchResult};

/// Neighbor direction on the grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All directions, in displacement-slot order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid-cell step for this direction.
    pub fn unit(self) -> Point2i {
        match self {
            Direction::Up => Point2i::new(0, -1),
            Direction::Down => Point2i::new(0, 1),
            Direction::Left => Point2i::new(-1, 0),
            Direction::Right => Point2i::new(1, 0),
        }
    }

    /// Involution swapping `Up↔Down` and `Left↔Right`.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    /// Slot index in [`Displacements`] and the overlap document.
    pub const fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}

/// Per-tile measured edge displacements, one integer 2-vector per
/// direction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Displacements([Point2i; 4]);

impl Displacements {
    pub fn from_array(values: [Point2i; 4]) -> Self {
        Self(values)
    }

    pub fn to_array(self) -> [Point2i; 4] {
        self.0
    }
}

impl Index<Direction> for Displacements {
    type Output = Point2i;
    fn index(&self, dir: Direction) -> &Point2i {
        &self.0[dir.index()]
    }
}

impl IndexMut<Direction> for Displacements {
    fn index_mut(&mut self, dir: Direction) -> &mut Point2i {
        &mut self.0[dir.index()]
    }
}

/// One acquired image on the grid.
#[derive(Debug)]
pub struct Tile {
    pub path: PathBuf,
    /// Logical grid coordinate as reported by the acquisition (may be
    /// sparse; the grid index maps it onto dense cells).
    pub grid_pos: Point2i,
    /// Physical stage coordinate, continuous and noisy.
    pub stage_pos: Point2d,
    /// Solved pixel position on the output canvas.
    pub stitch_pos: Point2i,
    pub displacements: Displacements,
    cache: OnceLock<Arc<OwnedImage>>,
}

impl Tile {
    fn new(path: PathBuf, grid_pos: Point2i, stage_pos: Point2d) -> Self {
        Self {
            path,
            grid_pos,
            stage_pos,
            stitch_pos: Point2i::ZERO,
            displacements: Displacements::default(),
            cache: OnceLock::new(),
        }
    }

    /// Returns the cached pixel buffer, decoding through `source` on first
    /// use. Concurrent first calls may decode more than once; the first
    /// stored buffer wins and later callers share it.
    pub fn image(&self, source: &dyn TileSource) -> StitchResult<Arc<OwnedImage>> {
        if let Some(img) = self.cache.get() {
            return Ok(Arc::clone(img));
        }
        let loaded = Arc::new(source.load(&self.path)?);
        Ok(Arc::clone(self.cache.get_or_init(|| loaded)))
    }

    /// Releases the cached buffer.
    pub fn evict(&mut self) {
        self.cache = OnceLock::new();
    }
}

struct GridIndex {
    width: usize,
    height: usize,
    /// Row-major tile indices.
    cells: Vec<usize>,
}

/// Owns the tile collection, the grid index, and the calibration state.
#[derive(Default)]
pub struct ScanSet {
    tiles: Vec<Tile>,
    grid: Option<GridIndex>,
    /// Stage coordinate of the `(0, 0)` tile.
    pub stage_origin: Point2d,
    /// Legacy per-axis calibration: pixel displacement per unit of stage x.
    pub stage_to_img_x: Point2d,
    /// Legacy per-axis calibration: pixel displacement per unit of stage y.
    pub stage_to_img_y: Point2d,
    /// Stage→image affine map (preferred calibration).
    pub affine: Affine2x3,
    /// Canvas bounding rectangle committed by relaxation.
    pub stitch_rect: Rect2i,
}

impl ScanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tile. Fails once the grid has been generated.
    pub fn add_tile(
        &mut self,
        path: impl Into<PathBuf>,
        grid_pos: Point2i,
        stage_pos: Point2d,
    ) -> StitchResult<()> {
        if self.grid.is_some() {
            return Err(StitchError::InvalidConfig {
                reason: "tiles cannot be added after grid generation",
            });
        }
        self.tiles.push(Tile::new(path.into(), grid_pos, stage_pos));
        Ok(())
    }

    /// Builds the dense cell index from the tiles' grid coordinates.
    ///
    /// The sorted unique coordinate values per axis must be evenly spaced
    /// and the tiles must cover the full `width × height` rectangle with
    /// exactly one tile per cell. Also records the stage origin.
    pub fn generate_grid(&mut self) -> StitchResult<()> {
        if self.tiles.is_empty() {
            return Err(StitchError::IrregularGrid {
                reason: "no tiles".to_string(),
            });
        }

        let xs: BTreeSet<i32> = self.tiles.iter().map(|t| t.grid_pos.x).collect();
        let ys: BTreeSet<i32> = self.tiles.iter().map(|t| t.grid_pos.y).collect();
        let xs: Vec<i32> = xs.into_iter().collect();
        let ys: Vec<i32> = ys.into_iter().collect();
        check_uniform_step(&xs, "x")?;
        check_uniform_step(&ys, "y")?;

        let width = xs.len();
        let height = ys.len();
        if width * height != self.tiles.len() {
            return Err(StitchError::IrregularGrid {
                reason: format!(
                    "expected {} tiles for a {}x{} grid, got {}",
                    width * height,
                    width,
                    height,
                    self.tiles.len()
                ),
            });
        }

        let x_index: HashMap<i32, usize> = xs.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let y_index: HashMap<i32, usize> = ys.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let mut cells = vec![usize::MAX; width * height];
        for (ti, tile) in self.tiles.iter().enumerate() {
            let xi = x_index[&tile.grid_pos.x];
            let yi = y_index[&tile.grid_pos.y];
            let cell = &mut cells[yi * width + xi];
            if *cell != usize::MAX {
                return Err(StitchError::IrregularGrid {
                    reason: format!(
                        "duplicate tile at grid position ({}, {})",
                        tile.grid_pos.x, tile.grid_pos.y
                    ),
                });
            }
            *cell = ti;
        }

        self.grid = Some(GridIndex {
            width,
            height,
            cells,
        });
        self.stage_origin = self.tile_at(0, 0)?.stage_pos;
        Ok(())
    }

    pub fn grid_width(&self) -> usize {
        self.grid.as_ref().map_or(0, |g| g.width)
    }

    pub fn grid_height(&self) -> usize {
        self.grid.as_ref().map_or(0, |g| g.height)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Mutable access to the tiles in insertion order. The collection
    /// itself stays frozen; only per-tile solver state can change.
    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    fn cell_index(&self, x: i32, y: i32) -> StitchResult<usize> {
        let grid = self.grid.as_ref().ok_or(StitchError::GridNotGenerated)?;
        if x < 0 || y < 0 || x as usize >= grid.width || y as usize >= grid.height {
            return Err(StitchError::MissingTile { x, y });
        }
        Ok(grid.cells[y as usize * grid.width + x as usize])
    }

    /// Tile at dense grid cell `(x, y)`.
    pub fn tile_at(&self, x: i32, y: i32) -> StitchResult<&Tile> {
        let idx = self.cell_index(x, y)?;
        Ok(&self.tiles[idx])
    }

    pub fn tile_at_mut(&mut self, x: i32, y: i32) -> StitchResult<&mut Tile> {
        let idx = self.cell_index(x, y)?;
        Ok(&mut self.tiles[idx])
    }

    /// Tile neighboring `(x, y)` in direction `dir`.
    pub fn neighbor_at(&self, x: i32, y: i32, dir: Direction) -> StitchResult<&Tile> {
        let step = dir.unit();
        self.tile_at(x + step.x, y + step.y)
    }

    pub fn neighbor_at_mut(&mut self, x: i32, y: i32, dir: Direction) -> StitchResult<&mut Tile> {
        let step = dir.unit();
        self.tile_at_mut(x + step.x, y + step.y)
    }

    /// Whether `(x, y)` has an in-grid neighbor in direction `dir`.
    pub fn has_neighbor(&self, x: i32, y: i32, dir: Direction) -> bool {
        let Some(grid) = self.grid.as_ref() else {
            return false;
        };
        let p = Point2i::new(x, y) + dir.unit();
        p.x >= 0 && p.y >= 0 && (p.x as usize) < grid.width && (p.y as usize) < grid.height
    }

    /// Releases every tile's cached buffer. Serialized between phases.
    pub fn evict_all(&mut self) {
        for tile in &mut self.tiles {
            tile.evict();
        }
    }
}

fn check_uniform_step(values: &[i32], axis: &str) -> StitchResult<()> {
    if values.len() < 2 {
        return Ok(());
    }
    let step = values[1] - values[0];
    for pair in values.windows(2) {
        if pair[1] - pair[0] != step {
            return Err(StitchError::IrregularGrid {
                reason: format!(
                    "grid {axis} coordinates are not evenly spaced (step {} vs {})",
                    pair[1] - pair[0],
                    step
                ),
            });
        }
    }
    Ok(())
}
