//! Project and overlap documents.
//!
//! A project document carries the tile manifest plus whichever solver
//! state the save flags select. Loading an *input* project needs only the
//! `images[]` entries with `path`/`grid`/`stage`; a full load restores
//! every section present, so saving a loaded project with the same flags
//! reproduces the document byte for byte.

use std::fs;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::geom::{Point2d, Point2i, Rect2i};
use crate::scanset::{Direction, Displacements, ScanSet};
use crate::util::{StitchError, StitchResult};

bitflags! {
    /// Selects which sections a project save writes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SaveFlags: u32 {
        /// Per-tile measured edge displacements.
        const DISPLACEMENTS = 1;
        /// Solved positions and the stitch rectangle.
        const SOLVER_OPT = 2;
        /// Legacy per-axis calibration vectors.
        const MATRIX = 4;
        /// Grid dimensions and the stage origin.
        const GRID_SIZE = 8;
    }
}

impl SaveFlags {
    /// Bare tile manifest, as consumed by [`load_input`].
    pub const INPUT: SaveFlags = SaveFlags::empty();
    /// Manifest plus grid dimensions.
    pub const GRID: SaveFlags = SaveFlags::GRID_SIZE;
}

#[derive(Serialize, Deserialize)]
struct ImageDoc {
    path: String,
    grid: [i32; 2],
    stage: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stitch: Option<[i32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    displacements: Option<[[i32; 2]; 4]>,
}

#[derive(Serialize, Deserialize)]
struct ProjectDoc {
    #[serde(
        rename = "stageToImgX",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    stage_to_img_x: Option<[f64; 2]>,
    #[serde(
        rename = "stageToImgY",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    stage_to_img_y: Option<[f64; 2]>,
    #[serde(rename = "gridWidth", default, skip_serializing_if = "Option::is_none")]
    grid_width: Option<usize>,
    #[serde(rename = "gridHeight", default, skip_serializing_if = "Option::is_none")]
    grid_height: Option<usize>,
    #[serde(
        rename = "stageOrigin",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    stage_origin: Option<[f64; 2]>,
    #[serde(rename = "stitchRect", default, skip_serializing_if = "Option::is_none")]
    stitch_rect: Option<[i32; 4]>,
    images: Vec<ImageDoc>,
}

fn doc_from_set(set: &ScanSet, flags: SaveFlags) -> ProjectDoc {
    let images = set
        .tiles()
        .iter()
        .map(|tile| ImageDoc {
            path: tile.path.display().to_string(),
            grid: [tile.grid_pos.x, tile.grid_pos.y],
            stage: [tile.stage_pos.x, tile.stage_pos.y],
            stitch: flags
                .contains(SaveFlags::SOLVER_OPT)
                .then(|| [tile.stitch_pos.x, tile.stitch_pos.y]),
            displacements: flags.contains(SaveFlags::DISPLACEMENTS).then(|| {
                tile.displacements
                    .to_array()
                    .map(|d| [d.x, d.y])
            }),
        })
        .collect();

    ProjectDoc {
        stage_to_img_x: flags
            .contains(SaveFlags::MATRIX)
            .then(|| [set.stage_to_img_x.x, set.stage_to_img_x.y]),
        stage_to_img_y: flags
            .contains(SaveFlags::MATRIX)
            .then(|| [set.stage_to_img_y.x, set.stage_to_img_y.y]),
        grid_width: flags
            .contains(SaveFlags::GRID_SIZE)
            .then(|| set.grid_width()),
        grid_height: flags
            .contains(SaveFlags::GRID_SIZE)
            .then(|| set.grid_height()),
        stage_origin: flags
            .contains(SaveFlags::GRID_SIZE)
            .then(|| [set.stage_origin.x, set.stage_origin.y]),
        stitch_rect: flags.contains(SaveFlags::SOLVER_OPT).then(|| {
            let r = set.stitch_rect;
            [r.x, r.y, r.width, r.height]
        }),
        images,
    }
}

/// Renders the project document for `set` with the selected sections.
pub fn project_to_string(set: &ScanSet, flags: SaveFlags) -> StitchResult<String> {
    serde_json::to_string_pretty(&doc_from_set(set, flags)).map_err(|err| {
        StitchError::LoadParse {
            reason: err.to_string(),
        }
    })
}

/// Writes the project document for `set` to `path`.
pub fn save_project(set: &ScanSet, path: &Path, flags: SaveFlags) -> StitchResult<()> {
    let text = project_to_string(set, flags)?;
    fs::write(path, text).map_err(|err| StitchError::DocumentIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn parse_project(path: &Path) -> StitchResult<ProjectDoc> {
    let text = fs::read_to_string(path).map_err(|err| StitchError::DocumentIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|err| StitchError::LoadParse {
        reason: err.to_string(),
    })
}

fn set_from_doc(doc: &ProjectDoc) -> StitchResult<ScanSet> {
    let mut set = ScanSet::new();
    for image in &doc.images {
        set.add_tile(
            image.path.clone(),
            Point2i::new(image.grid[0], image.grid[1]),
            Point2d::new(image.stage[0], image.stage[1]),
        )?;
    }
    Ok(set)
}

/// Loads only the tile manifest (`path`/`grid`/`stage` per image).
///
/// The caller generates the grid afterwards; solver sections in the
/// document are ignored.
pub fn load_input(path: &Path) -> StitchResult<ScanSet> {
    let doc = parse_project(path)?;
    set_from_doc(&doc)
}

/// Loads a project restoring every section present in the document.
///
/// Generates the grid and validates its dimensions against any recorded
/// `gridWidth`/`gridHeight`.
pub fn load_project(path: &Path) -> StitchResult<ScanSet> {
    let doc = parse_project(path)?;
    let mut set = set_from_doc(&doc)?;
    set.generate_grid()?;

    if let (Some(w), Some(h)) = (doc.grid_width, doc.grid_height) {
        if w != set.grid_width() || h != set.grid_height() {
            return Err(StitchError::LoadParse {
                reason: format!(
                    "document grid {w}x{h} does not match tile coverage {}x{}",
                    set.grid_width(),
                    set.grid_height()
                ),
            });
        }
    }
    if let (Some(x), Some(y)) = (doc.stage_to_img_x, doc.stage_to_img_y) {
        set.stage_to_img_x = Point2d::new(x[0], x[1]);
        set.stage_to_img_y = Point2d::new(y[0], y[1]);
    }
    if let Some(r) = doc.stitch_rect {
        set.stitch_rect = Rect2i::new(r[0], r[1], r[2], r[3]);
    }
    for (tile, image) in set.tiles_mut().iter_mut().zip(&doc.images) {
        if let Some(stitch) = image.stitch {
            tile.stitch_pos = Point2i::new(stitch[0], stitch[1]);
        }
        if let Some(disps) = image.displacements {
            tile.displacements =
                Displacements::from_array(disps.map(|d| Point2i::new(d[0], d[1])));
        }
    }
    Ok(set)
}

/// Overlap document: the measured displacements as a `(gridWidth,
/// gridHeight, 4)` array of 2-vectors in direction order `UP, DOWN, LEFT,
/// RIGHT`, indexed `[x][y][dir]`.
#[derive(Serialize, Deserialize)]
struct OverlapsDoc {
    #[serde(rename = "gridWidth")]
    grid_width: usize,
    #[serde(rename = "gridHeight")]
    grid_height: usize,
    displacements: Vec<Vec<[[i32; 2]; 4]>>,
}

/// Writes the measured displacements of `set` to `path`.
pub fn save_overlaps(set: &ScanSet, path: &Path) -> StitchResult<()> {
    let width = set.grid_width();
    let height = set.grid_height();
    if width == 0 {
        return Err(StitchError::GridNotGenerated);
    }

    let mut columns = Vec::with_capacity(width);
    for x in 0..width as i32 {
        let mut column = Vec::with_capacity(height);
        for y in 0..height as i32 {
            let tile = set.tile_at(x, y)?;
            column.push(tile.displacements.to_array().map(|d| [d.x, d.y]));
        }
        columns.push(column);
    }

    let doc = OverlapsDoc {
        grid_width: width,
        grid_height: height,
        displacements: columns,
    };
    let text = serde_json::to_string_pretty(&doc).map_err(|err| StitchError::LoadParse {
        reason: err.to_string(),
    })?;
    fs::write(path, text).map_err(|err| StitchError::DocumentIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Restores measured displacements from an overlap document.
///
/// The document shape must match the generated grid exactly.
pub fn load_overlaps(set: &mut ScanSet, path: &Path) -> StitchResult<()> {
    let text = fs::read_to_string(path).map_err(|err| StitchError::DocumentIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let doc: OverlapsDoc = serde_json::from_str(&text).map_err(|err| StitchError::LoadParse {
        reason: err.to_string(),
    })?;

    let width = set.grid_width();
    let height = set.grid_height();
    if width == 0 {
        return Err(StitchError::GridNotGenerated);
    }
    if doc.grid_width != width
        || doc.grid_height != height
        || doc.displacements.len() != width
        || doc.displacements.iter().any(|col| col.len() != height)
    {
        return Err(StitchError::LoadParse {
            reason: format!(
                "overlap document shape {}x{} does not match grid {width}x{height}",
                doc.grid_width, doc.grid_height
            ),
        });
    }

    for (x, column) in doc.displacements.iter().enumerate() {
        for (y, cell) in column.iter().enumerate() {
            let tile = set.tile_at_mut(x as i32, y as i32)?;
            tile.displacements = Displacements::from_array(cell.map(|d| Point2i::new(d[0], d[1])));
        }
    }
    Ok(())
}

// Direction order in the documents is fixed by `Direction::index`.
const _: () = {
    assert!(Direction::Up.index() == 0);
    assert!(Direction::Down.index() == 1);
    assert!(Direction::Left.index() == 2);
    assert!(Direction::Right.index() == 3);
};
