#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gridstitch::{
    EventSink, LogLevel, OwnedImage, Point2d, Point2i, ProgressStep, ScanSet, StitchError,
    StitchResult, TileSource,
};

/// Tile source backed by pre-built in-memory buffers.
#[derive(Default)]
pub struct MemorySource {
    images: HashMap<PathBuf, OwnedImage>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: OwnedImage) {
        self.images.insert(path.into(), image);
    }
}

impl TileSource for MemorySource {
    fn load(&self, path: &Path) -> StitchResult<OwnedImage> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| StitchError::ImageLoad {
                path: path.display().to_string(),
                reason: "not present in memory source".to_string(),
            })
    }
}

/// Sink that records log and fatal events for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub logs: Mutex<Vec<(LogLevel, String)>>,
    pub fatals: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == LogLevel::Warn)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn fatal(&self, message: &str) {
        self.fatals.lock().unwrap().push(message.to_string());
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.logs.lock().unwrap().push((level, message.to_string()));
    }

    fn progress(&self, _step: ProgressStep, _n: usize, _n_max: usize, _message: &str) {}
}

/// Deterministic high-frequency texture.
pub fn textured_canvas(width: usize, height: usize) -> OwnedImage {
    let data = (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            (((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as f32
        })
        .collect();
    OwnedImage::from_vec(data, width, height).unwrap()
}

fn crop_owned(canvas: &OwnedImage, x: usize, y: usize, width: usize, height: usize) -> OwnedImage {
    let view = canvas.view().roi(x, y, width, height).unwrap();
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        data.extend_from_slice(view.row(row).unwrap());
    }
    OwnedImage::from_vec(data, width, height).unwrap()
}

/// `grid x grid` mosaic of `tile x tile` crops from one textured canvas,
/// spaced `tile - overlap` pixels apart, with exact stage coordinates in
/// pixel units (so the default identity affine is the true calibration).
pub fn identity_mosaic(tile: usize, grid: usize, overlap: usize) -> (ScanSet, MemorySource) {
    let step = tile - overlap;
    let canvas = textured_canvas(step * (grid - 1) + tile, step * (grid - 1) + tile);

    let mut set = ScanSet::new();
    let mut source = MemorySource::new();
    for gy in 0..grid {
        for gx in 0..grid {
            let path = format!("tile_{gx}_{gy}.png");
            source.insert(
                path.as_str(),
                crop_owned(&canvas, gx * step, gy * step, tile, tile),
            );
            set.add_tile(
                path,
                Point2i::new(gx as i32, gy as i32),
                Point2d::new((gx * step) as f64, (gy * step) as f64),
            )
            .unwrap();
        }
    }
    set.generate_grid().unwrap();
    (set, source)
}
