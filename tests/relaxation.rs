//! Relaxation fixed points and outlier gating.

mod common;

use common::RecordingSink;
use gridstitch::{
    Direction, LogLevel, NullSink, Point2d, Point2i, RelaxationSolver, ScanSet, StitchError,
};

/// 3x3 set with exact 32 px pitch positions and perfectly consistent
/// measured edges. No images involved; displacements are written directly.
fn consistent_grid() -> ScanSet {
    let mut set = ScanSet::new();
    for gy in 0..3 {
        for gx in 0..3 {
            set.add_tile(
                format!("tile_{gx}_{gy}.png"),
                Point2i::new(gx, gy),
                Point2d::new(f64::from(gx), f64::from(gy)),
            )
            .unwrap();
        }
    }
    set.generate_grid().unwrap();

    for y in 0..3i32 {
        for x in 0..3i32 {
            set.tile_at_mut(x, y).unwrap().stitch_pos = Point2i::new(32 * x, 32 * y);
        }
    }
    for y in 0..3i32 {
        for x in 0..3i32 {
            for dir in Direction::ALL {
                if set.has_neighbor(x, y, dir) {
                    let d = dir.unit() * 32;
                    set.tile_at_mut(x, y).unwrap().displacements[dir] = d;
                }
            }
        }
    }
    set
}

#[test]
fn consistent_grid_is_a_fixed_point() {
    let mut set = consistent_grid();
    let mut relax = RelaxationSolver::new();
    relax.setup(&set, 10.0, &NullSink).unwrap();
    assert!((relax.sanity_norm() - 32.0).abs() < 1e-9);

    relax.run(&mut set, 1, &NullSink).unwrap();
    for y in 0..3i32 {
        for x in 0..3i32 {
            assert_eq!(
                set.tile_at(x, y).unwrap().stitch_pos,
                Point2i::new(32 * x, 32 * y)
            );
        }
    }
    assert_eq!(set.stitch_rect.tl(), Point2i::ZERO);
    assert_eq!(set.stitch_rect.br(), Point2i::new(64, 64));
}

#[test]
fn outlier_edge_contributes_nothing() {
    let mut set = consistent_grid();
    // Corrupt the vertical edge between (0, 0) and (0, 1); it does not
    // touch the interior tile, so the sanity norm stays 32.
    set.tile_at_mut(0, 0).unwrap().displacements[Direction::Down] = Point2i::new(0, 200);
    set.tile_at_mut(0, 1).unwrap().displacements[Direction::Up] = Point2i::new(0, -200);

    let mut relax = RelaxationSolver::new();
    relax.setup(&set, 10.0, &NullSink).unwrap();
    assert!((relax.sanity_norm() - 32.0).abs() < 1e-9);

    relax.run(&mut set, 20, &NullSink).unwrap();
    // The gated edge is ignored, so the remaining consistent edges hold
    // every tile exactly in place.
    for y in 0..3i32 {
        for x in 0..3i32 {
            assert_eq!(
                set.tile_at(x, y).unwrap().stitch_pos,
                Point2i::new(32 * x, 32 * y),
                "position at ({x}, {y})"
            );
        }
    }
}

#[test]
fn starved_cell_warns_and_stays_put() {
    // 1x2 grid whose single edge is an outlier in both directions: both
    // cells end up with no valid neighbors.
    let mut set = ScanSet::new();
    set.add_tile("a.png", Point2i::new(0, 0), Point2d::ZERO).unwrap();
    set.add_tile("b.png", Point2i::new(0, 1), Point2d::new(0.0, 1.0))
        .unwrap();
    set.generate_grid().unwrap();
    set.tile_at_mut(0, 0).unwrap().stitch_pos = Point2i::new(5, 7);
    set.tile_at_mut(0, 1).unwrap().stitch_pos = Point2i::new(5, 39);
    set.tile_at_mut(0, 0).unwrap().displacements[Direction::Down] = Point2i::new(0, 500);
    set.tile_at_mut(0, 1).unwrap().displacements[Direction::Up] = Point2i::new(0, -500);

    let sink = RecordingSink::new();
    let mut relax = RelaxationSolver::new();
    // Small grid: the sanity norm falls back to the mean over both edges.
    relax.setup(&set, 10.0, &sink).unwrap();
    assert!((relax.sanity_norm() - 500.0).abs() < 1e-9);

    // Shift both edge magnitudes far from the recorded norm so the gate
    // rejects them during the run.
    set.tile_at_mut(0, 0).unwrap().displacements[Direction::Down] = Point2i::new(0, 900);
    set.tile_at_mut(0, 1).unwrap().displacements[Direction::Up] = Point2i::new(0, -900);
    relax.run(&mut set, 1, &sink).unwrap();

    let warnings = sink
        .logs
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, message)| *level == LogLevel::Warn && message.contains("no valid"))
        .count();
    assert_eq!(warnings, 2);
    assert_eq!(set.tile_at(0, 0).unwrap().stitch_pos, Point2i::new(5, 7));
    assert_eq!(set.tile_at(0, 1).unwrap().stitch_pos, Point2i::new(5, 39));
}

#[test]
fn perturbed_tile_is_pulled_back() {
    let mut set = consistent_grid();
    // Nudge the center tile; its four consistent edges should pull it back
    // to the true position in one iteration.
    set.tile_at_mut(1, 1).unwrap().stitch_pos = Point2i::new(40, 27);

    let mut relax = RelaxationSolver::new();
    relax.setup(&set, 10.0, &NullSink).unwrap();
    relax.run(&mut set, 1, &NullSink).unwrap();

    assert_eq!(set.tile_at(1, 1).unwrap().stitch_pos, Point2i::new(32, 32));
}

#[test]
fn run_without_setup_is_an_error() {
    let mut set = consistent_grid();
    let mut relax = RelaxationSolver::new();
    assert!(matches!(
        relax.run(&mut set, 1, &NullSink),
        Err(StitchError::InvalidConfig { .. })
    ));
}
