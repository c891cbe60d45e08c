//! Grid-wide displacement sweeps.

mod common;

use std::path::Path;

use common::{identity_mosaic, MemorySource, RecordingSink};
use gridstitch::{
    apply_initial_grid, Direction, GuessMode, NullSink, OverlapConfig, OverlapSolver, Point2i,
    RelaxationSolver, Size2i, TileSource,
};

fn sweep_config(guess_mode: GuessMode) -> OverlapConfig {
    OverlapConfig {
        guess_mode,
        max_distance: 64.0,
        log_steps: 0,
        crop_size: Size2i::new(64, 64),
        range_h: Point2i::new(4, 4),
        range_v: Point2i::new(4, 4),
        ..OverlapConfig::default()
    }
}

fn assert_identity_displacements(set: &gridstitch::ScanSet) {
    for y in 0..3 {
        for x in 0..3 {
            let tile = set.tile_at(x, y).unwrap();
            if y < 2 {
                assert_eq!(
                    tile.displacements[Direction::Down],
                    Point2i::new(0, 32),
                    "down displacement at ({x}, {y})"
                );
            }
            if x < 2 {
                assert_eq!(
                    tile.displacements[Direction::Right],
                    Point2i::new(32, 0),
                    "right displacement at ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn sweeps_measure_exact_displacements_with_stage_guesses() {
    let (mut set, source) = identity_mosaic(64, 3, 32);
    let solver = OverlapSolver::new(sweep_config(GuessMode::Stage)).unwrap();

    solver.compute_overlaps_y(&mut set, &source, &NullSink).unwrap();
    solver.compute_overlaps_x(&mut set, &source, &NullSink).unwrap();
    assert_identity_displacements(&set);
}

#[test]
fn measured_edges_are_antisymmetric() {
    let (mut set, source) = identity_mosaic(64, 3, 32);
    let solver = OverlapSolver::new(sweep_config(GuessMode::Stage)).unwrap();
    solver.compute_overlaps_y(&mut set, &source, &NullSink).unwrap();
    solver.compute_overlaps_x(&mut set, &source, &NullSink).unwrap();

    for y in 0..3i32 {
        for x in 0..3i32 {
            let tile = set.tile_at(x, y).unwrap();
            for dir in Direction::ALL {
                if !set.has_neighbor(x, y, dir) {
                    continue;
                }
                let neighbor = set.neighbor_at(x, y, dir).unwrap();
                assert_eq!(
                    tile.displacements[dir],
                    -neighbor.displacements[dir.opposite()],
                    "edge ({x}, {y}) {dir:?}"
                );
            }
        }
    }
}

#[test]
fn result_guesses_use_seeded_positions() {
    let (mut set, source) = identity_mosaic(64, 3, 32);
    // Identity affine, stage in pixel units: seeding reproduces the true
    // layout, so result-mode guesses are exact.
    apply_initial_grid(&mut set).unwrap();
    let solver = OverlapSolver::new(sweep_config(GuessMode::Result)).unwrap();
    solver.compute_overlaps_y(&mut set, &source, &NullSink).unwrap();
    solver.compute_overlaps_x(&mut set, &source, &NullSink).unwrap();
    assert_identity_displacements(&set);
}

#[test]
fn fixed_guesses_negate_for_up_and_left() {
    let (set, source) = identity_mosaic(64, 3, 32);
    let cfg = OverlapConfig {
        guess_v: Point2i::new(0, 32),
        guess_h: Point2i::new(32, 0),
        ..sweep_config(GuessMode::Fixed)
    };
    let solver = OverlapSolver::new(cfg).unwrap();

    let (_, up) = solver
        .solve_edge(&set, &source, &NullSink, 1, 1, Direction::Up)
        .unwrap();
    assert_eq!(up, Point2i::new(0, -32));
    let (_, left) = solver
        .solve_edge(&set, &source, &NullSink, 1, 1, Direction::Left)
        .unwrap();
    assert_eq!(left, Point2i::new(-32, 0));
}

#[test]
fn unreadable_tile_reports_fatal_and_keeps_prior_displacements() {
    let (mut set, _) = identity_mosaic(64, 3, 32);
    // Rebuild the source without the center tile.
    let (_, full_source) = identity_mosaic(64, 3, 32);
    let mut source = MemorySource::new();
    for y in 0..3 {
        for x in 0..3 {
            if (x, y) == (1, 1) {
                continue;
            }
            let path = format!("tile_{x}_{y}.png");
            source.insert(path.as_str(), full_source.load(Path::new(&path)).unwrap());
        }
    }

    let sink = RecordingSink::new();
    let solver = OverlapSolver::new(sweep_config(GuessMode::Stage)).unwrap();
    solver.compute_overlaps_y(&mut set, &source, &sink).unwrap();
    solver.compute_overlaps_x(&mut set, &source, &sink).unwrap();

    // Two vertical and two horizontal edges touch the missing tile.
    assert_eq!(sink.fatals.lock().unwrap().len(), 4);
    // Their slots keep the prior (zero) value on both sides.
    let center = set.tile_at(1, 1).unwrap();
    for dir in Direction::ALL {
        assert_eq!(center.displacements[dir], Point2i::ZERO);
    }
    assert_eq!(
        set.tile_at(1, 0).unwrap().displacements[Direction::Down],
        Point2i::ZERO
    );
    // Edges not touching the missing tile still measured.
    assert_eq!(
        set.tile_at(0, 0).unwrap().displacements[Direction::Down],
        Point2i::new(0, 32)
    );
}

#[test]
fn relaxation_keeps_consistent_mosaic_in_place() {
    let (mut set, source) = identity_mosaic(64, 3, 32);
    let solver = OverlapSolver::new(sweep_config(GuessMode::Stage)).unwrap();
    solver.compute_overlaps_y(&mut set, &source, &NullSink).unwrap();
    solver.compute_overlaps_x(&mut set, &source, &NullSink).unwrap();
    apply_initial_grid(&mut set).unwrap();

    let mut relax = RelaxationSolver::new();
    relax.setup(&set, 10.0, &NullSink).unwrap();
    assert!((relax.sanity_norm() - 32.0).abs() < 1e-9);
    relax.run(&mut set, 5, &NullSink).unwrap();

    for y in 0..3i32 {
        for x in 0..3i32 {
            assert_eq!(
                set.tile_at(x, y).unwrap().stitch_pos,
                Point2i::new(32 * x, 32 * y),
                "position at ({x}, {y})"
            );
        }
    }
    assert_eq!(set.stitch_rect.tl(), Point2i::ZERO);
    assert_eq!(set.stitch_rect.br(), Point2i::new(64, 64));
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_sweeps_match_sequential() {
    let (mut seq_set, source) = identity_mosaic(64, 3, 32);
    let solver = OverlapSolver::new(sweep_config(GuessMode::Stage)).unwrap();
    solver
        .compute_overlaps_y(&mut seq_set, &source, &NullSink)
        .unwrap();
    solver
        .compute_overlaps_x(&mut seq_set, &source, &NullSink)
        .unwrap();

    let (mut par_set, source) = identity_mosaic(64, 3, 32);
    let cfg = OverlapConfig {
        parallel: true,
        ..sweep_config(GuessMode::Stage)
    };
    let par_solver = OverlapSolver::new(cfg).unwrap();
    par_solver
        .compute_overlaps_y(&mut par_set, &source, &NullSink)
        .unwrap();
    par_solver
        .compute_overlaps_x(&mut par_set, &source, &NullSink)
        .unwrap();

    for (a, b) in seq_set.tiles().iter().zip(par_set.tiles()) {
        assert_eq!(a.displacements, b.displacements);
    }
}

#[cfg(not(feature = "rayon"))]
#[test]
fn parallel_config_requires_the_rayon_feature() {
    let cfg = OverlapConfig {
        parallel: true,
        ..OverlapConfig::default()
    };
    assert!(matches!(
        OverlapSolver::new(cfg),
        Err(gridstitch::StitchError::ParallelUnavailable)
    ));
}
