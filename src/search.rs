//! Coarse-to-fine displacement search.
//!
//! A single pass evaluates the overlap score on a decimated image pair at
//! every offset of a strided window; the driver repeats passes from the
//! coarsest decimation down to full resolution, re-centering the window on
//! the running best and shrinking it between passes. Each pass costs
//! roughly the same number of evaluations regardless of decimation.

use crate::geom::Point2i;
use crate::image::{resample::downscale, ImageView};
use crate::score::score_overlap;

/// Window shrink applied between search passes.
///
/// [`RangeShrink::Quarter`] is the production mode. [`RangeShrink::Third`]
/// is retained for calibrations persisted by older pipelines whose values
/// depend on the wider intermediate windows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RangeShrink {
    #[default]
    Quarter,
    Third,
}

impl RangeShrink {
    fn apply(self, range: Point2i) -> Point2i {
        let divisor = match self {
            RangeShrink::Quarter => 4,
            RangeShrink::Third => 3,
        };
        range / divisor + Point2i::new(1, 1)
    }
}

/// Best offset found by a search pass, with its score.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub offset: Point2i,
    pub score: f32,
}

/// Exhaustively scores the window `guess ± range` at one decimation level.
///
/// Candidates step by `decimate` in each axis and are scored on the
/// decimated pair at the truncated offset `candidate / decimate`; the
/// reported offset stays in full-resolution pixels. The first encountered
/// maximum wins. When nothing scores above zero the offset falls back to
/// the guess.
pub fn best_overlap_at_scale(
    a: ImageView<'_>,
    b: ImageView<'_>,
    guess: Point2i,
    range: Point2i,
    decimate: i32,
) -> SearchHit {
    debug_assert!(decimate >= 1);

    let (dec_a, dec_b);
    let (va, vb) = if decimate > 1 {
        dec_a = downscale(a, decimate);
        dec_b = downscale(b, decimate);
        (dec_a.view(), dec_b.view())
    } else {
        (a, b)
    };

    let mut best = SearchHit {
        offset: guess,
        score: 0.0,
    };
    for dx in (guess.x - range.x..=guess.x + range.x).step_by(decimate as usize) {
        for dy in (guess.y - range.y..=guess.y + range.y).step_by(decimate as usize) {
            let pos = Point2i::new(dx, dy);
            let score = score_overlap(va, vb, pos / decimate);
            if score > best.score {
                best = SearchHit { offset: pos, score };
            }
        }
    }
    best
}

/// Runs the hierarchical search: passes at decimation `2^log_d` down to 1.
///
/// After each pass the window re-centers on the best offset and shrinks by
/// the selected mode (never below `(1, 1)`). Returns the full-resolution
/// pass result. Both views must already be in `f32` (tile sources convert
/// at decode time).
pub fn refine_overlap(
    a: ImageView<'_>,
    b: ImageView<'_>,
    guess: Point2i,
    range: Point2i,
    log_d: u32,
    shrink: RangeShrink,
) -> SearchHit {
    let mut guess = guess;
    let mut range = range;
    let mut hit = SearchHit {
        offset: guess,
        score: 0.0,
    };

    for s in (0..=log_d).rev() {
        hit = best_overlap_at_scale(a, b, guess, range, 1 << s);
        guess = hit.offset;
        range = shrink.apply(range);
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::{best_overlap_at_scale, refine_overlap, RangeShrink};
    use crate::geom::Point2i;
    use crate::image::OwnedImage;

    #[test]
    fn shrink_modes_match_their_divisors() {
        let range = Point2i::new(9, 9);
        assert_eq!(RangeShrink::Quarter.apply(range), Point2i::new(3, 3));
        assert_eq!(RangeShrink::Third.apply(range), Point2i::new(4, 4));
        // Never below (1, 1).
        assert_eq!(RangeShrink::Quarter.apply(Point2i::ZERO), Point2i::new(1, 1));
    }

    #[test]
    fn zero_range_scores_only_the_guess() {
        let a = OwnedImage::from_vec((0..64).map(|v| v as f32).collect(), 8, 8).unwrap();
        let b = OwnedImage::from_vec((0..64).map(|v| (v * 2) as f32).collect(), 8, 8).unwrap();
        let hit = best_overlap_at_scale(a.view(), b.view(), Point2i::new(2, 1), Point2i::ZERO, 1);
        assert_eq!(hit.offset, Point2i::new(2, 1));
    }

    #[test]
    fn single_level_matches_exhaustive_scan() {
        let canvas: Vec<f32> = (0..32 * 32)
            .map(|i| {
                let (x, y) = (i % 32, i / 32);
                ((x * 13) ^ (y * 7) ^ (x * y)) as f32
            })
            .collect();
        let canvas = OwnedImage::from_vec(canvas, 32, 32).unwrap();

        let hit = refine_overlap(
            canvas.view(),
            canvas.view(),
            Point2i::new(1, -2),
            Point2i::new(3, 3),
            0,
            RangeShrink::Quarter,
        );
        let exhaustive = best_overlap_at_scale(
            canvas.view(),
            canvas.view(),
            Point2i::new(1, -2),
            Point2i::new(3, 3),
            1,
        );
        assert_eq!(hit, exhaustive);
    }
}
