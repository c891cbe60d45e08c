//! Overlap scoring for a candidate displacement.
//!
//! The score is the overlap area divided by the L2 pixel difference raised
//! to 3.3. The exponent sharpens the peak so the exhaustive search locks
//! onto the true offset; the area factor keeps corner slivers from winning
//! on a tiny denominator. Higher is better.

use crate::geom::{Point2i, Rect2i};
use crate::image::ImageView;

/// Sentinel score for displacements that cannot be ranked: an empty
/// intersection, or a zero pixel difference. The search driver compares
/// candidates with plain `>`, so the sentinel dominates any real score.
pub const BAD_SCORE: f32 = 1e29;

/// Exponent applied to the L2 difference norm. Empirical; fixed.
const NORM_EXPONENT: f64 = 3.3;

fn clamp_to(bounds: Rect2i, p: Point2i) -> Point2i {
    bounds.tl().max(bounds.br().min(p))
}

/// Computes the congruent sub-rectangles of `a` and `b` that overlap when
/// `b` is placed at offset `dr` relative to `a`.
///
/// Returns `None` when the shifted rectangles do not intersect.
pub fn overlap_roi<'a>(
    a: ImageView<'a>,
    b: ImageView<'a>,
    dr: Point2i,
) -> Option<(ImageView<'a>, ImageView<'a>)> {
    let size_a = Point2i::new(a.width() as i32, a.height() as i32);
    let size_b = Point2i::new(b.width() as i32, b.height() as i32);
    let bounds_a = Rect2i::new(0, 0, size_a.x, size_a.y);
    let bounds_b = Rect2i::new(0, 0, size_b.x, size_b.y);

    let start_a = dr.max(Point2i::ZERO);
    let start_b = (-dr).max(Point2i::ZERO);
    let end_a = clamp_to(bounds_a, start_a + size_b - start_b);
    let end_b = clamp_to(bounds_b, start_b + size_a - start_a);

    let roi_a = Rect2i::from_corners(start_a, end_a);
    let roi_b = Rect2i::from_corners(start_b, end_b);

    if roi_a.width != roi_b.width
        || roi_a.height != roi_b.height
        || roi_a.width <= 0
        || roi_a.height <= 0
    {
        return None;
    }

    let va = a
        .roi(
            roi_a.x as usize,
            roi_a.y as usize,
            roi_a.width as usize,
            roi_a.height as usize,
        )
        .ok()?;
    let vb = b
        .roi(
            roi_b.x as usize,
            roi_b.y as usize,
            roi_b.width as usize,
            roi_b.height as usize,
        )
        .ok()?;
    Some((va, vb))
}

/// Scores placing `b` at offset `dr` relative to `a`.
///
/// Returns [`BAD_SCORE`] for an empty intersection or a zero difference
/// norm.
pub fn score_overlap(a: ImageView<'_>, b: ImageView<'_>, dr: Point2i) -> f32 {
    let Some((roi_a, roi_b)) = overlap_roi(a, b, dr) else {
        return BAD_SCORE;
    };

    let mut sq_sum = 0.0f64;
    for y in 0..roi_a.height() {
        let row_a = roi_a.row(y).expect("roi row in bounds");
        let row_b = roi_b.row(y).expect("roi row in bounds");
        for (&pa, &pb) in row_a.iter().zip(row_b) {
            let d = f64::from(pa) - f64::from(pb);
            sq_sum += d * d;
        }
    }

    let norm = sq_sum.sqrt();
    if norm <= 0.0 {
        return BAD_SCORE;
    }

    let area = (roi_a.width() * roi_a.height()) as f64;
    (area / norm.powf(NORM_EXPONENT)) as f32
}
