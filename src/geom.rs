//! Integer and floating 2-vectors plus the rectangle type shared by the
//! solvers.
//!
//! Integer division on [`Point2i`] truncates toward zero componentwise,
//! which is what the hierarchical search relies on when mapping full-
//! resolution offsets onto a decimated level.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Integer pixel 2-vector.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point2i {
    pub x: i32,
    pub y: i32,
}

impl Point2i {
    pub const ZERO: Point2i = Point2i { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        let (x, y) = (f64::from(self.x), f64::from(self.y));
        (x * x + y * y).sqrt()
    }

    /// Componentwise minimum.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Componentwise maximum.
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn to_f64(self) -> Point2d {
        Point2d::new(f64::from(self.x), f64::from(self.y))
    }
}

impl Add for Point2i {
    type Output = Point2i;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2i {
    type Output = Point2i;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point2i {
    type Output = Point2i;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl AddAssign for Point2i {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Div<i32> for Point2i {
    type Output = Point2i;
    /// Componentwise truncating division.
    fn div(self, rhs: i32) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Mul<i32> for Point2i {
    type Output = Point2i;
    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Double-precision 2-vector for stage coordinates and relaxation math.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub const ZERO: Point2d = Point2d { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Rounds to the nearest integer vector, halves away from zero.
    pub fn round(self) -> Point2i {
        Point2i::new(self.x.round() as i32, self.y.round() as i32)
    }

    /// Componentwise minimum.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Componentwise maximum.
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

impl Add for Point2d {
    type Output = Point2d;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2d {
    type Output = Point2d;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl AddAssign for Point2d {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Mul<f64> for Point2d {
    type Output = Point2d;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point2d {
    type Output = Point2d;
    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

/// Width/height pair for crop windows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Size2i {
    pub width: i32,
    pub height: i32,
}

impl Size2i {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned integer rectangle, `[tl, br)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect2i {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect2i {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds the rectangle spanning `tl` (inclusive) to `br` (exclusive).
    pub fn from_corners(tl: Point2i, br: Point2i) -> Self {
        Self::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y)
    }

    pub fn tl(self) -> Point2i {
        Point2i::new(self.x, self.y)
    }

    pub fn br(self) -> Point2i {
        Point2i::new(self.x + self.width, self.y + self.height)
    }
}

/// 2x3 affine map from stage-coordinate deltas to pixel deltas.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine2x3 {
    pub m: [[f64; 3]; 2],
}

impl Affine2x3 {
    pub const IDENTITY: Affine2x3 = Affine2x3 {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    /// Applies the map to a point in homogeneous form `(x, y, 1)`.
    pub fn apply(&self, p: Point2d) -> Point2d {
        Point2d::new(
            self.m[0][0] * p.x + self.m[0][1] * p.y + self.m[0][2],
            self.m[1][0] * p.x + self.m[1][1] * p.y + self.m[1][2],
        )
    }

    /// Returns the inverse map, or `None` when the linear part is singular.
    pub fn invert(&self) -> Option<Affine2x3> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() < 1e-12 {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Affine2x3 {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }
}

impl Default for Affine2x3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}
