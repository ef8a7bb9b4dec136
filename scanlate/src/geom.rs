//! Geometry for OCR text regions.

use std::cmp::{max, min};

use serde::{Deserialize, Serialize};

/// A point in image pixel space.
///
/// Serialized as a two-element array, matching the `[[x, y], ...]`
/// polygons produced by OCR detectors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    /// Horizontal coordinate, in pixels.
    pub x: i32,
    /// Vertical coordinate, in pixels.
    pub y: i32,
}

impl Point {
    /// Create a new point.
    pub fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Point {
        Point { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> (i32, i32) {
        (p.x, p.y)
    }
}

/// An axis-aligned rectangle in image pixel space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rect {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
}

impl Rect {
    /// Create a rectangle by specifying the left, top, width and height
    /// values. Panics if the width or height is negative.
    pub fn ltwh(l: i32, t: i32, w: i32, h: i32) -> Rect {
        assert!(w >= 0, "rectangle has negative width");
        assert!(h >= 0, "rectangle has negative height");
        Rect {
            left: l,
            top: t,
            width: w,
            height: h,
        }
    }

    /// Create a rectangle from left and top (inclusive) and right and
    /// bottom (exclusive) coordinates. Panics if the rectangle has
    /// negative height or width.
    pub fn ltrb(l: i32, t: i32, r: i32, b: i32) -> Rect {
        Rect::ltwh(l, t, r - l, b - t)
    }

    /// The bounding box of a set of points, or `None` if the set is
    /// empty.
    pub fn bounding(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let mut l = first.x;
        let mut t = first.y;
        let mut r = first.x;
        let mut b = first.y;
        for p in &points[1..] {
            l = min(l, p.x);
            t = min(t, p.y);
            r = max(r, p.x);
            b = max(b, p.y);
        }
        Some(Rect::ltrb(l, t, r, b))
    }

    /// The left-most edge of the rectangle (inclusive).
    pub fn left(&self) -> i32 {
        self.left
    }

    /// The top-most edge of the rectangle (inclusive).
    pub fn top(&self) -> i32 {
        self.top
    }

    /// The right-most edge of the rectangle (exclusive).
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    /// The bottom-most edge of the rectangle (exclusive).
    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// The width of the rectangle.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// The height of the rectangle.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Does this rectangle have area zero?
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Return a rectangle including all the area included by this
    /// rectangle and another. If either rectangle has zero area, it
    /// will be excluded.
    pub fn union(&self, other: &Rect) -> Rect {
        if other.is_empty() {
            self.to_owned()
        } else if self.is_empty() {
            other.to_owned()
        } else {
            Rect::ltrb(
                min(self.left, other.left),
                min(self.top, other.top),
                max(self.right(), other.right()),
                max(self.bottom(), other.bottom()),
            )
        }
    }

    /// Do the vertical extents of two rectangles overlap? Text
    /// fragments on the same line satisfy this.
    pub fn overlaps_vertically(&self, other: &Rect) -> bool {
        self.top < other.bottom() && other.top < self.bottom()
    }

    /// The axis-aligned gap between two rectangles, in pixels.
    ///
    /// This is the horizontal gap when the rectangles overlap
    /// vertically, the vertical gap when they overlap horizontally,
    /// and the Euclidean combination of both gaps when they're
    /// diagonal neighbors. Overlapping or touching rectangles have a
    /// gap of zero.
    pub fn gap_to(&self, other: &Rect) -> f64 {
        let dx = max(0, max(other.left - self.right(), self.left - other.right()));
        let dy = max(0, max(other.top - self.bottom(), self.top - other.bottom()));
        if dx == 0 {
            f64::from(dy)
        } else if dy == 0 {
            f64::from(dx)
        } else {
            f64::from(dx).hypot(f64::from(dy))
        }
    }

    /// The four corners of this rectangle, clockwise from the top
    /// left. This is the polygon form we store on merged text rows.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right(), self.top),
            Point::new(self.right(), self.bottom()),
            Point::new(self.left, self.bottom()),
        ]
    }
}
