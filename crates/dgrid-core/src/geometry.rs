#![forbid(unsafe_code)]

//! Geometric primitives.
//!
//! Workspace coordinates are real-valued with the origin at the top-left
//! corner of the container. Boxes are half-open: a box covers
//! `[x, x + width) × [y, y + height)`, so two boxes that merely touch along
//! an edge do not overlap.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point in workspace coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// The workspace origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offset this position by a delta.
    #[inline]
    #[must_use]
    pub fn offset(self, delta: Delta) -> Self {
        Self::new(self.x + delta.dx, self.y + delta.dy)
    }

    /// Delta that moves `from` onto `self`.
    #[inline]
    #[must_use]
    pub fn delta_from(self, from: Position) -> Delta {
        Delta::new(self.x - from.x, self.y - from.y)
    }

    /// Euclidean distance to another position.
    #[inline]
    #[must_use]
    pub fn distance(self, other: Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Both coordinates are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Width and height of a box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Area in square units.
    #[inline]
    pub fn area(self) -> f64 {
        self.width * self.height
    }

    /// Width divided by height, or `None` for a zero height.
    #[inline]
    pub fn aspect_ratio(self) -> Option<f64> {
        (self.height != 0.0).then(|| self.width / self.height)
    }

    /// True when either dimension is zero or negative.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Both dimensions are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.width.is_finite() && self.height.is_finite()
    }

    /// Component-wise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }

    /// Component-wise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, other: Size) -> Size {
        Size::new(self.width.max(other.width), self.height.max(other.height))
    }
}

/// A relative movement, e.g. a pointer delta.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Delta {
    pub dx: f64,
    pub dy: f64,
}

impl Delta {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[inline]
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Vector sum.
    #[inline]
    #[must_use]
    pub fn add(self, other: Delta) -> Delta {
        Delta::new(self.dx + other.dx, self.dy + other.dy)
    }

    /// Multiply both components.
    #[inline]
    #[must_use]
    pub fn scale(self, factor: f64) -> Delta {
        Delta::new(self.dx * factor, self.dy * factor)
    }

    /// Euclidean length.
    #[inline]
    pub fn length(self) -> f64 {
        self.dx.hypot(self.dy)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Left edge (inclusive).
    pub x: f64,
    /// Top edge (inclusive).
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box with the given origin and size.
    #[inline]
    pub const fn from_parts(position: Position, size: Size) -> Self {
        Self::new(position.x, position.y, size.width, size.height)
    }

    /// Box anchored at the origin.
    #[inline]
    pub const fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    #[inline]
    pub const fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    #[inline]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub const fn left(&self) -> f64 {
        self.x
    }

    #[inline]
    pub const fn top(&self) -> f64 {
        self.y
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// All four components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.position().is_finite() && self.size().is_finite()
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Position {
        Position::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if a point is inside the box.
    #[inline]
    pub fn contains_point(&self, point: Position) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Check if `other` lies entirely inside this box.
    #[inline]
    pub fn contains(&self, other: &Bounds) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Strict overlap test. Boxes sharing only an edge do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Compute the intersection with another box, returning `None` if no overlap.
    #[inline]
    pub fn intersection_opt(&self, other: &Bounds) -> Option<Bounds> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(Bounds::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Bounds::new(x, y, right - x, bottom - y)
    }

    /// Grow the box by `amount` on every side.
    #[must_use]
    pub fn inflate(&self, amount: f64) -> Bounds {
        Bounds::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    /// Same size, different origin.
    #[must_use]
    pub fn with_position(&self, position: Position) -> Bounds {
        Bounds::from_parts(position, self.size())
    }

    /// Same origin, different size.
    #[must_use]
    pub fn with_size(&self, size: Size) -> Bounds {
        Bounds::from_parts(self.position(), size)
    }

    /// Translate by a delta.
    #[must_use]
    pub fn translate(&self, delta: Delta) -> Bounds {
        self.with_position(self.position().offset(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_exclusive() {
        let b = Bounds::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(b.right(), 40.0);
        assert_eq!(b.bottom(), 60.0);
        assert!(b.contains_point(Position::new(10.0, 20.0)));
        assert!(!b.contains_point(Position::new(40.0, 20.0)));
        assert!(!b.contains_point(Position::new(10.0, 60.0)));
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let b = Bounds::new(100.0, 0.0, 50.0, 50.0);
        assert!(!a.intersects(&b));
        assert!(a.intersection_opt(&b).is_none());
    }

    #[test]
    fn intersection_of_overlapping_boxes() {
        let a = Bounds::new(100.0, 100.0, 200.0, 150.0);
        let b = Bounds::new(150.0, 125.0, 200.0, 150.0);
        assert!(a.intersects(&b));
        assert_eq!(
            a.intersection_opt(&b),
            Some(Bounds::new(150.0, 125.0, 150.0, 125.0))
        );
    }

    #[test]
    fn union_covers_both() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(20.0, 5.0, 10.0, 20.0);
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u, Bounds::new(0.0, 0.0, 30.0, 25.0));
    }

    #[test]
    fn inflate_grows_every_side() {
        let b = Bounds::new(10.0, 10.0, 20.0, 20.0).inflate(5.0);
        assert_eq!(b, Bounds::new(5.0, 5.0, 30.0, 30.0));
    }

    #[test]
    fn aspect_ratio_rejects_zero_height() {
        assert_eq!(Size::new(10.0, 0.0).aspect_ratio(), None);
        assert_eq!(Size::new(16.0, 9.0).aspect_ratio(), Some(16.0 / 9.0));
    }

    #[test]
    fn delta_round_trip() {
        let start = Position::new(5.0, 7.0);
        let end = Position::new(25.0, -3.0);
        let delta = end.delta_from(start);
        assert_eq!(start.offset(delta), end);
        assert_eq!(delta.add(Delta::new(1.0, 1.0)), Delta::new(21.0, -9.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_field_names_are_stable() {
        let json = serde_json::to_value(Bounds::new(1.0, 2.0, 3.0, 4.0)).expect("serialize");
        assert_eq!(json["x"], serde_json::json!(1.0));
        assert_eq!(json["height"], serde_json::json!(4.0));
    }
}
