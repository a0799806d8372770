//! Axis-Aligned Bounding Boxes
//!
//! The geometric predicates consumed by the broad phase: union, containment,
//! overlap, area, merged area, and the centroid-proximity tie-break metric.

use crate::math::{Float, Vec2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box. Invariant: `lower <= upper` componentwise.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Lower-left corner.
    pub lower: Vec2,
    /// Upper-right corner.
    pub upper: Vec2,
}

impl Aabb {
    /// Create a box from corner vectors.
    #[inline]
    #[must_use]
    pub const fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Create a box from edge coordinates (left, bottom, right, top).
    #[inline]
    #[must_use]
    pub const fn from_edges(l: Float, b: Float, r: Float, t: Float) -> Self {
        Self {
            lower: Vec2::new(l, b),
            upper: Vec2::new(r, t),
        }
    }

    /// Box centered at `center` extending `radius` in every direction.
    #[inline]
    #[must_use]
    pub fn for_circle(center: Vec2, radius: Float) -> Self {
        let rv = Vec2::new(radius, radius);
        Self {
            lower: center - rv,
            upper: center + rv,
        }
    }

    /// `true` when `lower <= upper` componentwise.
    #[inline]
    #[must_use]
    pub fn valid(&self) -> bool {
        self.lower.x <= self.upper.x && self.lower.y <= self.upper.y
    }

    /// Center point.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Half-size on each axis.
    #[inline]
    #[must_use]
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Surface area (width times height).
    #[inline]
    #[must_use]
    pub fn area(&self) -> Float {
        (self.upper.x - self.lower.x) * (self.upper.y - self.lower.y)
    }

    /// Perimeter length.
    #[inline]
    #[must_use]
    pub fn perimeter(&self) -> Float {
        let w = self.upper - self.lower;
        2.0 * (w.x + w.y)
    }

    /// `true` if `other` fits entirely inside this box.
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.upper.x >= other.upper.x
            && self.lower.y <= other.lower.y
            && self.upper.y >= other.upper.y
    }

    /// `true` if the point lies inside (or on the boundary of) this box.
    #[inline]
    #[must_use]
    pub fn contains_vect(&self, v: Vec2) -> bool {
        self.lower.x <= v.x && self.upper.x >= v.x && self.lower.y <= v.y && self.upper.y >= v.y
    }

    /// Grow the box to also cover `v`.
    #[inline]
    #[must_use]
    pub fn expand(&self, v: Vec2) -> Aabb {
        Aabb {
            lower: self.lower.min(v),
            upper: self.upper.max(v),
        }
    }
}

/// Smallest box covering both `a` and `b`.
#[inline]
#[must_use]
pub fn combine(a: &Aabb, b: &Aabb) -> Aabb {
    Aabb {
        lower: a.lower.min(b.lower),
        upper: a.upper.max(b.upper),
    }
}

/// Area of the smallest box covering both `a` and `b`, without building it.
#[inline]
#[must_use]
pub fn merged_area(a: &Aabb, b: &Aabb) -> Float {
    let w = fmax(a.upper.x, b.upper.x) - fmin(a.lower.x, b.lower.x);
    let h = fmax(a.upper.y, b.upper.y) - fmin(a.lower.y, b.lower.y);
    w * h
}

/// Manhattan distance between box centroids, scaled by 2.
///
/// Used as the tie-break when two subtree insertions cost the same area.
#[inline]
#[must_use]
pub fn proximity(a: &Aabb, b: &Aabb) -> Float {
    fabs(a.lower.x + a.upper.x - b.lower.x - b.upper.x)
        + fabs(a.lower.y + a.upper.y - b.lower.y - b.upper.y)
}

/// `true` when the boxes overlap (boundary contact counts).
#[inline]
#[must_use]
pub fn test_overlap(a: &Aabb, b: &Aabb) -> bool {
    a.lower.x <= b.upper.x
        && b.lower.x <= a.upper.x
        && a.lower.y <= b.upper.y
        && b.lower.y <= a.upper.y
}

#[inline]
fn fmin(a: Float, b: Float) -> Float {
    if a < b {
        a
    } else {
        b
    }
}

#[inline]
fn fmax(a: Float, b: Float) -> Float {
    if a > b {
        a
    } else {
        b
    }
}

#[inline]
fn fabs(a: Float) -> Float {
    if a < 0.0 {
        -a
    } else {
        a
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_at(x: Float, y: Float) -> Aabb {
        Aabb::from_edges(x, y, x + 1.0, y + 1.0)
    }

    #[test]
    fn test_valid() {
        assert!(unit_at(0.0, 0.0).valid());
        let bad = Aabb::from_edges(1.0, 0.0, 0.0, 1.0);
        assert!(!bad.valid());
    }

    #[test]
    fn test_center_extents() {
        let bb = Aabb::from_edges(0.0, 0.0, 4.0, 2.0);
        assert_eq!(bb.center(), Vec2::new(2.0, 1.0));
        assert_eq!(bb.extents(), Vec2::new(2.0, 1.0));
    }

    #[test]
    fn test_area_perimeter() {
        let bb = Aabb::from_edges(0.0, 0.0, 4.0, 2.0);
        assert_eq!(bb.area(), 8.0);
        assert_eq!(bb.perimeter(), 12.0);
    }

    #[test]
    fn test_contains() {
        let outer = Aabb::from_edges(0.0, 0.0, 10.0, 10.0);
        let inner = Aabb::from_edges(2.0, 2.0, 8.0, 8.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        // A box contains itself.
        assert!(outer.contains(&outer));
    }

    #[test]
    fn test_contains_vect() {
        let bb = Aabb::from_edges(0.0, 0.0, 2.0, 2.0);
        assert!(bb.contains_vect(Vec2::new(1.0, 1.0)));
        assert!(bb.contains_vect(Vec2::new(0.0, 2.0)), "boundary counts");
        assert!(!bb.contains_vect(Vec2::new(3.0, 1.0)));
    }

    #[test]
    fn test_combine_and_merged_area() {
        let a = unit_at(0.0, 0.0);
        let b = unit_at(3.0, 3.0);
        let c = combine(&a, &b);
        assert_eq!(c.lower, Vec2::ZERO);
        assert_eq!(c.upper, Vec2::new(4.0, 4.0));
        assert_eq!(merged_area(&a, &b), c.area());
    }

    #[test]
    fn test_test_overlap() {
        let a = Aabb::from_edges(0.0, 0.0, 2.0, 2.0);
        let b = Aabb::from_edges(1.0, 1.0, 3.0, 3.0);
        let c = Aabb::from_edges(5.0, 5.0, 6.0, 6.0);
        assert!(test_overlap(&a, &b));
        assert!(!test_overlap(&a, &c));
        // Edge touching counts as overlap.
        let d = Aabb::from_edges(2.0, 0.0, 4.0, 2.0);
        assert!(test_overlap(&a, &d));
    }

    #[test]
    fn test_proximity_prefers_closer() {
        let leaf = unit_at(0.0, 0.0);
        let near = unit_at(1.0, 0.0);
        let far = unit_at(10.0, 0.0);
        assert!(proximity(&leaf, &near) < proximity(&leaf, &far));
    }

    #[test]
    fn test_expand() {
        let bb = unit_at(0.0, 0.0);
        let grown = bb.expand(Vec2::new(-1.0, 5.0));
        assert_eq!(grown.lower, Vec2::new(-1.0, 0.0));
        assert_eq!(grown.upper, Vec2::new(1.0, 5.0));
    }

    #[test]
    fn test_for_circle() {
        let bb = Aabb::for_circle(Vec2::new(1.0, 2.0), 3.0);
        assert_eq!(bb.lower, Vec2::new(-2.0, -1.0));
        assert_eq!(bb.upper, Vec2::new(4.0, 5.0));
    }
}
