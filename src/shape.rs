//! Collision Shapes
//!
//! Geometry attached to rigid bodies. Four variants — circle, segment,
//! convex polygon, and box (a polygon specialization) — behind a closed
//! enum, plus the shared [`Shape`] wrapper that carries material, filtering,
//! the sensor flag, and the stable hash used as the broad-phase key.
//!
//! Each variant caches its world-space data (`tc`, `ta`/`tb`/`tn`,
//! `t_verts`/`t_axes`); [`Shape::update`] refreshes the cache from the
//! owning body's transform and returns the new bounding box.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::sync::atomic::{AtomicU32, Ordering};

use crate::aabb::Aabb;
use crate::contact::HashValue;
use crate::filter::CollisionFilter;
use crate::math::{Float, Transform, Vec2};

/// Process-wide shape hash counter. Initialized to 1, never reused.
static HASH_COUNTER: AtomicU32 = AtomicU32::new(1);

fn next_hash() -> HashValue {
    let hash = HASH_COUNTER.fetch_add(1, Ordering::Relaxed);
    if hash == 0 {
        panic!("shape hash counter overflowed");
    }
    hash
}

// ============================================================================
// ShapeType
// ============================================================================

/// Shape type rank, used to canonicalize narrow-phase pairs.
///
/// The dispatch table is triangular: handlers exist only for ordered pairs
/// `(a, b)` with `a.rank() <= b.rank()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShapeType {
    /// Circle with an optional local offset.
    Circle = 0,
    /// Thick line segment.
    Segment = 1,
    /// Convex polygon.
    Polygon = 2,
    /// Box (polygon specialization).
    Box = 3,
}

impl ShapeType {
    /// Numeric rank used for dispatch-table indexing.
    #[inline]
    #[must_use]
    pub const fn rank(self) -> usize {
        self as usize
    }
}

// ============================================================================
// CircleShape
// ============================================================================

/// Circle defined by a local-space center and a radius.
#[derive(Clone, Debug)]
pub struct CircleShape {
    /// Center of the circle in body-local space.
    pub offset: Vec2,
    /// Radius of the circle.
    pub radius: Float,
    /// World-space center, refreshed by `update`.
    pub tc: Vec2,
}

impl CircleShape {
    fn update(&mut self, xf: Transform) -> Aabb {
        self.tc = xf.transform_vect(self.offset);
        Aabb::for_circle(self.tc, self.radius)
    }

    fn moment(&self, mass: Float) -> Float {
        // Only the radius term scales with mass; the local-offset term is
        // added as-is.
        mass * (0.5 * self.radius * self.radius) + self.offset.length_sq()
    }

    fn test_point(&self, point: Vec2) -> bool {
        let d = point - self.tc;
        d.dot(d) <= self.radius * self.radius
    }
}

// ============================================================================
// SegmentShape
// ============================================================================

/// Thick line segment from `a` to `b`.
#[derive(Clone, Debug)]
pub struct SegmentShape {
    /// Start point in body-local space.
    pub a: Vec2,
    /// End point in body-local space.
    pub b: Vec2,
    /// Thickness radius of the segment.
    pub radius: Float,

    /// Local-space normal, refreshed by `update`.
    pub n: Vec2,
    /// World-space normal.
    pub tn: Vec2,
    /// World-space start point.
    pub ta: Vec2,
    /// World-space end point.
    pub tb: Vec2,

    /// Tangent at `a` when chained with a neighboring segment.
    /// Zero (the default) accepts every endpoint contact.
    pub a_tangent: Vec2,
    /// Tangent at `b` when chained with a neighboring segment.
    pub b_tangent: Vec2,
}

impl SegmentShape {
    fn update(&mut self, xf: Transform) -> Aabb {
        self.ta = xf.transform_vect(self.a);
        self.tb = xf.transform_vect(self.b);
        self.n = (self.b - self.a).normalize().perp();
        self.tn = xf.rotate_vect(self.n);

        let rv = Vec2::new(self.radius, self.radius);
        Aabb {
            lower: self.ta.min(self.tb) - rv,
            upper: self.ta.max(self.tb) + rv,
        }
    }

    fn moment(&self, mass: Float) -> Float {
        let length_sq = (self.b - self.a).length_sq();
        let center = (self.a + self.b) * 0.5;
        mass * (length_sq / 12.0 + center.length_sq())
    }
}

// ============================================================================
// PolygonShape
// ============================================================================

/// One face axis of a polygon: outward normal `n` and plane offset `d`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolygonAxis {
    /// Outward face normal.
    pub n: Vec2,
    /// Signed plane offset: `dot(n, v) == d` for points on the face.
    pub d: Float,
}

/// Convex polygon. Vertices must wind clockwise.
#[derive(Clone, Debug, Default)]
pub struct PolygonShape {
    /// Body-local vertices.
    pub verts: Vec<Vec2>,
    /// World-space vertices, refreshed by `update`.
    pub t_verts: Vec<Vec2>,
    /// Body-local face axes.
    pub axes: Vec<PolygonAxis>,
    /// World-space face axes.
    pub t_axes: Vec<PolygonAxis>,
}

/// Check that `verts` forms a convex, clockwise-wound polygon.
#[must_use]
pub fn validate_polygon(verts: &[Vec2]) -> bool {
    let n = verts.len();
    for i in 0..n {
        let a = verts[i];
        let b = verts[(i + 1) % n];
        let c = verts[(i + 2) % n];
        if (b - a).cross(c - b) > 0.0 {
            return false;
        }
    }
    true
}

impl PolygonShape {
    /// Build from vertices translated by `offset`, computing the face axes.
    pub fn set_verts(&mut self, verts: &[Vec2], offset: Vec2) {
        if !validate_polygon(verts) {
            log::warn!("polygon vertices are not convex or not wound clockwise");
        }

        let num = verts.len();
        self.verts.clear();
        self.axes.clear();
        self.verts.reserve(num);
        self.axes.reserve(num);

        for i in 0..num {
            let a = offset + verts[i];
            let b = offset + verts[(i + 1) % num];
            let n = (b - a).perp().normalize();

            self.verts.push(a);
            self.axes.push(PolygonAxis { n, d: n.dot(a) });
        }

        self.t_verts.clear();
        self.t_verts.resize(num, Vec2::ZERO);
        self.t_axes.clear();
        self.t_axes.resize(num, PolygonAxis::default());
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    fn update(&mut self, xf: Transform) -> Aabb {
        for (dst, src) in self.t_axes.iter_mut().zip(self.axes.iter()) {
            let n = xf.rotate_vect(src.n);
            dst.n = n;
            dst.d = xf.position.dot(n) + src.d;
        }

        let mut bb = Aabb {
            lower: Vec2::new(Float::INFINITY, Float::INFINITY),
            upper: Vec2::new(-Float::INFINITY, -Float::INFINITY),
        };
        for (dst, src) in self.t_verts.iter_mut().zip(self.verts.iter()) {
            let v = xf.transform_vect(*src);
            *dst = v;
            bb.lower = bb.lower.min(v);
            bb.upper = bb.upper.max(v);
        }
        bb
    }

    fn moment(&self, mass: Float) -> Float {
        if self.verts.len() < 3 {
            return 0.0;
        }
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let n = self.verts.len();
        for i in 0..n {
            let a = self.verts[i];
            let b = self.verts[(i + 1) % n];
            let cross = a.cross(b).abs();
            numerator += cross * (a.dot(a) + a.dot(b) + b.dot(b));
            denominator += cross;
        }
        if denominator == 0.0 {
            return 0.0;
        }
        mass * numerator / (6.0 * denominator)
    }

    /// `true` if the world-space point is inside every face plane.
    #[must_use]
    pub fn contains_vert(&self, v: Vec2) -> bool {
        for axis in &self.t_axes {
            if axis.n.dot(v) - axis.d > 0.0 {
                return false;
            }
        }
        true
    }

    /// Containment restricted to the faces whose normal points along `n`.
    #[must_use]
    pub fn contains_vert_partial(&self, v: Vec2, n: Vec2) -> bool {
        for axis in &self.t_axes {
            if axis.n.dot(n) < 0.0 {
                continue;
            }
            if axis.n.dot(v) - axis.d > 0.0 {
                return false;
            }
        }
        true
    }

    /// Minimum signed distance of the polygon's vertices to the plane `(n, d)`.
    #[must_use]
    pub fn value_on_axis(&self, n: Vec2, d: Float) -> Float {
        let mut min = n.dot(self.t_verts[0]);
        for v in &self.t_verts[1..] {
            let dist = n.dot(*v);
            if dist < min {
                min = dist;
            }
        }
        min - d
    }
}

// ============================================================================
// BoxShape
// ============================================================================

/// Axis-aligned box in body-local space; a convenience polygon wrapper.
#[derive(Clone, Debug)]
pub struct BoxShape {
    /// Width of the box.
    pub width: Float,
    /// Height of the box.
    pub height: Float,
    /// Center of the box in body-local space.
    pub offset: Vec2,
    /// The polygon that represents this box.
    pub poly: PolygonShape,
}

impl BoxShape {
    fn new(offset: Vec2, width: Float, height: Float) -> Self {
        let mut shape = Self {
            width,
            height,
            offset,
            poly: PolygonShape::default(),
        };
        shape.update_poly();
        shape
    }

    /// Rebuild the internal polygon after changing width, height, or offset.
    pub fn update_poly(&mut self) {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let verts = [
            Vec2::new(-hw, -hh),
            Vec2::new(-hw, hh),
            Vec2::new(hw, hh),
            Vec2::new(hw, -hh),
        ];
        self.poly.set_verts(&verts, self.offset);
    }
}

/// Moment of inertia of a solid box.
#[inline]
#[must_use]
pub fn box_moment(mass: Float, width: Float, height: Float) -> Float {
    mass * (width * width + height * height) / 12.0
}

// ============================================================================
// ShapeKind & Shape
// ============================================================================

/// Closed set of shape geometries.
#[derive(Clone, Debug)]
pub enum ShapeKind {
    /// Circle geometry.
    Circle(CircleShape),
    /// Segment geometry.
    Segment(SegmentShape),
    /// Convex polygon geometry.
    Polygon(PolygonShape),
    /// Box geometry.
    Box(BoxShape),
}

/// Geometry plus the per-shape simulation state: material, filtering,
/// sensor flag, cached bounding box, and the stable hash.
#[derive(Clone, Debug)]
pub struct Shape {
    /// The geometry variant.
    pub kind: ShapeKind,
    /// Current world-space bounding box, refreshed by [`Shape::update`].
    pub bb: Aabb,
    /// Sensor shapes call collision callbacks but produce no impulses.
    pub is_sensor: bool,
    /// Coefficient of restitution (elasticity), combined multiplicatively.
    pub e: Float,
    /// Coefficient of friction, combined multiplicatively.
    pub u: Float,
    /// Surface velocity used when solving friction.
    pub surface_v: Vec2,
    /// Group/layer collision filter.
    pub filter: CollisionFilter,
    /// Whether the broad phase should expand this shape's box by velocity.
    pub velocity_indexed: bool,
    hash: HashValue,
}

impl Shape {
    fn from_kind(kind: ShapeKind) -> Self {
        Self {
            kind,
            bb: Aabb::default(),
            is_sensor: false,
            e: 0.5,
            u: 0.5,
            surface_v: Vec2::ZERO,
            filter: CollisionFilter::DEFAULT,
            velocity_indexed: true,
            hash: next_hash(),
        }
    }

    /// Create a circle shape with the given local center and radius.
    #[must_use]
    pub fn new_circle(offset: Vec2, radius: Float) -> Self {
        Self::from_kind(ShapeKind::Circle(CircleShape {
            offset,
            radius,
            tc: Vec2::ZERO,
        }))
    }

    /// Create a segment shape between two local points with a thickness radius.
    #[must_use]
    pub fn new_segment(a: Vec2, b: Vec2, radius: Float) -> Self {
        Self::from_kind(ShapeKind::Segment(SegmentShape {
            a,
            b,
            radius,
            n: Vec2::ZERO,
            tn: Vec2::ZERO,
            ta: Vec2::ZERO,
            tb: Vec2::ZERO,
            a_tangent: Vec2::ZERO,
            b_tangent: Vec2::ZERO,
        }))
    }

    /// Create a convex polygon shape from clockwise vertices offset by `offset`.
    #[must_use]
    pub fn new_polygon(verts: &[Vec2], offset: Vec2) -> Self {
        let mut poly = PolygonShape::default();
        poly.set_verts(verts, offset);
        Self::from_kind(ShapeKind::Polygon(poly))
    }

    /// Create a box shape centered at `offset`.
    #[must_use]
    pub fn new_box(offset: Vec2, width: Float, height: Float) -> Self {
        Self::from_kind(ShapeKind::Box(BoxShape::new(offset, width, height)))
    }

    /// Stable per-instance hash, the broad-phase key.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> HashValue {
        self.hash
    }

    /// Shape type rank for narrow-phase canonicalization.
    #[inline]
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match &self.kind {
            ShapeKind::Circle(_) => ShapeType::Circle,
            ShapeKind::Segment(_) => ShapeType::Segment,
            ShapeKind::Polygon(_) => ShapeType::Polygon,
            ShapeKind::Box(_) => ShapeType::Box,
        }
    }

    /// Current world-space bounding box.
    #[inline]
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        self.bb
    }

    /// Recompute world-space caches from the body transform; returns and
    /// stores the new bounding box.
    pub fn update(&mut self, xf: Transform) -> Aabb {
        self.bb = match &mut self.kind {
            ShapeKind::Circle(circle) => circle.update(xf),
            ShapeKind::Segment(segment) => segment.update(xf),
            ShapeKind::Polygon(poly) => poly.update(xf),
            ShapeKind::Box(b) => b.poly.update(xf),
        };
        self.bb
    }

    /// Moment of inertia contribution for the given mass.
    #[must_use]
    pub fn moment(&self, mass: Float) -> Float {
        match &self.kind {
            ShapeKind::Circle(circle) => circle.moment(mass),
            ShapeKind::Segment(segment) => segment.moment(mass),
            ShapeKind::Polygon(poly) => poly.moment(mass),
            ShapeKind::Box(b) => box_moment(mass, b.width, b.height),
        }
    }

    /// `true` if the world-space point lies inside the shape.
    ///
    /// Segments report `false`; a thick segment has no useful interior.
    #[must_use]
    pub fn test_point(&self, point: Vec2) -> bool {
        match &self.kind {
            ShapeKind::Circle(circle) => circle.test_point(point),
            ShapeKind::Segment(_) => false,
            ShapeKind::Polygon(poly) => poly.contains_vert(point),
            ShapeKind::Box(b) => b.poly.contains_vert(point),
        }
    }

    /// Set friction.
    #[inline]
    pub fn set_friction(&mut self, u: Float) {
        self.u = u;
    }

    /// Set elasticity.
    #[inline]
    pub fn set_elasticity(&mut self, e: Float) {
        self.e = e;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_unique_and_nonzero() {
        let a = Shape::new_circle(Vec2::ZERO, 1.0);
        let b = Shape::new_circle(Vec2::ZERO, 1.0);
        assert_ne!(a.hash(), 0);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_shape_type_ranks() {
        assert!(ShapeType::Circle < ShapeType::Segment);
        assert!(ShapeType::Segment < ShapeType::Polygon);
        assert!(ShapeType::Polygon < ShapeType::Box);
    }

    #[test]
    fn test_circle_update_and_bb() {
        let mut shape = Shape::new_circle(Vec2::new(1.0, 0.0), 2.0);
        let bb = shape.update(Transform::new(Vec2::new(10.0, 5.0), 0.0));
        assert_eq!(bb.lower, Vec2::new(9.0, 3.0));
        assert_eq!(bb.upper, Vec2::new(13.0, 7.0));

        match &shape.kind {
            ShapeKind::Circle(c) => assert_eq!(c.tc, Vec2::new(11.0, 5.0)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_segment_update() {
        let mut shape = Shape::new_segment(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 1.0);
        let bb = shape.update(Transform::IDENTITY);
        assert_eq!(bb.lower, Vec2::new(-1.0, -1.0));
        assert_eq!(bb.upper, Vec2::new(11.0, 1.0));

        match &shape.kind {
            ShapeKind::Segment(seg) => {
                // Normal is perpendicular to the segment direction.
                assert!(seg.tn.dot(seg.tb - seg.ta).abs() < 1e-12);
                assert!((seg.tn.length() - 1.0).abs() < 1e-12);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_box_is_clockwise_polygon() {
        let shape = Shape::new_box(Vec2::ZERO, 2.0, 2.0);
        match &shape.kind {
            ShapeKind::Box(b) => {
                assert_eq!(b.poly.num_verts(), 4);
                assert!(validate_polygon(&b.poly.verts));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_box_axes_point_outward() {
        let mut shape = Shape::new_box(Vec2::ZERO, 2.0, 2.0);
        shape.update(Transform::IDENTITY);
        match &shape.kind {
            ShapeKind::Box(b) => {
                for axis in &b.poly.t_axes {
                    // Outward normals have positive plane offset for a
                    // box centered at the origin.
                    assert!(axis.d > 0.0, "axis.d = {}", axis.d);
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_polygon_contains_vert() {
        let mut shape = Shape::new_box(Vec2::ZERO, 4.0, 4.0);
        shape.update(Transform::IDENTITY);
        assert!(shape.test_point(Vec2::new(0.0, 0.0)));
        assert!(shape.test_point(Vec2::new(1.9, 1.9)));
        assert!(!shape.test_point(Vec2::new(2.1, 0.0)));
    }

    #[test]
    fn test_circle_test_point() {
        let mut shape = Shape::new_circle(Vec2::ZERO, 1.0);
        shape.update(Transform::new(Vec2::new(5.0, 5.0), 0.0));
        assert!(shape.test_point(Vec2::new(5.5, 5.0)));
        assert!(!shape.test_point(Vec2::new(6.5, 5.0)));
    }

    #[test]
    fn test_segment_test_point_is_false() {
        let mut shape = Shape::new_segment(Vec2::ZERO, Vec2::new(1.0, 0.0), 0.5);
        shape.update(Transform::IDENTITY);
        assert!(!shape.test_point(Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn test_moments_positive_and_scale_with_mass() {
        let circle = Shape::new_circle(Vec2::ZERO, 2.0);
        let seg = Shape::new_segment(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.1);
        let bx = Shape::new_box(Vec2::ZERO, 2.0, 3.0);

        for shape in [&circle, &seg, &bx] {
            let m1 = shape.moment(1.0);
            let m2 = shape.moment(2.0);
            assert!(m1 > 0.0);
            assert!((m2 - 2.0 * m1).abs() < 1e-9, "moment must scale linearly");
        }

        // Box moment matches the closed form.
        assert!((bx.moment(1.0) - (4.0 + 9.0) / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_circle_moment_offset_term() {
        let centered = Shape::new_circle(Vec2::ZERO, 1.0);
        let offset = Shape::new_circle(Vec2::new(3.0, 0.0), 1.0);
        assert!(
            offset.moment(1.0) > centered.moment(1.0),
            "parallel-axis term must increase the moment"
        );
    }

    #[test]
    fn test_circle_moment_two_term_split() {
        // I = m * r^2 / 2 + |offset|^2: the radius term scales with mass,
        // the offset term does not.
        let shape = Shape::new_circle(Vec2::new(3.0, 4.0), 2.0);
        assert!((shape.moment(1.0) - (0.5 * 4.0 + 25.0)).abs() < 1e-12);
        assert!((shape.moment(5.0) - (5.0 * 0.5 * 4.0 + 25.0)).abs() < 1e-12);

        // With no offset the moment is purely mass-scaled.
        let centered = Shape::new_circle(Vec2::ZERO, 2.0);
        assert!((centered.moment(3.0) - 3.0 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_value_on_axis() {
        let mut shape = Shape::new_box(Vec2::ZERO, 2.0, 2.0);
        shape.update(Transform::IDENTITY);
        if let ShapeKind::Box(b) = &shape.kind {
            // Plane x = 5 pointing at the box: min vertex x is -1, so -6.
            let v = b.poly.value_on_axis(Vec2::UNIT_X, 5.0);
            assert!((v - (-6.0)).abs() < 1e-12);
        } else {
            unreachable!()
        }
    }

    #[test]
    fn test_validate_polygon_rejects_ccw() {
        // Counter-clockwise triangle.
        let ccw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        assert!(!validate_polygon(&ccw));

        // Same triangle wound clockwise.
        let cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        assert!(validate_polygon(&cw));
    }
}
