//! Narrow-Phase Collision Dispatch
//!
//! Per shape-pair geometric routines producing up to four contact points
//! with stable feature hashes. Shapes arrive pre-ordered by
//! [`ShapeType`](crate::shape::ShapeType) rank; the dispatch matrix is
//! triangular and every unsupported pairing yields zero contacts.
//!
//! | A \ B    | Circle | Segment | Polygon | Box |
//! |----------|--------|---------|---------|-----|
//! | Circle   | ✓      | ✓       | ✓       | ✓   |
//! | Segment  |        |         | ✓       | ✓   |
//! | Polygon  |        |         | ✓       | ✓   |
//! | Box      |        |         |         | ✓   |

use crate::contact::{hash_pair, Contact, HashValue};
use crate::math::{sqrt, Float, Vec2};
use crate::shape::{CircleShape, PolygonShape, SegmentShape, Shape, ShapeKind};

/// The maximum number of contact points a single manifold can have.
pub const MAX_CONTACTS: usize = 4;

/// Run the narrow phase for a canonically ordered shape pair.
///
/// `contacts` must hold at least [`MAX_CONTACTS`] slots. Returns the number
/// of contacts generated (0 when the shapes do not collide or the pairing
/// has no handler).
pub fn collide(contacts: &mut [Contact], a: &Shape, b: &Shape) -> usize {
    if a.shape_type() > b.shape_type() {
        log::warn!(
            "narrow phase called with unordered shape types ({:?} > {:?})",
            a.shape_type(),
            b.shape_type()
        );
        return 0;
    }

    match (&a.kind, &b.kind) {
        (ShapeKind::Circle(ca), ShapeKind::Circle(cb)) => {
            circle_to_circle_query(ca.tc, cb.tc, ca.radius, cb.radius, &mut contacts[0])
        }
        (ShapeKind::Circle(circle), ShapeKind::Segment(segment)) => {
            circle_to_segment(contacts, circle, segment)
        }
        (ShapeKind::Circle(circle), ShapeKind::Polygon(poly)) => {
            circle_to_polygon(contacts, circle, poly)
        }
        (ShapeKind::Circle(circle), ShapeKind::Box(bx)) => {
            circle_to_polygon(contacts, circle, &bx.poly)
        }
        (ShapeKind::Segment(segment), ShapeKind::Polygon(poly)) => {
            segment_to_polygon(contacts, segment, a.hash(), poly, b.hash())
        }
        (ShapeKind::Segment(segment), ShapeKind::Box(bx)) => {
            segment_to_polygon(contacts, segment, a.hash(), &bx.poly, b.hash())
        }
        (ShapeKind::Polygon(p1), ShapeKind::Polygon(p2)) => {
            polygon_to_polygon(contacts, p1, a.hash(), p2, b.hash())
        }
        (ShapeKind::Polygon(p1), ShapeKind::Box(bx)) => {
            polygon_to_polygon(contacts, p1, a.hash(), &bx.poly, b.hash())
        }
        (ShapeKind::Box(b1), ShapeKind::Box(b2)) => {
            polygon_to_polygon(contacts, &b1.poly, a.hash(), &b2.poly, b.hash())
        }
        _ => 0,
    }
}

// ============================================================================
// Circle queries
// ============================================================================

/// Circle-circle query on raw centers and radii.
///
/// Coincident centers produce a contact with the arbitrary normal `(1, 0)`.
pub fn circle_to_circle_query(
    p1: Vec2,
    p2: Vec2,
    r1: Float,
    r2: Float,
    con: &mut Contact,
) -> usize {
    let min_dist = r1 + r2;

    let delta = p2 - p1;
    let dist_sq = delta.length_sq();

    if dist_sq >= min_dist * min_dist {
        return 0;
    }

    let dist = sqrt(dist_sq);
    // Guard the position interpolation against division by zero.
    let p_dist = if dist == 0.0 { Float::INFINITY } else { dist };

    let pos = p1 + delta * (0.5 + (r1 - 0.5 * min_dist) / p_dist);

    let norm = if dist != 0.0 {
        delta * (1.0 / dist)
    } else {
        Vec2::UNIT_X
    };

    con.reset(pos, norm, dist - min_dist, 0);
    1
}

/// Circle query against a segment endpoint, filtered by the endpoint's
/// chain tangent so chained segments don't produce ghost collisions.
fn segment_encap_query(
    p1: Vec2,
    p2: Vec2,
    r1: Float,
    r2: Float,
    con: &mut Contact,
    tangent: Vec2,
) -> usize {
    let count = circle_to_circle_query(p1, p2, r1, r2, con);
    if count > 0 && con.n.dot(tangent) < 0.0 {
        return 0;
    }
    count
}

fn circle_to_segment(
    contacts: &mut [Contact],
    circle: &CircleShape,
    segment: &SegmentShape,
) -> usize {
    let rsum = circle.radius + segment.radius;

    // Signed distance from the segment's line.
    let dn = segment.tn.dot(circle.tc) - segment.ta.dot(segment.tn);
    let dist = dn.abs() - rsum;
    if dist > 0.0 {
        return 0;
    }

    // Tangential position along the segment.
    let dt = -segment.tn.cross(circle.tc);
    let dt_min = -segment.tn.cross(segment.ta);
    let dt_max = -segment.tn.cross(segment.tb);

    if dt < dt_min {
        if dt < dt_min - rsum {
            0
        } else {
            segment_encap_query(
                circle.tc,
                segment.ta,
                circle.radius,
                segment.radius,
                &mut contacts[0],
                segment.a_tangent,
            )
        }
    } else if dt < dt_max {
        let n = if dn >= 0.0 { -segment.tn } else { segment.tn };
        let pos = circle.tc + n * (circle.radius + dist * 0.5);
        contacts[0].reset(pos, n, dist, 0);
        1
    } else if dt < dt_max + rsum {
        segment_encap_query(
            circle.tc,
            segment.tb,
            circle.radius,
            segment.radius,
            &mut contacts[0],
            segment.b_tangent,
        )
    } else {
        0
    }
}

fn circle_to_polygon(
    contacts: &mut [Contact],
    circle: &CircleShape,
    poly: &PolygonShape,
) -> usize {
    let axes = &poly.t_axes;

    let mut mini = 0;
    let mut min = axes[0].n.dot(circle.tc) - axes[0].d - circle.radius;
    for (i, axis) in axes.iter().enumerate() {
        let dist = axis.n.dot(circle.tc) - axis.d - circle.radius;
        if dist > 0.0 {
            return 0;
        } else if dist > min {
            min = dist;
            mini = i;
        }
    }

    let n = axes[mini].n;
    let a = poly.t_verts[mini];
    let b = poly.t_verts[(mini + 1) % poly.num_verts()];
    let dta = n.cross(a);
    let dtb = n.cross(b);
    let dt = n.cross(circle.tc);

    if dt < dtb {
        circle_to_circle_query(circle.tc, b, circle.radius, 0.0, &mut contacts[0])
    } else if dt < dta {
        contacts[0].reset(
            circle.tc - n * (circle.radius + min / 2.0),
            -n,
            min,
            0,
        );
        1
    } else {
        circle_to_circle_query(circle.tc, a, circle.radius, 0.0, &mut contacts[0])
    }
}

// ============================================================================
// Polygon SAT
// ============================================================================

/// Find the minimum separating axis of `poly` against the given face axes.
///
/// Returns `None` when a separating axis exists (positive distance).
fn find_msa(poly: &PolygonShape, axes: &[crate::shape::PolygonAxis]) -> Option<(Float, usize)> {
    let mut min_index = 0;
    let mut min = poly.value_on_axis(axes[0].n, axes[0].d);
    if min > 0.0 {
        return None;
    }

    for (i, axis) in axes.iter().enumerate().skip(1) {
        let dist = poly.value_on_axis(axis.n, axis.d);
        if dist > 0.0 {
            return None;
        } else if dist > min {
            min = dist;
            min_index = i;
        }
    }

    Some((min, min_index))
}

/// Claim the next contact slot, overwriting the last slot once full.
#[inline]
fn next_contact(contacts: &mut [Contact], num: &mut usize) -> usize {
    if *num < MAX_CONTACTS {
        let index = *num;
        *num = index + 1;
        index
    } else {
        MAX_CONTACTS - 1
    }
}

/// Emit a contact for every vertex of either polygon contained in the other.
fn find_verts(
    contacts: &mut [Contact],
    poly1: &PolygonShape,
    hash1: HashValue,
    poly2: &PolygonShape,
    hash2: HashValue,
    n: Vec2,
    dist: Float,
) -> usize {
    let mut num = 0;

    for (i, v) in poly1.t_verts.iter().enumerate() {
        if poly2.contains_vert(*v) {
            let slot = next_contact(contacts, &mut num);
            contacts[slot].reset(*v, n, dist, hash_pair(hash1, i as HashValue));
        }
    }

    for (i, v) in poly2.t_verts.iter().enumerate() {
        if poly1.contains_vert(*v) {
            let slot = next_contact(contacts, &mut num);
            contacts[slot].reset(*v, n, dist, hash_pair(hash2, i as HashValue));
        }
    }

    if num > 0 {
        num
    } else {
        find_verts_fallback(contacts, poly1, hash1, poly2, hash2, n, dist)
    }
}

/// Partial-containment fallback for deep overlap where no vertex is fully
/// inside the other polygon.
fn find_verts_fallback(
    contacts: &mut [Contact],
    poly1: &PolygonShape,
    hash1: HashValue,
    poly2: &PolygonShape,
    hash2: HashValue,
    n: Vec2,
    dist: Float,
) -> usize {
    let mut num = 0;

    for (i, v) in poly1.t_verts.iter().enumerate() {
        if poly2.contains_vert_partial(*v, -n) {
            let slot = next_contact(contacts, &mut num);
            contacts[slot].reset(*v, n, dist, hash_pair(hash1, i as HashValue));
        }
    }

    for (i, v) in poly2.t_verts.iter().enumerate() {
        if poly1.contains_vert_partial(*v, n) {
            let slot = next_contact(contacts, &mut num);
            contacts[slot].reset(*v, n, dist, hash_pair(hash2, i as HashValue));
        }
    }

    num
}

fn polygon_to_polygon(
    contacts: &mut [Contact],
    poly1: &PolygonShape,
    hash1: HashValue,
    poly2: &PolygonShape,
    hash2: HashValue,
) -> usize {
    let Some((min1, mini1)) = find_msa(poly2, &poly1.t_axes) else {
        return 0;
    };
    let Some((min2, mini2)) = find_msa(poly1, &poly2.t_axes) else {
        return 0;
    };

    // Overlap confirmed; collect the penetrating vertices along the axis of
    // least penetration, flipping the normal when it came from poly2.
    if min1 > min2 {
        find_verts(
            contacts,
            poly1,
            hash1,
            poly2,
            hash2,
            poly1.t_axes[mini1].n,
            min1,
        )
    } else {
        find_verts(
            contacts,
            poly1,
            hash1,
            poly2,
            hash2,
            -poly2.t_axes[mini2].n,
            min2,
        )
    }
}

// ============================================================================
// Segment vs polygon
// ============================================================================

/// Minimum signed distance of the thickened segment to the plane `(n, d)`.
fn seg_value_on_axis(seg: &SegmentShape, n: Vec2, d: Float) -> Float {
    let a = n.dot(seg.ta) - seg.radius;
    let b = n.dot(seg.tb) - seg.radius;
    if a < b {
        a - d
    } else {
        b - d
    }
}

/// Emit polygon vertices that lie behind the segment's (thickened) line and
/// within the segment's span.
fn find_points_behind_seg(
    contacts: &mut [Contact],
    num: &mut usize,
    seg: &SegmentShape,
    poly: &PolygonShape,
    poly_hash: HashValue,
    p_dist: Float,
    coef: Float,
) {
    let dta = seg.tn.cross(seg.ta);
    let dtb = seg.tn.cross(seg.tb);
    let n = seg.tn * coef;

    for (i, v) in poly.t_verts.iter().enumerate() {
        if v.dot(n) < seg.tn.dot(seg.ta) * coef + seg.radius {
            let dt = seg.tn.cross(*v);
            if dta >= dt && dt >= dtb {
                let slot = next_contact(contacts, num);
                contacts[slot].reset(*v, n, p_dist, hash_pair(poly_hash, i as HashValue));
            }
        }
    }
}

fn segment_to_polygon(
    contacts: &mut [Contact],
    seg: &SegmentShape,
    seg_hash: HashValue,
    poly: &PolygonShape,
    poly_hash: HashValue,
) -> usize {
    let axes = &poly.t_axes;

    // The two thickened-segment axes, ±tn shifted by the segment radius.
    let seg_d = seg.tn.dot(seg.ta);
    let min_norm = poly.value_on_axis(seg.tn, seg_d) - seg.radius;
    let min_neg = poly.value_on_axis(-seg.tn, -seg_d) - seg.radius;
    if min_neg > 0.0 || min_norm > 0.0 {
        return 0;
    }

    let mut mini = 0;
    let mut poly_min = seg_value_on_axis(seg, axes[0].n, axes[0].d);
    if poly_min > 0.0 {
        return 0;
    }
    for (i, axis) in axes.iter().enumerate() {
        let dist = seg_value_on_axis(seg, axis.n, axis.d);
        if dist > 0.0 {
            return 0;
        } else if dist > poly_min {
            poly_min = dist;
            mini = i;
        }
    }

    let mut num = 0;

    let poly_n = -axes[mini].n;

    // Segment endpoints inside the polygon, offset along the contact normal
    // by the segment radius.
    let va = seg.ta + poly_n * seg.radius;
    let vb = seg.tb + poly_n * seg.radius;
    if poly.contains_vert(va) {
        let slot = next_contact(contacts, &mut num);
        contacts[slot].reset(va, poly_n, poly_min, hash_pair(seg_hash, 0));
    }
    if poly.contains_vert(vb) {
        let slot = next_contact(contacts, &mut num);
        contacts[slot].reset(vb, poly_n, poly_min, hash_pair(seg_hash, 1));
    }

    if min_norm >= poly_min || min_neg >= poly_min {
        if min_norm > min_neg {
            find_points_behind_seg(contacts, &mut num, seg, poly, poly_hash, min_norm, 1.0);
        } else {
            find_points_behind_seg(contacts, &mut num, seg, poly, poly_hash, min_neg, -1.0);
        }
    }

    // If no other collision points were found, try colliding endpoints.
    if num == 0 {
        let poly_a = poly.t_verts[mini];
        let poly_b = poly.t_verts[(mini + 1) % poly.num_verts()];

        if segment_encap_query(
            seg.ta,
            poly_a,
            seg.radius,
            0.0,
            &mut contacts[0],
            -seg.a_tangent,
        ) != 0
        {
            return 1;
        }
        if segment_encap_query(
            seg.tb,
            poly_a,
            seg.radius,
            0.0,
            &mut contacts[0],
            -seg.b_tangent,
        ) != 0
        {
            return 1;
        }
        if segment_encap_query(
            seg.ta,
            poly_b,
            seg.radius,
            0.0,
            &mut contacts[0],
            -seg.a_tangent,
        ) != 0
        {
            return 1;
        }
        if segment_encap_query(
            seg.tb,
            poly_b,
            seg.radius,
            0.0,
            &mut contacts[0],
            -seg.b_tangent,
        ) != 0
        {
            return 1;
        }
    }

    num
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;

    fn contacts_buf() -> [Contact; MAX_CONTACTS] {
        [Contact::default(); MAX_CONTACTS]
    }

    fn updated(mut shape: Shape, pos: Vec2, angle: Float) -> Shape {
        shape.update(Transform::new(pos, angle));
        shape
    }

    #[test]
    fn test_circle_circle_hit() {
        let a = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::ZERO, 0.0);
        let b = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(1.5, 0.0), 0.0);
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &a, &b);
        assert_eq!(num, 1);
        let con = &contacts[0];
        assert!((con.n.x - 1.0).abs() < 1e-12, "normal points from A to B");
        assert!((con.dist - (1.5 - 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_circle_circle_miss() {
        let a = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::ZERO, 0.0);
        let b = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(3.0, 0.0), 0.0);
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &a, &b), 0);
    }

    #[test]
    fn test_circle_circle_coincident_centers() {
        // Identical positions: contact with the documented fallback normal.
        let a = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(5.0, 5.0), 0.0);
        let b = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(5.0, 5.0), 0.0);
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &a, &b);
        assert_eq!(num, 1);
        assert_eq!(contacts[0].n, Vec2::UNIT_X);
        assert_eq!(contacts[0].dist, -2.0);
    }

    #[test]
    fn test_circle_segment_face_contact() {
        let circle = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(5.0, 0.5), 0.0);
        let seg = updated(
            Shape::new_segment(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0),
            Vec2::ZERO,
            0.0,
        );
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &circle, &seg);
        assert_eq!(num, 1);
        assert!(contacts[0].dist < 0.0);
        // Normal perpendicular to the segment.
        assert!(contacts[0].n.x.abs() < 1e-12);
    }

    #[test]
    fn test_circle_segment_endpoint_contact() {
        // Circle just past the endpoint, within the radius sum.
        let circle = updated(
            Shape::new_circle(Vec2::ZERO, 1.0),
            Vec2::new(10.5, 0.0),
            0.0,
        );
        let seg = updated(
            Shape::new_segment(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0),
            Vec2::ZERO,
            0.0,
        );
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &circle, &seg);
        assert_eq!(num, 1, "endpoint region should produce a contact");
    }

    #[test]
    fn test_circle_segment_miss() {
        let circle = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(5.0, 3.0), 0.0);
        let seg = updated(
            Shape::new_segment(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.5),
            Vec2::ZERO,
            0.0,
        );
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &circle, &seg), 0);
    }

    #[test]
    fn test_circle_box_face_contact() {
        let circle = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::new(0.0, 2.3), 0.0);
        let bx = updated(Shape::new_box(Vec2::ZERO, 3.0, 3.0), Vec2::ZERO, 0.0);
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &circle, &bx);
        assert_eq!(num, 1);
        assert!(contacts[0].dist < 0.0);
        // Penetration = (2.3 - 1.5) - 1 = -0.2
        assert!((contacts[0].dist + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_box_box_overlap_four_contacts_max() {
        let a = updated(Shape::new_box(Vec2::ZERO, 4.0, 4.0), Vec2::ZERO, 0.0);
        let b = updated(Shape::new_box(Vec2::ZERO, 4.0, 4.0), Vec2::new(0.5, 0.5), 0.0);
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &a, &b);
        assert!(num >= 1);
        assert!(num <= MAX_CONTACTS);
        for con in &contacts[..num] {
            assert!(con.dist <= 0.0, "contacts must be penetrating");
        }
    }

    #[test]
    fn test_box_box_separated() {
        let a = updated(Shape::new_box(Vec2::ZERO, 2.0, 2.0), Vec2::ZERO, 0.0);
        let b = updated(Shape::new_box(Vec2::ZERO, 2.0, 2.0), Vec2::new(5.0, 0.0), 0.0);
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &a, &b), 0);
    }

    #[test]
    fn test_box_stack_contact_normal_vertical() {
        // Box B resting on top of box A, slightly overlapping.
        let a = updated(Shape::new_box(Vec2::ZERO, 4.0, 2.0), Vec2::ZERO, 0.0);
        let b = updated(
            Shape::new_box(Vec2::ZERO, 4.0, 2.0),
            Vec2::new(0.0, 1.9),
            0.0,
        );
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &a, &b);
        assert!(num >= 1);
        for con in &contacts[..num] {
            assert!(
                con.n.y.abs() > 0.99,
                "stack contact normal should be vertical, got {:?}",
                con.n
            );
        }
    }

    #[test]
    fn test_poly_poly_hash_stability() {
        // Two consecutive narrow-phase runs on resting polygons must yield
        // the same multiset of feature hashes (warm-start requirement).
        let a = updated(Shape::new_box(Vec2::ZERO, 4.0, 4.0), Vec2::ZERO, 0.0);
        let b = updated(Shape::new_box(Vec2::ZERO, 4.0, 4.0), Vec2::new(1.0, 3.5), 0.0);

        let mut first = contacts_buf();
        let n1 = collide(&mut first, &a, &b);
        let mut second = contacts_buf();
        let n2 = collide(&mut second, &a, &b);

        assert_eq!(n1, n2);
        let mut h1: [HashValue; MAX_CONTACTS] = Default::default();
        let mut h2: [HashValue; MAX_CONTACTS] = Default::default();
        for i in 0..n1 {
            h1[i] = first[i].hash;
            h2[i] = second[i].hash;
        }
        h1[..n1].sort_unstable();
        h2[..n2].sort_unstable();
        assert_eq!(h1, h2, "feature hashes must be stable across frames");
    }

    #[test]
    fn test_segment_box_contacts() {
        // Horizontal floor segment with a box sunk slightly into it.
        let seg = updated(
            Shape::new_segment(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), 0.0),
            Vec2::ZERO,
            0.0,
        );
        let bx = updated(
            Shape::new_box(Vec2::ZERO, 2.0, 2.0),
            Vec2::new(0.0, 0.9),
            0.0,
        );
        let mut contacts = contacts_buf();
        let num = collide(&mut contacts, &seg, &bx);
        assert!(num >= 1, "box overlapping segment line should collide");
        for con in &contacts[..num] {
            assert!(con.dist <= 0.0);
        }
    }

    #[test]
    fn test_segment_box_miss() {
        let seg = updated(
            Shape::new_segment(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), 0.0),
            Vec2::ZERO,
            0.0,
        );
        let bx = updated(
            Shape::new_box(Vec2::ZERO, 2.0, 2.0),
            Vec2::new(0.0, 5.0),
            0.0,
        );
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &seg, &bx), 0);
    }

    #[test]
    fn test_unordered_pair_yields_zero() {
        // Polygon before circle violates the canonical order: no contacts.
        let bx = updated(Shape::new_box(Vec2::ZERO, 2.0, 2.0), Vec2::ZERO, 0.0);
        let circle = updated(Shape::new_circle(Vec2::ZERO, 1.0), Vec2::ZERO, 0.0);
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &bx, &circle), 0);
    }

    #[test]
    fn test_segment_segment_unsupported() {
        let a = updated(
            Shape::new_segment(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5),
            Vec2::ZERO,
            0.0,
        );
        let b = updated(
            Shape::new_segment(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0), 0.5),
            Vec2::ZERO,
            0.0,
        );
        let mut contacts = contacts_buf();
        assert_eq!(collide(&mut contacts, &a, &b), 0);
    }
}
