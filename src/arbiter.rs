//! Contact Arbiters
//!
//! An arbiter is the persistent contact manifold between one pair of
//! shapes: up to four contact points, the combined surface material, and
//! the lifecycle state driving collision callbacks. Arbiters live in the
//! space's cache keyed by [`PairKey`] and survive across frames so the
//! solver can warm-start from last frame's converged impulses.
//!
//! The impulse math runs in two channels per body: the real velocity
//! `(v, w)` and the positional-correction bias `(v_bias, w_bias)`. The
//! accumulated-impulse clamps (`jn_acc >= 0`, `|jt_acc| <= u * jn_acc`)
//! are what make the Gauss–Seidel iteration converge.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::body::{Body, BodyHandle};
use crate::constraint::{
    apply_bias_impulses, apply_impulses, effective_mass, k_scalar, normal_relative_velocity,
    relative_velocity,
};
use crate::contact::{Contact, HashValue};
use crate::math::{Float, Vec2};
use crate::shape::Shape;
use crate::space::ShapeId;

/// Unordered shape-pair key; `(a, b)` and `(b, a)` collapse to one entry.
///
/// Normalized by hash magnitude: the larger hash goes first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    /// The larger shape hash.
    pub a: HashValue,
    /// The smaller shape hash.
    pub b: HashValue,
}

impl PairKey {
    /// Build the canonical key for two shape hashes.
    #[inline]
    #[must_use]
    pub fn new(a: HashValue, b: HashValue) -> Self {
        if a > b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Arbiter lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbiterState {
    /// Created this step; `enter` callbacks have not yet accepted it.
    FirstCollision,
    /// Live manifold in the solver set.
    Normal,
    /// Rejected by an `enter` callback; ignored until separation.
    Ignore,
    /// Contacts ceased; lingers for `collision_persistence` steps.
    Cached,
}

// ============================================================================
// Arbiter
// ============================================================================

/// Persistent contact manifold between two shapes.
pub struct Arbiter {
    /// First shape (lower type rank).
    pub shape_a: ShapeId,
    /// Second shape (higher type rank).
    pub shape_b: ShapeId,
    /// Body owning `shape_a`.
    pub body_a: BodyHandle,
    /// Body owning `shape_b`.
    pub body_b: BodyHandle,

    /// Contact points, at most [`MAX_CONTACTS`](crate::collide::MAX_CONTACTS).
    pub contacts: Vec<Contact>,

    /// Combined elasticity, `e_a * e_b`. A `pre_solve` handler may override.
    pub e: Float,
    /// Combined friction, `u_a * u_b`. A `pre_solve` handler may override.
    pub u: Float,
    /// Relative surface velocity. A `pre_solve` handler may override.
    pub surface_vr: Vec2,

    pub(crate) state: ArbiterState,
    pub(crate) stamp: u64,
}

impl Arbiter {
    /// Fresh arbiter for a canonically ordered shape pair.
    pub(crate) fn new(shape_a: ShapeId, shape_b: ShapeId) -> Self {
        Self {
            shape_a,
            shape_b,
            body_a: shape_a.body,
            body_b: shape_b.body,
            contacts: Vec::new(),
            e: 0.0,
            u: 0.0,
            surface_vr: Vec2::ZERO,
            state: ArbiterState::FirstCollision,
            stamp: 0,
        }
    }

    /// Reset a pooled arbiter for reuse with a new shape pair.
    pub(crate) fn reinit(&mut self, shape_a: ShapeId, shape_b: ShapeId) {
        self.shape_a = shape_a;
        self.shape_b = shape_b;
        self.body_a = shape_a.body;
        self.body_b = shape_b.body;
        self.contacts.clear();
        self.e = 0.0;
        self.u = 0.0;
        self.surface_vr = Vec2::ZERO;
        self.state = ArbiterState::FirstCollision;
        self.stamp = 0;
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// `true` during the step in which the shapes first touched.
    #[inline]
    #[must_use]
    pub fn is_first_contact(&self) -> bool {
        self.state == ArbiterState::FirstCollision
    }

    /// Permanently ignore this collision until the shapes separate.
    #[inline]
    pub fn ignore(&mut self) {
        self.state = ArbiterState::Ignore;
    }

    /// Contact points of the manifold.
    #[inline]
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Sum of the accumulated normal impulses, as a world-space vector.
    #[must_use]
    pub fn total_impulse(&self) -> Vec2 {
        let mut sum = Vec2::ZERO;
        for con in &self.contacts {
            sum += con.n * con.jn_acc;
        }
        sum
    }

    /// Sum of the accumulated impulses including friction.
    #[must_use]
    pub fn total_impulse_with_friction(&self) -> Vec2 {
        let mut sum = Vec2::ZERO;
        for con in &self.contacts {
            sum += Vec2::new(
                con.n.x * con.jn_acc - con.n.y * con.jt_acc,
                con.n.x * con.jt_acc + con.n.y * con.jn_acc,
            );
        }
        sum
    }

    /// Merge a fresh narrow-phase result into this manifold.
    ///
    /// Contacts whose feature hash matches an old contact inherit its
    /// accumulated impulses (the warm-start carry-over); everything else
    /// starts fresh. Returns the previous contact array for pooling.
    pub(crate) fn update(
        &mut self,
        a: &Shape,
        a_id: ShapeId,
        b: &Shape,
        b_id: ShapeId,
        mut contacts: Vec<Contact>,
    ) -> Vec<Contact> {
        for new_con in contacts.iter_mut() {
            for old_con in &self.contacts {
                if new_con.hash == old_con.hash {
                    new_con.jn_acc = old_con.jn_acc;
                    new_con.jt_acc = old_con.jt_acc;
                    new_con.j_bias = old_con.j_bias;
                }
            }
        }

        self.shape_a = a_id;
        self.shape_b = b_id;
        self.body_a = a_id.body;
        self.body_b = b_id.body;

        self.u = a.u * b.u;
        self.e = a.e * b.e;
        self.surface_vr = a.surface_v - b.surface_v;

        if self.state == ArbiterState::Cached {
            self.state = ArbiterState::FirstCollision;
        }

        core::mem::replace(&mut self.contacts, contacts)
    }

    /// Per-contact solver setup: offsets, effective masses, the positional
    /// bias target, and the restitution target.
    ///
    /// `bias` here is the per-step correction coefficient
    /// `1 - collision_bias^dt`; `slop` is the allowed penetration.
    pub(crate) fn pre_step(&mut self, a: &Body, b: &Body, inv_dt: Float, slop: Float, bias: Float) {
        for con in &mut self.contacts {
            con.r1 = con.p - a.p;
            con.r2 = con.p - b.p;

            con.n_mass = effective_mass(k_scalar(a, b, con.r1, con.r2, con.n));
            con.t_mass = effective_mass(k_scalar(a, b, con.r1, con.r2, con.n.perp()));

            let ds = con.dist + slop;
            con.bias = if ds < 0.0 { -bias * inv_dt * ds } else { 0.0 };
            con.j_bias = 0.0;

            con.bounce = normal_relative_velocity(a, b, con.r1, con.r2, con.n) * self.e;
        }
    }

    /// Warm start: re-inject last frame's converged impulse, scaled by
    /// `dt_coef = dt / prev_dt`. Skipped on the first collision, which has
    /// nothing cached.
    pub(crate) fn apply_cached_impulse(&self, a: &mut Body, b: &mut Body, dt_coef: Float) {
        if self.state == ArbiterState::FirstCollision && !self.contacts.is_empty() {
            return;
        }

        for con in &self.contacts {
            // Rotate (jn_acc, jt_acc) into world space along the normal.
            let j = Vec2::new(
                con.n.x * con.jn_acc - con.n.y * con.jt_acc,
                con.n.x * con.jt_acc + con.n.y * con.jn_acc,
            );
            apply_impulses(a, b, con.r1, con.r2, j * dt_coef);
        }
    }

    /// One Gauss–Seidel pass over every contact: positional bias impulse,
    /// clamped normal impulse, and Coulomb-clamped friction impulse.
    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        for con in &mut self.contacts {
            let n = con.n;
            let r1 = con.r1;
            let r2 = con.r2;

            // Relative velocity in the bias channel.
            let vb1 = a.v_bias + r1.perp() * a.w_bias;
            let vb2 = b.v_bias + r2.perp() * b.w_bias;
            let vbn = (vb2 - vb1).dot(n);

            // Relative velocity in the real channel.
            let vr = relative_velocity(a, b, r1, r2);
            let vrn = vr.dot(n);
            let vrt = (vr + self.surface_vr).dot(n.perp());

            // Positional-correction impulse, clamped non-negative.
            let jbn = (con.bias - vbn) * con.n_mass;
            let jbn_old = con.j_bias;
            con.j_bias = fmax(jbn_old + jbn, 0.0);

            // Normal impulse, clamped non-negative (contacts never pull).
            let jn = -(con.bounce + vrn) * con.n_mass;
            let jn_old = con.jn_acc;
            con.jn_acc = fmax(jn_old + jn, 0.0);

            // Friction impulse, clamped into the cone of the accumulated
            // normal impulse.
            let jt_max = self.u * con.jn_acc;
            let jt = -vrt * con.t_mass;
            let jt_old = con.jt_acc;
            con.jt_acc = crate::math::clamp(jt_old + jt, -jt_max, jt_max);

            apply_bias_impulses(a, b, r1, r2, n * (con.j_bias - jbn_old));

            let dn = con.jn_acc - jn_old;
            let dt = con.jt_acc - jt_old;
            let j = Vec2::new(n.x * dn - n.y * dt, n.x * dt + n.y * dn);
            apply_impulses(a, b, r1, r2, j);
        }
    }
}

impl core::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arbiter")
            .field("shape_a", &self.shape_a)
            .field("shape_b", &self.shape_b)
            .field("contacts", &self.contacts.len())
            .field("state", &self.state)
            .field("stamp", &self.stamp)
            .finish()
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

// ============================================================================
// Tests
// ============================================================================
