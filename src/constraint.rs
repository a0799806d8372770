//! Constraint Interface and Shared Solver Math
//!
//! Constraints plug into the same Gauss–Seidel loop as contact arbiters:
//! `pre_step` computes effective masses and bias targets, warm starting
//! re-applies the cached impulse, then `apply_impulse` runs once per solver
//! iteration. Concrete joints live in [`crate::joint`].
//!
//! The free functions here are the scalar effective-mass and relative
//! velocity helpers shared between arbiters and joints.

use crate::body::{Body, BodyHandle};
use crate::math::{powf, Float, Vec2, INFINITY};

/// Default error bias: fix roughly 10% of positional error per frame at
/// 60 Hz, expressed per second as `(1 - 0.1)^60`.
pub const ERROR_BIAS: Float = 0.001_797_010_299_914_44;

/// Effective mass denominator of `body` along `n` at offset `r`.
#[inline]
#[must_use]
pub fn k_scalar_body(body: &Body, r: Vec2, n: Vec2) -> Float {
    let rcn = r.cross(n);
    body.m_inv + body.i_inv * rcn * rcn
}

/// Combined effective-mass denominator of a body pair along `n`.
#[inline]
#[must_use]
pub fn k_scalar(a: &Body, b: &Body, r1: Vec2, r2: Vec2, n: Vec2) -> Float {
    k_scalar_body(a, r1, n) + k_scalar_body(b, r2, n)
}

/// Invert an effective-mass denominator.
///
/// A zero denominator (two non-rotating infinite masses) makes the axis
/// unsolvable; the solver logs a warning and uses a zero effective mass so
/// the impulse vanishes instead of producing NaN.
#[inline]
#[must_use]
pub fn effective_mass(k: Float) -> Float {
    if k == 0.0 {
        log::warn!("unsolvable collision or constraint: zero effective mass");
        0.0
    } else {
        1.0 / k
    }
}

/// Relative velocity of the contact points at offsets `r1`/`r2`.
#[inline]
#[must_use]
pub fn relative_velocity(a: &Body, b: &Body, r1: Vec2, r2: Vec2) -> Vec2 {
    let v1 = a.v + r1.perp() * a.w;
    let v2 = b.v + r2.perp() * b.w;
    v2 - v1
}

/// Relative velocity projected onto `n`.
#[inline]
#[must_use]
pub fn normal_relative_velocity(a: &Body, b: &Body, r1: Vec2, r2: Vec2, n: Vec2) -> Float {
    relative_velocity(a, b, r1, r2).dot(n)
}

/// Apply an impulse to one body at offset `r`.
#[inline]
pub fn apply_impulse(body: &mut Body, j: Vec2, r: Vec2) {
    body.v += j * body.m_inv;
    body.w += body.i_inv * r.cross(j);
}

/// Apply `j` to body B and `-j` to body A.
#[inline]
pub fn apply_impulses(a: &mut Body, b: &mut Body, r1: Vec2, r2: Vec2, j: Vec2) {
    apply_impulse(a, -j, r1);
    apply_impulse(b, j, r2);
}

/// Apply an impulse to one body's bias channel.
#[inline]
pub fn apply_bias_impulse(body: &mut Body, j: Vec2, r: Vec2) {
    body.v_bias += j * body.m_inv;
    body.w_bias += body.i_inv * r.cross(j);
}

/// Apply `j` to B's and `-j` to A's bias channel.
#[inline]
pub fn apply_bias_impulses(a: &mut Body, b: &mut Body, r1: Vec2, r2: Vec2, j: Vec2) {
    apply_bias_impulse(a, -j, r1);
    apply_bias_impulse(b, j, r2);
}

/// Positional error correction rate for one step:
/// `1 - error_bias^dt`.
#[inline]
#[must_use]
pub fn bias_coef(error_bias: Float, dt: Float) -> Float {
    1.0 - powf(error_bias, dt)
}

// ============================================================================
// Constraint trait
// ============================================================================

/// State shared by every constraint implementation.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintData {
    /// First constrained body.
    pub body_a: BodyHandle,
    /// Second constrained body.
    pub body_b: BodyHandle,
    /// Maximum force the constraint may apply; the per-step impulse is
    /// clamped to `max_force * dt`.
    pub max_force: Float,
    /// Maximum speed the positional-error correction may reach.
    pub max_bias: Float,
    /// Per-second residual positional error; see [`bias_coef`].
    pub error_bias: Float,
}

impl ConstraintData {
    /// Create constraint data with the default force/bias limits.
    #[must_use]
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            max_force: INFINITY,
            max_bias: INFINITY,
            error_bias: ERROR_BIAS,
        }
    }
}

/// A pluggable constraint solved alongside contact arbiters.
///
/// The space resolves the body handles and passes exclusive references into
/// each phase; constraints never hold body pointers themselves.
pub trait Constraint {
    /// Shared constraint state.
    fn data(&self) -> &ConstraintData;

    /// Mutable shared constraint state.
    fn data_mut(&mut self) -> &mut ConstraintData;

    /// Compute effective masses and bias targets for this step.
    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: Float);

    /// Re-apply the accumulated impulse from the previous step, scaled by
    /// `dt_coef = dt / prev_dt`.
    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: Float);

    /// Apply one Gauss–Seidel impulse iteration.
    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body);

    /// Magnitude of the most recent accumulated impulse.
    fn impulse(&self) -> Float {
        0.0
    }

    /// Hook called before `pre_step` each step.
    fn pre_solve(&mut self, _a: &Body, _b: &Body) {}

    /// Hook called after the solver finishes each step.
    fn post_solve(&mut self, _a: &Body, _b: &Body) {}
}

// ============================================================================
// Tests
// ============================================================================
