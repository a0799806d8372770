//! Joint Constraints
//!
//! The three concrete [`Constraint`] implementations:
//!
//! - [`PivotJoint`]: locks two anchor points together (2D position lock)
//! - [`DampedSpring`]: soft distance constraint with implicit damping
//! - [`SimpleMotor`]: drives a relative angular rate under a torque cap

use crate::body::{Body, BodyHandle};
use crate::constraint::{
    apply_impulses, bias_coef, effective_mass, k_scalar, normal_relative_velocity,
    relative_velocity, Constraint, ConstraintData,
};
use crate::math::{clamp, exp, Float, Vec2};

// ============================================================================
// PivotJoint
// ============================================================================

/// Pins an anchor point on each body to the same world position.
#[derive(Clone, Debug)]
pub struct PivotJoint {
    /// Shared constraint state.
    pub data: ConstraintData,
    /// Anchor in body A's local space.
    pub anchor1: Vec2,
    /// Anchor in body B's local space.
    pub anchor2: Vec2,

    r1: Vec2,
    r2: Vec2,
    k1: Vec2,
    k2: Vec2,

    j_acc: Vec2,
    j_max_len: Float,
    bias: Vec2,
}

impl PivotJoint {
    /// Create a pivot joint with explicit local anchors.
    #[must_use]
    pub fn new_with_anchors(a: BodyHandle, b: BodyHandle, anchor1: Vec2, anchor2: Vec2) -> Self {
        Self {
            data: ConstraintData::new(a, b),
            anchor1,
            anchor2,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            k1: Vec2::ZERO,
            k2: Vec2::ZERO,
            j_acc: Vec2::ZERO,
            j_max_len: 0.0,
            bias: Vec2::ZERO,
        }
    }

    /// Create a pivot joint anchored at both bodies' centers.
    #[must_use]
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        Self::new_with_anchors(a, b, Vec2::ZERO, Vec2::ZERO)
    }
}

/// Multiply a vector by the inverted 2x2 mass tensor rows `k1`, `k2`.
#[inline]
fn mult_k(vr: Vec2, k1: Vec2, k2: Vec2) -> Vec2 {
    Vec2::new(vr.dot(k1), vr.dot(k2))
}

/// Invert the 2x2 mass matrix of a body pair at offsets `r1`, `r2`.
///
/// Returns `None` for a singular matrix (two non-rotating infinite masses),
/// which makes the constraint unsolvable this step.
fn k_tensor(a: &Body, b: &Body, r1: Vec2, r2: Vec2) -> Option<(Vec2, Vec2)> {
    let m_sum = a.m_inv + b.m_inv;

    // Start with I * m_sum.
    let mut k11 = m_sum;
    let mut k12 = 0.0;
    let mut k21 = 0.0;
    let mut k22 = m_sum;

    // Influence from r1.
    let a_i_inv = a.i_inv;
    k11 += r1.y * r1.y * a_i_inv;
    k12 += -r1.x * r1.y * a_i_inv;
    k21 += -r1.x * r1.y * a_i_inv;
    k22 += r1.x * r1.x * a_i_inv;

    // Influence from r2.
    let b_i_inv = b.i_inv;
    k11 += r2.y * r2.y * b_i_inv;
    k12 += -r2.x * r2.y * b_i_inv;
    k21 += -r2.x * r2.y * b_i_inv;
    k22 += r2.x * r2.x * b_i_inv;

    let determinant = k11 * k22 - k12 * k21;
    if determinant == 0.0 {
        return None;
    }

    let det_inv = 1.0 / determinant;
    Some((
        Vec2::new(k22 * det_inv, -k12 * det_inv),
        Vec2::new(-k21 * det_inv, k11 * det_inv),
    ))
}

impl Constraint for PivotJoint {
    fn data(&self) -> &ConstraintData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ConstraintData {
        &mut self.data
    }

    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: Float) {
        self.r1 = a.rot.rotate(self.anchor1);
        self.r2 = b.rot.rotate(self.anchor2);

        match k_tensor(a, b, self.r1, self.r2) {
            Some((k1, k2)) => {
                self.k1 = k1;
                self.k2 = k2;
            }
            None => {
                log::warn!("unsolvable pivot joint: singular mass tensor");
                self.k1 = Vec2::ZERO;
                self.k2 = Vec2::ZERO;
            }
        }

        self.j_max_len = self.data.max_force * dt;

        // Positional error between the two world anchors.
        let delta = (b.p + self.r2) - (a.p + self.r1);
        self.bias = (delta * (-bias_coef(self.data.error_bias, dt) / dt))
            .clamp_length(self.data.max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: Float) {
        apply_impulses(a, b, self.r1, self.r2, self.j_acc * dt_coef);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let vr = relative_velocity(a, b, self.r1, self.r2);

        let j = mult_k(self.bias - vr, self.k1, self.k2);
        let j_old = self.j_acc;
        self.j_acc = (self.j_acc + j).clamp_length(self.j_max_len);
        let j = self.j_acc - j_old;

        apply_impulses(a, b, self.r1, self.r2, j);
    }

    fn impulse(&self) -> Float {
        self.j_acc.length()
    }
}

// ============================================================================
// DampedSpring
// ============================================================================

/// Custom spring force: `f(spring, dist) -> force`.
pub type SpringForceFn = fn(&DampedSpring, Float) -> Float;

/// Soft distance constraint: a linear spring with implicit velocity damping.
///
/// The spring force itself is applied once during `pre_step`; each solver
/// iteration then removes the damped fraction of the relative normal
/// velocity.
#[derive(Clone, Debug)]
pub struct DampedSpring {
    /// Shared constraint state.
    pub data: ConstraintData,
    /// Anchor in body A's local space.
    pub anchor1: Vec2,
    /// Anchor in body B's local space.
    pub anchor2: Vec2,
    /// Rest length of the spring.
    pub rest_length: Float,
    /// Spring constant.
    pub stiffness: Float,
    /// Damping coefficient.
    pub damping: Float,
    /// Replaces the default linear spring force when set.
    pub spring_force_fn: Option<SpringForceFn>,

    target_vrn: Float,
    v_coef: Float,

    r1: Vec2,
    r2: Vec2,
    n_mass: Float,
    n: Vec2,
}

fn default_spring_force(spring: &DampedSpring, dist: Float) -> Float {
    (spring.rest_length - dist) * spring.stiffness
}

impl DampedSpring {
    /// Create a damped spring between two local anchor points.
    #[must_use]
    pub fn new(
        a: BodyHandle,
        b: BodyHandle,
        anchor1: Vec2,
        anchor2: Vec2,
        rest_length: Float,
        stiffness: Float,
        damping: Float,
    ) -> Self {
        Self {
            data: ConstraintData::new(a, b),
            anchor1,
            anchor2,
            rest_length,
            stiffness,
            damping,
            spring_force_fn: None,
            target_vrn: 0.0,
            v_coef: 0.0,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n_mass: 0.0,
            n: Vec2::ZERO,
        }
    }

    fn spring_force(&self, dist: Float) -> Float {
        match self.spring_force_fn {
            Some(custom) => custom(self, dist),
            None => default_spring_force(self, dist),
        }
    }
}

impl Constraint for DampedSpring {
    fn data(&self) -> &ConstraintData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ConstraintData {
        &mut self.data
    }

    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: Float) {
        self.r1 = a.rot.rotate(self.anchor1);
        self.r2 = b.rot.rotate(self.anchor2);

        let delta = (b.p + self.r2) - (a.p + self.r1);
        let mut dist = delta.length();
        if dist == 0.0 {
            dist = Float::INFINITY;
        }
        self.n = delta * (1.0 / dist);

        let k = k_scalar(a, b, self.r1, self.r2, self.n);
        self.n_mass = effective_mass(k);

        self.target_vrn = 0.0;
        self.v_coef = 1.0 - exp(-self.damping * dt * k);

        // Apply the spring force directly.
        let f_spring = self.spring_force(dist);
        apply_impulses(a, b, self.r1, self.r2, self.n * (f_spring * dt));
    }

    fn apply_cached_impulse(&mut self, _a: &mut Body, _b: &mut Body, _dt_coef: Float) {}

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, self.n);

        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;

        apply_impulses(a, b, self.r1, self.r2, self.n * (v_damp * self.n_mass));
    }
}

// ============================================================================
// SimpleMotor
// ============================================================================

/// Drives the relative angular velocity of two bodies toward a target rate,
/// clamped by `max_force * dt` per step.
#[derive(Clone, Debug)]
pub struct SimpleMotor {
    /// Shared constraint state.
    pub data: ConstraintData,
    /// Target relative angular rate in radians per second.
    pub rate: Float,

    i_sum: Float,
    j_acc: Float,
    j_max: Float,
}

impl SimpleMotor {
    /// Create a motor between two bodies with the given rate.
    #[must_use]
    pub fn new(a: BodyHandle, b: BodyHandle, rate: Float) -> Self {
        Self {
            data: ConstraintData::new(a, b),
            rate,
            i_sum: 0.0,
            j_acc: 0.0,
            j_max: 0.0,
        }
    }
}

impl Constraint for SimpleMotor {
    fn data(&self) -> &ConstraintData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ConstraintData {
        &mut self.data
    }

    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: Float) {
        self.i_sum = effective_mass(a.i_inv + b.i_inv);
        self.j_max = self.data.max_force * dt;
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: Float) {
        let j = self.j_acc * dt_coef;
        a.w -= j * a.i_inv;
        b.w += j * b.i_inv;
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        // Relative rotational velocity error.
        let wr = b.w - a.w + self.rate;

        let j = -wr * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = clamp(j_old + j, -self.j_max, self.j_max);
        let j = self.j_acc - j_old;

        a.w -= j * a.i_inv;
        b.w += j * b.i_inv;
    }

    fn impulse(&self) -> Float {
        self.j_acc.abs()
    }
}

// ============================================================================
// Tests
// ============================================================================
