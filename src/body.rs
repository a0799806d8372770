//! Rigid Bodies
//!
//! A [`Body`] carries mass state (with cached inverses), position and
//! velocity, force/torque accumulators, and the bias velocity channel used
//! exclusively for positional correction. Bodies own their attached shapes;
//! the space refers to bodies through [`BodyHandle`]s.
//!
//! Static bodies have infinite mass and moment, never integrate, and are
//! recognized by an infinite idle time.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::arbiter::Arbiter;
use crate::math::{Float, Rotation, Vec2, INFINITY};
use crate::shape::Shape;

/// Handle to a body slot inside a [`Space`](crate::space::Space).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(
    /// Slot index within the space's body arena.
    pub u32,
);

/// User-replaceable position integrator.
pub type UpdatePositionFn = fn(&mut Body, dt: Float);

/// User-replaceable velocity integrator.
pub type UpdateVelocityFn = fn(&mut Body, gravity: Vec2, damping: Float, dt: Float);

/// Per-body collision lifecycle callbacks.
///
/// Handlers may inspect and (in `enter`/`pre_solve`) tune the arbiter, but
/// must not mutate the space's collections; the space is mid-step when these
/// run.
pub trait CollisionHandler {
    /// First frame two shapes touch. Return `false` to ignore the manifold
    /// until the shapes separate.
    fn enter(&mut self, _arbiter: &mut Arbiter) -> bool {
        true
    }

    /// Called every step before impulses are applied. Return `false` to
    /// skip impulse application this step.
    fn pre_solve(&mut self, _arbiter: &mut Arbiter) -> bool {
        true
    }

    /// Called after the solver has run; accumulated impulses are final.
    fn post_solve(&mut self, _arbiter: &Arbiter) {}

    /// Fired once when a manifold goes stale (the shapes separated).
    fn exit(&mut self, _arbiter: &Arbiter) {}
}

// ============================================================================
// Body
// ============================================================================

/// A rigid body.
pub struct Body {
    /// Mass. Must agree with `m_inv`; use `set_mass` to change it.
    pub(crate) m: Float,
    /// Mass inverse (0 for static bodies).
    pub(crate) m_inv: Float,
    /// Moment of inertia. Must agree with `i_inv`; use `set_moment`.
    pub(crate) i: Float,
    /// Moment inverse (0 for static bodies).
    pub(crate) i_inv: Float,

    /// Position of the center of gravity.
    pub(crate) p: Vec2,
    /// Linear velocity.
    pub(crate) v: Vec2,
    /// Accumulated force, zeroed by `update_velocity`.
    pub(crate) f: Vec2,

    /// Rotation angle in radians.
    pub(crate) a: Float,
    /// Angular velocity in radians per second.
    pub(crate) w: Float,
    /// Accumulated torque, zeroed by `update_velocity`.
    pub(crate) t: Float,

    /// Cached unit-length rotation vector for the current angle.
    pub(crate) rot: Rotation,

    /// Positional-correction velocity channel, zeroed each step.
    pub(crate) v_bias: Vec2,
    /// Positional-correction angular channel, zeroed each step.
    pub(crate) w_bias: Float,

    /// Disabled bodies neither integrate nor collide.
    pub enabled: bool,
    /// Skip gravity for this body (still damped and forced).
    pub ignore_gravity: bool,
    /// Set when removal has been requested; cleaned up after the step.
    pub(crate) deleted: bool,
    /// Whether this body currently belongs to a space.
    pub(crate) in_space: bool,

    /// Time this body has spent below the idle threshold. Infinite for
    /// static bodies. Reserved for the sleeping algorithm.
    pub(crate) idle_time: Float,

    /// Shapes attached to this body. Owned; their lifetime is bound to the
    /// body's.
    pub shapes: Vec<Shape>,

    /// Collision lifecycle callbacks for this body.
    pub handler: Option<Box<dyn CollisionHandler>>,
    /// Replaces the default position integrator when set.
    pub update_position_fn: Option<UpdatePositionFn>,
    /// Replaces the default velocity integrator when set.
    pub update_velocity_fn: Option<UpdateVelocityFn>,
}

impl Body {
    /// Create a dynamic body with the given mass and moment of inertia.
    ///
    /// # Panics
    ///
    /// Panics if `mass` or `moment` is not positive.
    #[must_use]
    pub fn new(mass: Float, moment: Float) -> Self {
        let mut body = Self::raw();
        body.set_mass(mass);
        body.set_moment(moment);
        body
    }

    /// Create a static body: infinite mass and moment, never integrated.
    #[must_use]
    pub fn new_static() -> Self {
        let mut body = Self::raw();
        body.set_mass(INFINITY);
        body.set_moment(INFINITY);
        body.ignore_gravity = true;
        body.idle_time = INFINITY;
        body
    }

    fn raw() -> Self {
        Self {
            m: 1.0,
            m_inv: 1.0,
            i: 1.0,
            i_inv: 1.0,
            p: Vec2::ZERO,
            v: Vec2::ZERO,
            f: Vec2::ZERO,
            a: 0.0,
            w: 0.0,
            t: 0.0,
            rot: Rotation::IDENTITY,
            v_bias: Vec2::ZERO,
            w_bias: 0.0,
            enabled: true,
            ignore_gravity: false,
            deleted: false,
            in_space: false,
            idle_time: 0.0,
            shapes: Vec::new(),
            handler: None,
            update_position_fn: None,
            update_velocity_fn: None,
        }
    }

    /// Attach a shape to this body.
    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    // ------------------------------------------------------------------
    // Mass state
    // ------------------------------------------------------------------

    /// Set the mass, keeping `m_inv` in agreement. Infinite mass yields a
    /// zero inverse.
    ///
    /// # Panics
    ///
    /// Panics if `mass` is not positive.
    pub fn set_mass(&mut self, mass: Float) {
        assert!(mass > 0.0, "mass must be positive and non-zero");
        self.m = mass;
        self.m_inv = if mass == INFINITY { 0.0 } else { 1.0 / mass };
    }

    /// Set the moment of inertia, keeping `i_inv` in agreement.
    ///
    /// # Panics
    ///
    /// Panics if `moment` is not positive.
    pub fn set_moment(&mut self, moment: Float) {
        assert!(moment > 0.0, "moment of inertia must be positive and non-zero");
        self.i = moment;
        self.i_inv = if moment == INFINITY { 0.0 } else { 1.0 / moment };
    }

    /// Mass.
    #[inline]
    #[must_use]
    pub fn mass(&self) -> Float {
        self.m
    }

    /// Inverse mass (0 for static bodies).
    #[inline]
    #[must_use]
    pub fn mass_inv(&self) -> Float {
        self.m_inv
    }

    /// Moment of inertia.
    #[inline]
    #[must_use]
    pub fn moment(&self) -> Float {
        self.i
    }

    /// Inverse moment of inertia (0 for static bodies).
    #[inline]
    #[must_use]
    pub fn moment_inv(&self) -> Float {
        self.i_inv
    }

    /// `true` when this body has infinite mass and moment.
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.idle_time == INFINITY
    }

    /// `true` when this body is not attached to a space.
    #[inline]
    #[must_use]
    pub fn is_rogue(&self) -> bool {
        !self.in_space
    }

    /// Time spent below the idle speed threshold (reserved for sleeping).
    #[inline]
    #[must_use]
    pub fn idle_time(&self) -> Float {
        self.idle_time
    }

    // ------------------------------------------------------------------
    // Kinematic state
    // ------------------------------------------------------------------

    /// Position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.p
    }

    /// Teleport the body. Shape caches refresh on the next step.
    #[inline]
    pub fn set_position(&mut self, p: Vec2) {
        self.p = p;
    }

    /// Rotation angle in radians.
    #[inline]
    #[must_use]
    pub fn angle(&self) -> Float {
        self.a
    }

    /// Set the rotation angle, refreshing the cached rotation vector.
    #[inline]
    pub fn set_angle(&mut self, angle: Float) {
        self.a = angle;
        self.rot = Rotation::from_angle(angle);
    }

    /// Add to the rotation angle.
    #[inline]
    pub fn add_angle(&mut self, angle: Float) {
        self.set_angle(self.a + angle);
    }

    /// Cached unit rotation vector for the current angle.
    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rot
    }

    /// Linear velocity.
    #[inline]
    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.v
    }

    /// Set the linear velocity.
    #[inline]
    pub fn set_velocity(&mut self, v: Vec2) {
        self.v = v;
    }

    /// Accumulate linear velocity.
    #[inline]
    pub fn add_velocity(&mut self, v: Vec2) {
        self.v += v;
    }

    /// Angular velocity in radians per second.
    #[inline]
    #[must_use]
    pub fn angular_velocity(&self) -> Float {
        self.w
    }

    /// Set the angular velocity.
    #[inline]
    pub fn set_angular_velocity(&mut self, w: Float) {
        self.w = w;
    }

    /// Accumulate angular velocity.
    #[inline]
    pub fn add_angular_velocity(&mut self, w: Float) {
        self.w += w;
    }

    /// Accumulated force.
    #[inline]
    #[must_use]
    pub fn force(&self) -> Vec2 {
        self.f
    }

    /// Set the force accumulator.
    #[inline]
    pub fn set_force(&mut self, f: Vec2) {
        self.f = f;
    }

    /// Accumulate force.
    #[inline]
    pub fn add_force(&mut self, f: Vec2) {
        self.f += f;
    }

    /// Accumulated torque.
    #[inline]
    #[must_use]
    pub fn torque(&self) -> Float {
        self.t
    }

    /// Set the torque accumulator.
    #[inline]
    pub fn set_torque(&mut self, t: Float) {
        self.t = t;
    }

    /// Accumulate torque.
    #[inline]
    pub fn add_torque(&mut self, t: Float) {
        self.t += t;
    }

    /// Bias velocity channel (positional correction).
    #[inline]
    #[must_use]
    pub fn bias_velocity(&self) -> Vec2 {
        self.v_bias
    }

    /// Bias angular channel (positional correction).
    #[inline]
    #[must_use]
    pub fn bias_angular_velocity(&self) -> Float {
        self.w_bias
    }

    // ------------------------------------------------------------------
    // Integration
    // ------------------------------------------------------------------

    /// Integrate position from the real and bias velocity channels, then
    /// zero the bias channel so it cannot inject energy into later steps.
    pub fn update_position(&mut self, dt: Float) {
        if let Some(custom) = self.update_position_fn {
            custom(self, dt);
            return;
        }
        self.default_update_position(dt);
    }

    /// The default explicit-Euler position integrator.
    pub fn default_update_position(&mut self, dt: Float) {
        self.p += (self.v + self.v_bias) * dt;
        self.set_angle(self.a + (self.w + self.w_bias) * dt);

        self.v_bias = Vec2::ZERO;
        self.w_bias = 0.0;
    }

    /// Integrate velocity semi-implicitly from gravity, accumulated force,
    /// and per-step damping, then zero the force and torque accumulators.
    pub fn update_velocity(&mut self, gravity: Vec2, damping: Float, dt: Float) {
        if let Some(custom) = self.update_velocity_fn {
            custom(self, gravity, damping, dt);
            return;
        }
        self.default_update_velocity(gravity, damping, dt);
    }

    /// The default semi-implicit velocity integrator.
    pub fn default_update_velocity(&mut self, gravity: Vec2, damping: Float, dt: Float) {
        self.v = self.v * damping + (gravity + self.f * self.m_inv) * dt;
        self.w = self.w * damping + self.t * self.i_inv * dt;

        self.f = Vec2::ZERO;
        self.t = 0.0;
    }

    /// Kinetic energy: `m·|v|² + i·w²`.
    ///
    /// The zero checks keep `∞ · 0` out of the result for static bodies.
    #[must_use]
    pub fn kinetic_energy(&self) -> Float {
        let mut vsq = self.v.dot(self.v);
        let mut wsq = self.w * self.w;
        if vsq != 0.0 {
            vsq *= self.m;
        }
        if wsq != 0.0 {
            wsq *= self.i;
        }
        vsq + wsq
    }

    /// Refresh the world-space caches of every attached shape.
    pub fn update_shapes(&mut self) {
        let xf = crate::math::Transform::with_rotation(self.p, self.rot);
        for shape in &mut self.shapes {
            shape.update(xf);
        }
    }
}

impl core::fmt::Debug for Body {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Body")
            .field("m", &self.m)
            .field("i", &self.i)
            .field("p", &self.p)
            .field("v", &self.v)
            .field("a", &self.a)
            .field("w", &self.w)
            .field("enabled", &self.enabled)
            .field("shapes", &self.shapes.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
