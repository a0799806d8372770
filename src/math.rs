//! 2D Math Primitives
//!
//! Scalar, vector, rotation, and transform types shared by every subsystem.
//!
//! # Features
//!
//! - **Vec2**: 2D vector with full operator overloading
//! - **Rotation**: cached unit vector (cos, sin) for fast rotations
//! - **Transform**: position + rotation, the local→world mapping for shapes
//! - **Scalar helpers**: clamp and `no_std`-safe elementary functions

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scalar type used throughout the engine.
pub type Float = f64;

/// Positive infinity, the mass/moment of static bodies.
pub const INFINITY: Float = Float::INFINITY;

// ============================================================================
// Scalar helpers
// ============================================================================

/// Clamp `value` into `[min, max]`.
#[inline]
#[must_use]
pub fn clamp(value: Float, min: Float, max: Float) -> Float {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Square root.
#[inline]
#[must_use]
pub fn sqrt(x: Float) -> Float {
    #[cfg(feature = "std")]
    {
        x.sqrt()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::sqrt(x)
    }
}

/// `base` raised to `exp`.
#[inline]
#[must_use]
pub fn powf(base: Float, exp: Float) -> Float {
    #[cfg(feature = "std")]
    {
        base.powf(exp)
    }
    #[cfg(not(feature = "std"))]
    {
        libm::pow(base, exp)
    }
}

/// Natural exponential.
#[inline]
#[must_use]
pub fn exp(x: Float) -> Float {
    #[cfg(feature = "std")]
    {
        x.exp()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::exp(x)
    }
}

/// Simultaneous sine and cosine.
#[inline]
#[must_use]
pub fn sin_cos(x: Float) -> (Float, Float) {
    #[cfg(feature = "std")]
    {
        x.sin_cos()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::sincos(x)
    }
}

// ============================================================================
// Vec2
// ============================================================================

/// 2D vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Vec2 {
    /// X component
    pub x: Float,
    /// Y component
    pub y: Float,
}

impl Vec2 {
    /// Zero vector (0, 0).
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Unit X vector (1, 0).
    pub const UNIT_X: Self = Self { x: 1.0, y: 0.0 };

    /// Unit Y vector (0, 1).
    pub const UNIT_Y: Self = Self { x: 0.0, y: 1.0 };

    /// Create a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: Float, y: Float) -> Self {
        Self { x, y }
    }

    /// Squared length (avoids the square root).
    #[inline]
    #[must_use]
    pub fn length_sq(self) -> Float {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    #[must_use]
    pub fn length(self) -> Float {
        sqrt(self.length_sq())
    }

    /// Normalize to unit length. Returns `ZERO` for zero-length vectors.
    #[inline]
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            self / len
        }
    }

    /// Dot product.
    #[inline]
    #[must_use]
    pub fn dot(self, rhs: Self) -> Float {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 2D cross product, the scalar `self.x * rhs.y - self.y * rhs.x`.
    #[inline]
    #[must_use]
    pub fn cross(self, rhs: Self) -> Float {
        self.x * rhs.y - self.y * rhs.x
    }

    /// Perpendicular vector, 90 degrees counter-clockwise: `(-y, x)`.
    #[inline]
    #[must_use]
    pub fn perp(self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_to(self, other: Self) -> Float {
        (other - self).length()
    }

    /// Componentwise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self {
            x: if self.x < other.x { self.x } else { other.x },
            y: if self.y < other.y { self.y } else { other.y },
        }
    }

    /// Componentwise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            x: if self.x > other.x { self.x } else { other.x },
            y: if self.y > other.y { self.y } else { other.y },
        }
    }

    /// Clamp the vector's length to at most `limit`.
    #[must_use]
    pub fn clamp_length(self, limit: Float) -> Self {
        if self.dot(self) > limit * limit {
            self.normalize() * limit
        } else {
            self
        }
    }
}

impl Add for Vec2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<Float> for Vec2 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Float) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<Float> for Vec2 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Float) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

// ============================================================================
// Rotation
// ============================================================================

/// A rotation stored as the unit vector `(cos a, sin a)`.
///
/// Rotating by a cached unit vector is a complex multiply, which avoids
/// re-evaluating trigonometry in the per-shape update loop.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rotation {
    /// cos(angle)
    pub c: Float,
    /// sin(angle)
    pub s: Float,
}

impl Rotation {
    /// The identity rotation (angle 0).
    pub const IDENTITY: Self = Self { c: 1.0, s: 0.0 };

    /// Build from an angle in radians.
    #[inline]
    #[must_use]
    pub fn from_angle(angle: Float) -> Self {
        let (s, c) = sin_cos(angle);
        Self { c, s }
    }

    /// Rotate a vector.
    #[inline]
    #[must_use]
    pub fn rotate(self, v: Vec2) -> Vec2 {
        Vec2 {
            x: v.x * self.c - v.y * self.s,
            y: v.x * self.s + v.y * self.c,
        }
    }

    /// Rotate a vector by the inverse rotation.
    #[inline]
    #[must_use]
    pub fn unrotate(self, v: Vec2) -> Vec2 {
        Vec2 {
            x: v.x * self.c + v.y * self.s,
            y: -v.x * self.s + v.y * self.c,
        }
    }
}

impl Default for Rotation {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Rigid transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    /// Translation.
    pub position: Vec2,
    /// Rotation.
    pub rotation: Rotation,
}

impl Transform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: Rotation::IDENTITY,
    };

    /// Create a transform from a position and an angle in radians.
    #[inline]
    #[must_use]
    pub fn new(position: Vec2, angle: Float) -> Self {
        Self {
            position,
            rotation: Rotation::from_angle(angle),
        }
    }

    /// Create a transform from a position and a pre-computed rotation.
    #[inline]
    #[must_use]
    pub const fn with_rotation(position: Vec2, rotation: Rotation) -> Self {
        Self { position, rotation }
    }

    /// Map a local-space point to world space.
    #[inline]
    #[must_use]
    pub fn transform_vect(self, v: Vec2) -> Vec2 {
        self.position + self.rotation.rotate(v)
    }

    /// Rotate a local-space direction to world space (no translation).
    #[inline]
    #[must_use]
    pub fn rotate_vect(self, v: Vec2) -> Vec2 {
        self.rotation.rotate(v)
    }
}

impl Default for Transform {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Tests
// ============================================================================
