//! Contact Points and Feature Hashing
//!
//! A [`Contact`] is one point of a manifold between two shapes. Its `hash`
//! identifies the generating feature (polygon vertex, segment endpoint) so
//! the same physical contact regenerated next frame keeps its accumulated
//! impulses — the basis of warm starting.

use crate::math::{Float, Vec2};

/// Stable identifier used for shapes and contact features.
pub type HashValue = u32;

/// Multiplier used to mix feature hashes.
pub const HASH_COEF: HashValue = 3_344_921_057;

/// Combine two hash values symmetrically enough for feature identity.
#[inline]
#[must_use]
pub fn hash_pair(a: HashValue, b: HashValue) -> HashValue {
    (a.wrapping_mul(HASH_COEF)) ^ (b.wrapping_mul(HASH_COEF))
}

/// A single contact point between two shapes.
///
/// `jn_acc` and `jt_acc` persist across frames (copied forward by the
/// arbiter when the feature hash matches); `j_bias` and the pre-step caches
/// are recomputed every step.
#[derive(Clone, Copy, Debug, Default)]
pub struct Contact {
    /// World-space contact position.
    pub p: Vec2,
    /// Contact normal (unit length, points from shape A toward shape B).
    pub n: Vec2,
    /// Penetration distance; `<= 0` while the shapes touch.
    pub dist: Float,

    /// Offset from body A's center at pre-step time.
    pub r1: Vec2,
    /// Offset from body B's center at pre-step time.
    pub r2: Vec2,
    /// Effective mass along the normal.
    pub n_mass: Float,
    /// Effective mass along the tangent.
    pub t_mass: Float,
    /// Target restitution speed.
    pub bounce: Float,

    /// Accumulated normal impulse (kept across frames).
    pub jn_acc: Float,
    /// Accumulated friction impulse (kept across frames).
    pub jt_acc: Float,
    /// Accumulated positional-correction impulse (this frame only).
    pub j_bias: Float,
    /// Target separating speed for positional correction.
    pub bias: Float,

    /// Feature hash; the persistence key across frames.
    pub hash: HashValue,
}

impl Contact {
    /// Re-initialize geometric state and zero the impulse accumulators.
    ///
    /// Called by the narrow phase for every emitted contact; the arbiter
    /// copies old accumulators back in afterwards when the hash matches.
    #[inline]
    pub fn reset(&mut self, pos: Vec2, normal: Vec2, dist: Float, hash: HashValue) {
        self.p = pos;
        self.n = normal;
        self.dist = dist;
        self.hash = hash;

        self.jn_acc = 0.0;
        self.jt_acc = 0.0;
        self.j_bias = 0.0;
    }

    /// Contact normal.
    #[inline]
    #[must_use]
    pub fn normal(&self) -> Vec2 {
        self.n
    }

    /// World-space contact position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pair_symmetric() {
        assert_eq!(hash_pair(3, 11), hash_pair(11, 3));
    }

    #[test]
    fn test_hash_pair_distinguishes_features() {
        let shape = 42;
        assert_ne!(hash_pair(shape, 0), hash_pair(shape, 1));
        assert_ne!(hash_pair(shape, 1), hash_pair(shape, 2));
    }

    #[test]
    fn test_reset_clears_accumulators() {
        let mut con = Contact {
            jn_acc: 5.0,
            jt_acc: -2.0,
            j_bias: 1.0,
            ..Contact::default()
        };
        con.reset(Vec2::new(1.0, 2.0), Vec2::UNIT_X, -0.5, 99);
        assert_eq!(con.jn_acc, 0.0);
        assert_eq!(con.jt_acc, 0.0);
        assert_eq!(con.j_bias, 0.0);
        assert_eq!(con.p, Vec2::new(1.0, 2.0));
        assert_eq!(con.n, Vec2::UNIT_X);
        assert_eq!(con.dist, -0.5);
        assert_eq!(con.hash, 99);
    }
}
