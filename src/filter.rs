//! Collision Filtering (Group/Layer System)
//!
//! Decides which shape pairs may collide before any geometry runs.
//!
//! Two shapes can collide iff:
//!   - they are not in the same non-zero group, and
//!   - their layer bitmasks intersect: `(a.layer & b.layer) != 0`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Group identifier. Shapes sharing a non-zero group never collide.
pub type Group = i32;

/// Layer bitmask. Shapes collide only when their layers intersect.
pub type Layer = u32;

/// Collision filter carried by every shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionFilter {
    /// Group of this shape. Shapes in the same non-zero group don't collide.
    pub group: Group,
    /// Layer bitmask. Shapes only collide if the bitwise and of their layers
    /// is non-zero.
    pub layer: Layer,
}

impl CollisionFilter {
    /// Default filter: no group, member of every layer.
    pub const DEFAULT: Self = Self {
        group: 0,
        layer: Layer::MAX,
    };

    /// Filter that collides with nothing.
    pub const NONE: Self = Self { group: 0, layer: 0 };

    /// Create a new collision filter.
    #[inline]
    #[must_use]
    pub const fn new(group: Group, layer: Layer) -> Self {
        Self { group, layer }
    }

    /// Check whether two filters allow collision.
    #[inline]
    #[must_use]
    pub fn can_collide(a: &Self, b: &Self) -> bool {
        // Same non-zero group => never collide
        if a.group != 0 && a.group == b.group {
            return false;
        }
        (a.layer & b.layer) != 0
    }
}

impl Default for CollisionFilter {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}
