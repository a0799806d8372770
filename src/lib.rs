//! impulse2d: 2D Rigid-Body Physics Engine
//!
//! A simulation core built around three tightly coupled subsystems: a
//! dynamic bounding-volume tree with leaf-pair threading for the broad
//! phase, per shape-pair narrow-phase routines yielding persistent contact
//! points, and a warm-started sequential-impulse solver with a separate
//! positional-correction bias channel.
//!
//! # Features
//!
//! - **Broad phase**: incremental AABB tree with fat boxes, a static tree,
//!   and a cached pair list replayed for unmoved shapes
//! - **Narrow phase**: circle, segment, convex polygon, and box collisions
//!   with up to four contacts and stable feature hashes
//! - **Persistent manifolds**: arbiters cached across frames drive warm
//!   starting and the enter/pre-solve/post-solve/exit callback lifecycle
//! - **Sequential impulses**: clamped normal and Coulomb friction impulses
//!   plus a bias velocity channel that resolves interpenetration without
//!   injecting energy
//! - **Joints**: pivot, damped spring, and simple motor constraints
//!
//! # Example
//!
//! ```rust
//! use impulse2d::{Body, Shape, Space, Vec2};
//!
//! let mut space = Space::new();
//! space.config.gravity = Vec2::new(0.0, -900.0);
//!
//! // Static floor.
//! let mut floor = Body::new_static();
//! floor.add_shape(Shape::new_segment(
//!     Vec2::new(0.0, 100.0),
//!     Vec2::new(600.0, 100.0),
//!     1.0,
//! ));
//! space.add_body(floor);
//!
//! // Falling ball.
//! let shape = Shape::new_circle(Vec2::ZERO, 20.0);
//! let mut ball = Body::new(1.0, shape.moment(1.0));
//! ball.add_shape(shape);
//! ball.set_position(Vec2::new(300.0, 200.0));
//! let ball_handle = space.add_body(ball);
//!
//! // Step at 60 Hz.
//! for _ in 0..60 {
//!     space.step(1.0 / 60.0);
//! }
//!
//! assert!(space.body(ball_handle).unwrap().position().y < 200.0);
//! ```
//!
//! # Modules
//!
//! - [`math`]: scalar/vector/rotation/transform primitives
//! - [`aabb`]: bounding boxes and the broad-phase predicates
//! - [`filter`]: group/layer collision filtering
//! - [`shape`]: collision shapes and their world-space caches
//! - [`bbtree`]: the dynamic bounding-volume tree with pair threading
//! - [`contact`]: contact points and feature hashing
//! - [`collide`]: narrow-phase dispatch
//! - [`arbiter`]: persistent contact manifolds and the impulse math
//! - [`body`]: rigid bodies and collision callbacks
//! - [`constraint`]: the constraint interface and shared solver helpers
//! - [`joint`]: pivot joint, damped spring, simple motor
//! - [`space`]: the simulation space and step pipeline
//! - [`error`]: unified error type
//!
//! # Determinism
//!
//! Stepping is single-threaded and runs to completion; within a step,
//! integration, collision, and solving happen in a fixed order, arbiters
//! solve in insertion order, and every cache uses ordered containers.
//! Two identical runs produce bit-identical body states.

#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod aabb;
pub mod arbiter;
pub mod bbtree;
pub mod body;
pub mod collide;
pub mod constraint;
pub mod contact;
pub mod error;
pub mod filter;
pub mod joint;
pub mod math;
pub mod shape;
pub mod space;

// Re-export commonly used types
pub use aabb::{combine, merged_area, proximity, test_overlap, Aabb};
pub use arbiter::{Arbiter, ArbiterState, PairKey};
pub use bbtree::{BbTree, LeafBounds};
pub use body::{Body, BodyHandle, CollisionHandler};
pub use collide::{collide, MAX_CONTACTS};
pub use constraint::{Constraint, ConstraintData, ERROR_BIAS};
pub use contact::{hash_pair, Contact, HashValue};
pub use error::PhysicsError;
pub use filter::{CollisionFilter, Group, Layer};
pub use joint::{DampedSpring, PivotJoint, SimpleMotor};
pub use math::{Float, Rotation, Transform, Vec2};
pub use shape::{Shape, ShapeKind, ShapeType};
pub use space::{ConstraintHandle, ShapeId, Space, SpaceConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::arbiter::{Arbiter, ArbiterState};
    pub use crate::body::{Body, BodyHandle, CollisionHandler};
    pub use crate::constraint::{Constraint, ConstraintData};
    pub use crate::error::PhysicsError;
    pub use crate::filter::CollisionFilter;
    pub use crate::joint::{DampedSpring, PivotJoint, SimpleMotor};
    pub use crate::math::{Float, Rotation, Transform, Vec2};
    pub use crate::shape::{Shape, ShapeKind, ShapeType};
    pub use crate::space::{ConstraintHandle, ShapeId, Space, SpaceConfig};
}

#[cfg(test)]
mod compile_smoke_tests {
    //! Verify that core types from the prelude and key modules are
    //! accessible. These tests catch accidental breakage of public
    //! re-exports.

    use super::*;

    #[test]
    fn test_prelude_types_accessible() {
        let _ = Vec2::ZERO;
        let _ = Rotation::IDENTITY;
        let _ = Transform::IDENTITY;
        let _ = SpaceConfig::default();
        let _ = CollisionFilter::default();
        let _ = Aabb::default();
    }

    #[test]
    fn test_error_type_accessible() {
        let e = PhysicsError::InvalidBodyHandle { handle: 0 };
        let _ = format!("{}", e);
    }

    #[test]
    fn test_space_constructible() {
        let space = Space::new();
        assert_eq!(space.body_count(), 0);
        assert_eq!(space.constraint_count(), 0);
    }
}
