//! Simulation Space
//!
//! The orchestrator that owns bodies, constraints, both broad-phase trees,
//! and the persistent arbiter cache, and drives the step pipeline:
//!
//! 1. integrate positions (real + bias channels, bias then zeroed)
//! 2. refresh shape world data
//! 3. broad-phase reindex, emitting candidate pairs
//! 4. narrow-phase collide each candidate, merging into the arbiter cache
//! 5. expire stale arbiters (exit callbacks, pooled reclamation)
//! 6. pre-step arbiters and constraints
//! 7. integrate velocities with gravity and damping
//! 8. warm-start from cached impulses
//! 9. `iterations` Gauss–Seidel passes over arbiters and constraints
//! 10. post-solve callbacks
//! 11. drain deferred body removals
//!
//! All mutation happens inside [`Space::step`]; external code must treat
//! the space as exclusively owned while a step runs. Removing a body is
//! deferred: the body is marked deleted and dropped after the current step
//! completes. Collision callbacks receive the arbiter only and must not
//! mutate the space's collections.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::aabb::{test_overlap, Aabb};
use crate::arbiter::{Arbiter, ArbiterState, PairKey};
use crate::bbtree::{BbTree, LeafBounds};
use crate::body::{Body, BodyHandle};
use crate::collide::{collide, MAX_CONTACTS};
use crate::constraint::{bias_coef, Constraint};
use crate::contact::{Contact, HashValue};
use crate::error::PhysicsError;
use crate::filter::{CollisionFilter, Group, Layer};
use crate::math::{powf, Float, Vec2, INFINITY};
use crate::shape::Shape;

/// Identifies one shape inside a space: the owning body and the shape's
/// index within that body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeId {
    /// The owning body.
    pub body: BodyHandle,
    /// Index into the body's shape list.
    pub index: usize,
}

/// Handle to a constraint slot inside a [`Space`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstraintHandle(
    /// Slot index within the space's constraint list.
    pub u32,
);

// ============================================================================
// SpaceConfig
// ============================================================================

/// Tunables recognized by [`Space`].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpaceConfig {
    /// Gauss–Seidel passes per step.
    pub iterations: usize,
    /// Gravity applied to non-static bodies each step.
    pub gravity: Vec2,
    /// Fraction of velocity a body retains per second (1 = no damping).
    pub damping: Float,
    /// Allowed penetration before positional correction activates.
    pub collision_slop: Float,
    /// Fraction of overlap remaining after each second of correction.
    pub collision_bias: Float,
    /// Steps a stale arbiter lingers in the cache before reclamation.
    pub collision_persistence: u64,
    /// Speed threshold for a body to be considered idle. Reserved for the
    /// sleeping algorithm.
    pub idle_speed_threshold: Float,
    /// Idle time before a group of bodies falls asleep. Reserved; infinity
    /// disables sleeping.
    pub sleep_time_threshold: Float,
    /// Rebuild the contact graph each step. Reserved for sleeping/islands.
    pub enable_contact_graph: bool,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            gravity: Vec2::ZERO,
            damping: 1.0,
            collision_slop: 0.5,
            // pow(1 - 0.1, 60): fix 10% of overlap per frame at 60 Hz.
            collision_bias: 0.001_797_010_299_914_44,
            collision_persistence: 3,
            idle_speed_threshold: 0.0,
            sleep_time_threshold: INFINITY,
            enable_contact_graph: false,
        }
    }
}

impl SpaceConfig {
    /// Check the configuration for values the solver cannot run with.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "iterations must be > 0",
            });
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "damping must be within [0, 1]",
            });
        }
        if self.collision_slop < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "collision_slop must be non-negative",
            });
        }
        if !(0.0..1.0).contains(&self.collision_bias) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "collision_bias must be within [0, 1)",
            });
        }
        Ok(())
    }
}

// ============================================================================
// Space
// ============================================================================

/// A 2D physics simulation space.
pub struct Space {
    /// Tunables; adjust freely between steps.
    pub config: SpaceConfig,

    bodies: Vec<Option<Body>>,
    body_free: Vec<u32>,

    constraints: Vec<Option<Box<dyn Constraint>>>,
    constraint_free: Vec<u32>,

    index: BbTree,
    shape_map: BTreeMap<HashValue, ShapeId>,

    cached_arbiters: BTreeMap<PairKey, Arbiter>,
    /// Arbiters participating in this step's solve, in insertion order.
    arbiters: Vec<PairKey>,

    arbiter_pool: Vec<Arbiter>,
    contact_pool: Vec<Vec<Contact>>,

    delete_bodies: Vec<BodyHandle>,

    stamp: u64,
    curr_dt: Float,
    prev_dt: Float,

    pair_scratch: Vec<(HashValue, HashValue)>,
    key_scratch: Vec<PairKey>,
}

impl Space {
    /// Create a space with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SpaceConfig::default()).unwrap_or_else(|_| unreachable!())
    }

    /// Create a space with a custom configuration.
    pub fn with_config(config: SpaceConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            config,
            bodies: Vec::new(),
            body_free: Vec::new(),
            constraints: Vec::new(),
            constraint_free: Vec::new(),
            index: BbTree::new(),
            shape_map: BTreeMap::new(),
            cached_arbiters: BTreeMap::new(),
            arbiters: Vec::new(),
            arbiter_pool: Vec::new(),
            contact_pool: Vec::new(),
            delete_bodies: Vec::new(),
            stamp: 0,
            curr_dt: 0.0,
            prev_dt: 0.0,
            pair_scratch: Vec::new(),
            key_scratch: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Bodies & shapes
    // ------------------------------------------------------------------

    /// Add a body (with its attached shapes) to the space.
    ///
    /// Static bodies index their shapes into the static tree; everything
    /// else goes into the active tree.
    ///
    /// # Panics
    ///
    /// Panics if the body already belongs to a space.
    pub fn add_body(&mut self, mut body: Body) -> BodyHandle {
        assert!(
            !body.in_space,
            "body is already attached to a space and cannot be added to another"
        );
        body.in_space = true;
        body.deleted = false;
        body.update_shapes();

        let handle = match self.body_free.pop() {
            Some(slot) => {
                self.bodies[slot as usize] = Some(body);
                BodyHandle(slot)
            }
            None => {
                self.bodies.push(Some(body));
                BodyHandle((self.bodies.len() - 1) as u32)
            }
        };

        self.index_body_shapes(handle);
        handle
    }

    fn index_body_shapes(&mut self, handle: BodyHandle) {
        let body = self.bodies[handle.0 as usize]
            .as_ref()
            .expect("freshly added body slot is live");
        let is_static = body.is_static();
        let velocity = body.v;

        let mut entries: Vec<(HashValue, Aabb, bool)> = Vec::with_capacity(body.shapes.len());
        for shape in &body.shapes {
            entries.push((shape.hash(), shape.bb, shape.velocity_indexed));
        }

        for (i, (hash, bb, use_velocity)) in entries.into_iter().enumerate() {
            self.shape_map.insert(hash, ShapeId { body: handle, index: i });
            let bounds = LeafBounds {
                bb,
                velocity,
                use_velocity,
            };
            if is_static {
                self.index.insert_static(hash, bounds);
            } else {
                self.index.insert_active(hash, bounds);
            }
        }
    }

    /// Attach an extra shape to a body already in the space.
    pub fn add_shape(&mut self, handle: BodyHandle, shape: Shape) -> Result<ShapeId, PhysicsError> {
        let body = self
            .bodies
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle { handle: handle.0 })?;

        let index = body.shapes.len();
        body.shapes.push(shape);
        let xf = crate::math::Transform::with_rotation(body.p, body.rot);
        body.shapes[index].update(xf);

        let hash = body.shapes[index].hash();
        let bb = body.shapes[index].bb;
        let use_velocity = body.shapes[index].velocity_indexed;
        let velocity = body.v;
        let is_static = body.is_static();

        let id = ShapeId { body: handle, index };
        self.shape_map.insert(hash, id);
        let bounds = LeafBounds {
            bb,
            velocity,
            use_velocity,
        };
        if is_static {
            self.index.insert_static(hash, bounds);
        } else {
            self.index.insert_active(hash, bounds);
        }
        Ok(id)
    }

    /// Borrow a body.
    pub fn body(&self, handle: BodyHandle) -> Result<&Body, PhysicsError> {
        self.bodies
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(PhysicsError::InvalidBodyHandle { handle: handle.0 })
    }

    /// Mutably borrow a body.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body, PhysicsError> {
        self.bodies
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle { handle: handle.0 })
    }

    /// Borrow a shape.
    pub fn shape(&self, id: ShapeId) -> Result<&Shape, PhysicsError> {
        self.body(id.body)?
            .shapes
            .get(id.index)
            .ok_or(PhysicsError::InvalidBodyHandle { handle: id.body.0 })
    }

    /// Visit every live body.
    pub fn each_body<F: FnMut(BodyHandle, &Body)>(&self, mut f: F) {
        for (i, slot) in self.bodies.iter().enumerate() {
            if let Some(body) = slot {
                f(BodyHandle(i as u32), body);
            }
        }
    }

    /// Number of live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|slot| slot.is_some()).count()
    }

    /// Request removal of a body.
    ///
    /// The body is marked deleted immediately but its slot, shapes, and
    /// arbiters are reclaimed only after the current step completes.
    pub fn remove_body(&mut self, handle: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle.0 as usize).and_then(Option::as_mut) {
            if body.deleted {
                return;
            }
            body.deleted = true;
            self.delete_bodies.push(handle);
        }
    }

    fn finalize_removals(&mut self) {
        while let Some(handle) = self.delete_bodies.pop() {
            let Some(mut body) = self.bodies[handle.0 as usize].take() else {
                continue;
            };
            for shape in &body.shapes {
                self.index.remove(shape.hash());
                self.shape_map.remove(&shape.hash());
            }
            body.shapes.clear();
            body.in_space = false;
            self.body_free.push(handle.0);
        }
    }

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------

    /// Add a constraint. Both bodies must be distinct and live in this
    /// space.
    pub fn add_constraint(
        &mut self,
        constraint: Box<dyn Constraint>,
    ) -> Result<ConstraintHandle, PhysicsError> {
        let data = *constraint.data();
        if data.body_a == data.body_b {
            return Err(PhysicsError::InvalidConstraint {
                reason: "constraint connects a body to itself",
            });
        }
        self.body(data.body_a)
            .map_err(|_| PhysicsError::InvalidConstraint {
                reason: "constraint references a body that is not in this space",
            })?;
        self.body(data.body_b)
            .map_err(|_| PhysicsError::InvalidConstraint {
                reason: "constraint references a body that is not in this space",
            })?;

        let handle = match self.constraint_free.pop() {
            Some(slot) => {
                self.constraints[slot as usize] = Some(constraint);
                ConstraintHandle(slot)
            }
            None => {
                self.constraints.push(Some(constraint));
                ConstraintHandle((self.constraints.len() - 1) as u32)
            }
        };
        Ok(handle)
    }

    /// Borrow a constraint.
    pub fn constraint(&self, handle: ConstraintHandle) -> Result<&dyn Constraint, PhysicsError> {
        self.constraints
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(AsRef::as_ref)
            .ok_or(PhysicsError::InvalidConstraintHandle { handle: handle.0 })
    }

    /// Remove a constraint and return it.
    ///
    /// # Panics
    ///
    /// Panics when the handle does not refer to a constraint in this space
    /// (removed twice, or never added).
    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Box<dyn Constraint> {
        let slot = self
            .constraints
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .expect("cannot remove a constraint that was not added to the space");
        self.constraint_free.push(handle.0);
        slot
    }

    /// Number of live constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.iter().filter(|slot| slot.is_some()).count()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Visit every arbiter that participated in the last step's solve.
    pub fn each_arbiter<F: FnMut(&Arbiter)>(&self, mut f: F) {
        for key in &self.arbiters {
            if let Some(arb) = self.cached_arbiters.get(key) {
                f(arb);
            }
        }
    }

    /// Number of arbiters in the persistent cache (any state).
    #[must_use]
    pub fn cached_arbiter_count(&self) -> usize {
        self.cached_arbiters.len()
    }

    /// Arbiters currently parked in the free pool (test support).
    #[must_use]
    pub fn pooled_arbiters(&self) -> usize {
        self.arbiter_pool.len()
    }

    /// Contact arrays currently parked in the free pool (test support).
    #[must_use]
    pub fn pooled_contact_arrays(&self) -> usize {
        self.contact_pool.len()
    }

    /// Step counter, incremented once per [`Space::step`].
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Walk every structural invariant of the space and panic on any
    /// violation: tree links and boxes, pair-thread symmetry, and the
    /// arbiter-cache lifecycle bound (test support).
    pub fn validate(&self) {
        self.index.validate();

        for arb in self.cached_arbiters.values() {
            let live = self.shape_map.contains_key(&self.shape_hash(arb.shape_a))
                && self.shape_map.contains_key(&self.shape_hash(arb.shape_b));
            let within_persistence = arb.state == ArbiterState::Cached
                && self.stamp - arb.stamp <= self.config.collision_persistence;
            assert!(
                live || within_persistence,
                "cached arbiter outlived its shapes and persistence window"
            );
        }
    }

    fn shape_hash(&self, id: ShapeId) -> HashValue {
        self.bodies
            .get(id.body.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|body| body.shapes.get(id.index))
            .map_or(0, Shape::hash)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Find every shape containing the world-space point, honoring the
    /// group/layer filter. Static shapes are scanned first.
    pub fn point_query(
        &self,
        point: Vec2,
        layer: Layer,
        group: Group,
        include_sensors: bool,
    ) -> Vec<ShapeId> {
        let mut found = Vec::new();
        let probe = CollisionFilter::new(group, layer);
        let bb = Aabb::for_circle(point, 0.0);

        let mut visit = |hash: HashValue, found: &mut Vec<ShapeId>| {
            let Some(&id) = self.shape_map.get(&hash) else {
                return;
            };
            let Ok(shape) = self.shape(id) else { return };
            if !include_sensors && shape.is_sensor {
                return;
            }
            if !CollisionFilter::can_collide(&probe, &shape.filter) {
                return;
            }
            if shape.test_point(point) {
                found.push(id);
            }
        };

        self.index.query_static(&bb, |hash| visit(hash, &mut found));
        self.index.query_active(&bb, |hash| visit(hash, &mut found));
        found
    }

    /// First shape containing the point, preferring static shapes.
    pub fn point_query_first(
        &self,
        point: Vec2,
        layer: Layer,
        group: Group,
        include_sensors: bool,
    ) -> Option<ShapeId> {
        self.point_query(point, layer, group, include_sensors)
            .into_iter()
            .next()
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds. A zero `dt` is a no-op.
    pub fn step(&mut self, dt: Float) {
        if dt == 0.0 {
            return;
        }

        // Reset last step's solver arbiters; ignored manifolds keep their
        // state until separation.
        for key in &self.arbiters {
            if let Some(arb) = self.cached_arbiters.get_mut(key) {
                arb.state = ArbiterState::Normal;
            }
        }
        self.arbiters.clear();

        self.prev_dt = self.curr_dt;
        self.curr_dt = dt;
        self.stamp += 1;

        // Integrate positions and refresh shape world data.
        for slot in &mut self.bodies {
            if let Some(body) = slot {
                if body.enabled && !body.deleted && !body.is_static() {
                    body.update_position(dt);
                }
            }
        }
        for slot in &mut self.bodies {
            if let Some(body) = slot {
                if body.enabled && !body.deleted {
                    body.update_shapes();
                }
            }
        }

        // Broad phase: refit moved leaves, collect candidate pairs.
        let mut pairs = core::mem::take(&mut self.pair_scratch);
        pairs.clear();
        {
            let Space {
                ref mut index,
                ref bodies,
                ref shape_map,
                ..
            } = *self;
            index.reindex_query(
                |hash| {
                    let id = shape_map
                        .get(&hash)
                        .expect("indexed shape missing from space map");
                    let body = bodies[id.body.0 as usize]
                        .as_ref()
                        .expect("indexed shape belongs to a dead body");
                    let shape = &body.shapes[id.index];
                    LeafBounds {
                        bb: shape.bb,
                        velocity: body.v,
                        use_velocity: shape.velocity_indexed,
                    }
                },
                &mut pairs,
            );
        }

        // Narrow phase over every candidate pair.
        for i in 0..pairs.len() {
            let (ha, hb) = pairs[i];
            self.collide_shapes(ha, hb);
        }
        self.pair_scratch = pairs;

        self.expire_arbiters();

        // Pre-step arbiters and constraints.
        let inv_dt = 1.0 / dt;
        let slop = self.config.collision_slop;
        let bias = bias_coef(self.config.collision_bias, dt);
        {
            let Space {
                ref mut cached_arbiters,
                ref arbiters,
                ref bodies,
                ..
            } = *self;
            for key in arbiters {
                let Some(arb) = cached_arbiters.get_mut(key) else {
                    continue;
                };
                let (Some(a), Some(b)) = (
                    bodies[arb.body_a.0 as usize].as_ref(),
                    bodies[arb.body_b.0 as usize].as_ref(),
                ) else {
                    continue;
                };
                arb.pre_step(a, b, inv_dt, slop, bias);
            }
        }
        {
            let Space {
                ref mut constraints,
                ref mut bodies,
                ..
            } = *self;
            for slot in constraints.iter_mut() {
                if let Some(con) = slot {
                    let (ha, hb) = (con.data().body_a, con.data().body_b);
                    let (a, b) = body_pair_mut(bodies, ha, hb);
                    con.pre_solve(a, b);
                    con.pre_step(a, b, dt);
                }
            }
        }

        // Integrate velocities.
        let damping = powf(self.config.damping, dt);
        let gravity = self.config.gravity;
        for slot in &mut self.bodies {
            if let Some(body) = slot {
                if body.enabled && !body.deleted && !body.is_static() {
                    let g = if body.ignore_gravity {
                        Vec2::ZERO
                    } else {
                        gravity
                    };
                    body.update_velocity(g, damping, dt);
                }
            }
        }

        // Warm start from the previous frame's converged impulses.
        let dt_coef = if self.prev_dt == 0.0 {
            1.0
        } else {
            dt / self.prev_dt
        };
        {
            let Space {
                ref cached_arbiters,
                ref arbiters,
                ref mut bodies,
                ref mut constraints,
                ..
            } = *self;
            for key in arbiters {
                let Some(arb) = cached_arbiters.get(key) else {
                    continue;
                };
                let (a, b) = body_pair_mut(bodies, arb.body_a, arb.body_b);
                arb.apply_cached_impulse(a, b, dt_coef);
            }
            for slot in constraints.iter_mut() {
                if let Some(con) = slot {
                    let (ha, hb) = (con.data().body_a, con.data().body_b);
                    let (a, b) = body_pair_mut(bodies, ha, hb);
                    con.apply_cached_impulse(a, b, dt_coef);
                }
            }
        }

        // The Gauss–Seidel iterations.
        {
            let Space {
                ref mut cached_arbiters,
                ref arbiters,
                ref mut bodies,
                ref mut constraints,
                config,
                ..
            } = *self;
            for _ in 0..config.iterations {
                for key in arbiters {
                    let Some(arb) = cached_arbiters.get_mut(key) else {
                        continue;
                    };
                    let (a, b) = body_pair_mut(bodies, arb.body_a, arb.body_b);
                    arb.apply_impulse(a, b);
                }
                for slot in constraints.iter_mut() {
                    if let Some(con) = slot {
                        let (ha, hb) = (con.data().body_a, con.data().body_b);
                        let (a, b) = body_pair_mut(bodies, ha, hb);
                        con.apply_impulse(a, b);
                    }
                }
            }
        }

        // Post-solve callbacks.
        {
            let Space {
                ref mut constraints,
                ref bodies,
                ..
            } = *self;
            for slot in constraints.iter_mut() {
                if let Some(con) = slot {
                    let (ha, hb) = (con.data().body_a, con.data().body_b);
                    let (Some(a), Some(b)) = (
                        bodies[ha.0 as usize].as_ref(),
                        bodies[hb.0 as usize].as_ref(),
                    ) else {
                        continue;
                    };
                    con.post_solve(a, b);
                }
            }
        }
        {
            let Space {
                ref cached_arbiters,
                ref arbiters,
                ref mut bodies,
                ..
            } = *self;
            for key in arbiters {
                let Some(arb) = cached_arbiters.get(key) else {
                    continue;
                };
                for handle in [arb.body_a, arb.body_b] {
                    if let Some(body) = bodies[handle.0 as usize].as_mut() {
                        if let Some(handler) = body.handler.as_mut() {
                            handler.post_solve(arb);
                        }
                    }
                }
            }
        }

        self.finalize_removals();
    }

    /// Narrow-phase trigger for one candidate pair.
    fn collide_shapes(&mut self, ha: HashValue, hb: HashValue) {
        let Some(&id_a) = self.shape_map.get(&ha) else {
            return;
        };
        let Some(&id_b) = self.shape_map.get(&hb) else {
            return;
        };

        if self.bodies[id_a.body.0 as usize].is_none() || self.bodies[id_b.body.0 as usize].is_none()
        {
            return;
        }

        let mut contacts = self.pull_contact_buffer();

        let mut a_id = id_a;
        let mut b_id = id_b;
        let mut sensor = false;
        let mut rejected = true;
        let mut num = 0;
        {
            let body_a = self.bodies[id_a.body.0 as usize]
                .as_ref()
                .expect("liveness checked above");
            let body_b = self.bodies[id_b.body.0 as usize]
                .as_ref()
                .expect("liveness checked above");
            let sa = &body_a.shapes[id_a.index];
            let sb = &body_b.shapes[id_b.index];

            if !query_reject(body_a, sa, body_b, sb, id_a, id_b) {
                rejected = false;
                // Canonicalize by shape-type rank.
                let (sa, sb) = if sa.shape_type() > sb.shape_type() {
                    a_id = id_b;
                    b_id = id_a;
                    (sb, sa)
                } else {
                    (sa, sb)
                };
                sensor = sa.is_sensor || sb.is_sensor;
                num = collide(&mut contacts, sa, sb);
            }
        }

        if rejected || num == 0 {
            self.push_contact_buffer(contacts);
            return;
        }
        contacts.truncate(num);

        let key = PairKey::new(ha, hb);

        if !self.cached_arbiters.contains_key(&key) {
            let arb = match self.arbiter_pool.pop() {
                Some(mut pooled) => {
                    pooled.reinit(a_id, b_id);
                    pooled
                }
                None => Arbiter::new(a_id, b_id),
            };
            self.cached_arbiters.insert(key, arb);
        }

        // Merge the fresh contacts, carrying accumulated impulses over by
        // feature hash.
        let old_contacts = {
            let Space {
                ref bodies,
                ref mut cached_arbiters,
                ..
            } = *self;
            let arb = cached_arbiters
                .get_mut(&key)
                .expect("arbiter inserted above");
            let sa = &bodies[a_id.body.0 as usize]
                .as_ref()
                .expect("collided body is live")
                .shapes[a_id.index];
            let sb = &bodies[b_id.body.0 as usize]
                .as_ref()
                .expect("collided body is live")
                .shapes[b_id.index];
            arb.update(sa, a_id, sb, b_id, contacts)
        };
        if old_contacts.capacity() > 0 {
            self.contact_pool.push(old_contacts);
        }

        // Lifecycle callbacks.
        let Space {
            ref mut bodies,
            ref mut cached_arbiters,
            ref mut arbiters,
            ref mut contact_pool,
            stamp,
            ..
        } = *self;
        let arb = cached_arbiters
            .get_mut(&key)
            .expect("arbiter inserted above");

        if arb.state == ArbiterState::FirstCollision {
            let mut ignore = false;
            if let Some(handler) = bodies[b_id.body.0 as usize]
                .as_mut()
                .and_then(|body| body.handler.as_mut())
            {
                ignore = !handler.enter(arb);
            }
            if let Some(handler) = bodies[a_id.body.0 as usize]
                .as_mut()
                .and_then(|body| body.handler.as_mut())
            {
                ignore = ignore || !handler.enter(arb);
            }
            if ignore {
                arb.ignore();
            }
        }

        // Either body's handler may reject this step's impulses.
        let mut solve = arb.state != ArbiterState::Ignore;
        if solve {
            if let Some(handler) = bodies[a_id.body.0 as usize]
                .as_mut()
                .and_then(|body| body.handler.as_mut())
            {
                solve = handler.pre_solve(arb);
            }
            if let Some(handler) = bodies[b_id.body.0 as usize]
                .as_mut()
                .and_then(|body| body.handler.as_mut())
            {
                solve = solve && handler.pre_solve(arb);
            }
        }

        if solve && !sensor && arb.state != ArbiterState::Ignore {
            arbiters.push(key);
        } else {
            // Rejected or sensor manifold: zero the contact impulses by
            // releasing the contact array.
            let old = core::mem::take(&mut arb.contacts);
            if old.capacity() > 0 {
                contact_pool.push(old);
            }
            if arb.state != ArbiterState::Ignore {
                arb.state = ArbiterState::Normal;
            }
        }

        arb.stamp = stamp;
    }

    /// Expire stale arbiters: fire exit callbacks on the transition to
    /// `Cached` and reclaim entries past the persistence window.
    fn expire_arbiters(&mut self) {
        let mut to_cache = core::mem::take(&mut self.key_scratch);
        to_cache.clear();
        let mut to_remove: Vec<PairKey> = Vec::new();

        for (key, arb) in self.cached_arbiters.iter() {
            let ticks = self.stamp - arb.stamp;
            let body_a = self.bodies[arb.body_a.0 as usize].as_ref();
            let body_b = self.bodies[arb.body_b.0 as usize].as_ref();
            let deleted = body_a.map_or(true, |b| b.deleted) || body_b.map_or(true, |b| b.deleted);
            let disabled =
                !(body_a.map_or(false, |b| b.enabled) || body_b.map_or(false, |b| b.enabled));

            if (ticks >= 1 && arb.state != ArbiterState::Cached) || deleted || disabled {
                to_cache.push(*key);
            }
            if ticks > self.config.collision_persistence || deleted {
                to_remove.push(*key);
            }
        }

        for key in &to_cache {
            let Space {
                ref mut cached_arbiters,
                ref mut bodies,
                ..
            } = *self;
            let Some(arb) = cached_arbiters.get_mut(key) else {
                continue;
            };
            arb.state = ArbiterState::Cached;
            for handle in [arb.body_a, arb.body_b] {
                if let Some(handler) = bodies
                    .get_mut(handle.0 as usize)
                    .and_then(Option::as_mut)
                    .and_then(|body| body.handler.as_mut())
                {
                    handler.exit(arb);
                }
            }
        }

        for key in &to_remove {
            if let Some(mut arb) = self.cached_arbiters.remove(key) {
                let contacts = core::mem::take(&mut arb.contacts);
                if contacts.capacity() > 0 {
                    self.contact_pool.push(contacts);
                }
                self.arbiter_pool.push(arb);
            }
        }

        self.key_scratch = to_cache;
    }

    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    fn pull_contact_buffer(&mut self) -> Vec<Contact> {
        let mut buffer = self
            .contact_pool
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(MAX_CONTACTS));
        buffer.clear();
        buffer.resize(MAX_CONTACTS, Contact::default());
        buffer
    }

    fn push_contact_buffer(&mut self, buffer: Vec<Contact>) {
        self.contact_pool.push(buffer);
    }
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Space {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Space")
            .field("bodies", &self.body_count())
            .field("constraints", &self.constraint_count())
            .field("cached_arbiters", &self.cached_arbiters.len())
            .field("stamp", &self.stamp)
            .finish()
    }
}

/// Split two distinct body slots into simultaneous exclusive borrows.
fn body_pair_mut(
    bodies: &mut [Option<Body>],
    a: BodyHandle,
    b: BodyHandle,
) -> (&mut Body, &mut Body) {
    let (ia, ib) = (a.0 as usize, b.0 as usize);
    assert_ne!(ia, ib, "internal error: body pair aliases one body");
    const GONE: &str = "body slot is empty (was a body removed while a constraint still references it?)";
    if ia < ib {
        let (left, right) = bodies.split_at_mut(ib);
        (left[ia].as_mut().expect(GONE), right[0].as_mut().expect(GONE))
    } else {
        let (left, right) = bodies.split_at_mut(ia);
        let (a_ref, b_ref) = (right[0].as_mut().expect(GONE), left[ib].as_mut().expect(GONE));
        (a_ref, b_ref)
    }
}

/// Broad-phase rejection: same body, filtered pair, disabled body, two
/// infinite masses, or disjoint boxes.
fn query_reject(
    body_a: &Body,
    sa: &Shape,
    body_b: &Body,
    sb: &Shape,
    id_a: ShapeId,
    id_b: ShapeId,
) -> bool {
    id_a.body == id_b.body
        || !CollisionFilter::can_collide(&sa.filter, &sb.filter)
        || !body_a.enabled
        || !body_b.enabled
        || (body_a.m == INFINITY && body_b.m == INFINITY)
        || !test_overlap(&sa.bb, &sb.bb)
}

// ============================================================================
// Tests
// ============================================================================
