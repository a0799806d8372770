//! Integration tests for impulse2d
//!
//! End-to-end scenarios exercised through the public API only: resting
//! contact, stacking, friction, restitution, sensors, and structural
//! invariants under body churn. All scenarios run at 60 Hz with 20 solver
//! iterations.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use impulse2d::{
    Arbiter, Body, BodyHandle, CollisionHandler, Float, PivotJoint, Shape, Space, Vec2,
};

const DT: Float = 1.0 / 60.0;

// ============================================================================
// Helpers
// ============================================================================

/// Standard space: gravity (0, -900), slop 0.5, 20 iterations.
fn make_space() -> Space {
    let mut space = Space::new();
    space.config.gravity = Vec2::new(0.0, -900.0);
    space.config.iterations = 20;
    space.config.collision_slop = 0.5;
    space
}

fn run(space: &mut Space, seconds: Float) {
    let steps = (seconds / DT) as usize;
    for _ in 0..steps {
        space.step(DT);
    }
}

fn floor_segment(a: Vec2, b: Vec2, friction: Float, elasticity: Float) -> Body {
    let mut shape = Shape::new_segment(a, b, 0.0);
    shape.u = friction;
    shape.e = elasticity;
    let mut body = Body::new_static();
    body.add_shape(shape);
    body
}

fn ball(pos: Vec2, radius: Float, mass: Float, elasticity: Float) -> Body {
    let mut shape = Shape::new_circle(Vec2::ZERO, radius);
    shape.e = elasticity;
    let mut body = Body::new(mass, shape.moment(mass));
    body.add_shape(shape);
    body.set_position(pos);
    body
}

fn cube(pos: Vec2, size: Float, friction: Float) -> Body {
    let mut shape = Shape::new_box(Vec2::ZERO, size, size);
    shape.e = 0.0;
    shape.u = friction;
    let mut body = Body::new(1.0, shape.moment(1.0));
    body.add_shape(shape);
    body.set_position(pos);
    body
}

// ============================================================================
// Scenario 1 — Single ball resting on the floor
// ============================================================================

#[test]
fn test_ball_comes_to_rest_on_floor() {
    let mut space = make_space();
    space.add_body(floor_segment(
        Vec2::new(0.0, 100.0),
        Vec2::new(600.0, 100.0),
        0.8,
        0.0,
    ));
    let ball_handle = space.add_body(ball(Vec2::new(300.0, 200.0), 20.0, 1.0, 0.0));

    run(&mut space, 2.0);

    let body = space.body(ball_handle).unwrap();
    // Resting height: floor + radius, within the slop band.
    assert!(
        (body.position().y - 120.0).abs() < 1.0,
        "ball should rest at y ~ 120, got {}",
        body.position().y
    );
    assert!(
        body.velocity().y.abs() < 1.0,
        "ball should be at rest, v.y = {}",
        body.velocity().y
    );
    assert_relative_eq!(body.position().x, 300.0, epsilon = 0.5);
}

// ============================================================================
// Scenario 2 — Stack of three boxes
// ============================================================================

#[test]
fn test_box_stack_is_stable() {
    let mut space = make_space();
    space.add_body(floor_segment(
        Vec2::new(0.0, 125.0),
        Vec2::new(600.0, 125.0),
        0.8,
        0.0,
    ));

    let mut handles = Vec::new();
    for y in [150.0, 201.0, 252.0] {
        handles.push(space.add_body(cube(Vec2::new(300.0, y), 50.0, 0.8)));
    }

    run(&mut space, 3.0);

    let mut ys = Vec::new();
    for &handle in &handles {
        let body = space.body(handle).unwrap();
        assert!(
            (body.position().x - 300.0).abs() < 0.5,
            "box drifted horizontally to {}",
            body.position().x
        );
        ys.push(body.position().y);
    }

    for pair in ys.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            (gap - 50.0).abs() < 1.5,
            "vertical gap between neighbors should stay ~50, got {gap}"
        );
    }
    space.validate();
}

// ============================================================================
// Scenario 3 — Friction ramp
// ============================================================================

fn ramp_space(box_friction: Float) -> (Space, BodyHandle) {
    let angle = (30.0 as Float).to_radians();
    let dir = Vec2::new(angle.cos(), angle.sin());
    let normal = Vec2::new(-angle.sin(), angle.cos());

    let mut space = make_space();
    space.add_body(floor_segment(dir * -3000.0, dir * 3000.0, 1.0, 0.0));

    let mut body = cube(Vec2::ZERO, 50.0, box_friction);
    body.set_angle(angle);
    body.set_position(normal * 25.05);
    let handle = space.add_body(body);
    (space, handle)
}

#[test]
fn test_high_friction_box_holds_on_ramp() {
    let (mut space, handle) = ramp_space(1.0);

    run(&mut space, 5.0);

    let body = space.body(handle).unwrap();
    assert!(
        body.velocity().length() < 0.5,
        "box with u=1.0 must hold on a 30 degree ramp, |v| = {}",
        body.velocity().length()
    );
}

#[test]
fn test_low_friction_box_slides_down_ramp() {
    let (mut space, handle) = ramp_space(0.1);

    // Let the contact settle, then sample |v.x| over half-second windows.
    run(&mut space, 1.0);
    let mut speeds = Vec::new();
    for _ in 0..4 {
        run(&mut space, 0.5);
        speeds.push(space.body(handle).unwrap().velocity().x.abs());
    }

    for pair in speeds.windows(2) {
        assert!(
            pair[1] >= pair[0] - 0.05,
            "sliding speed must not decrease: {:?}",
            speeds
        );
    }
    assert!(
        speeds[speeds.len() - 1] > speeds[0] + 0.5,
        "box with u=0.1 must accelerate down the ramp: {:?}",
        speeds
    );
}

// ============================================================================
// Scenario 4 — Elastic bounce
// ============================================================================

#[test]
fn test_elastic_ball_recovers_most_of_its_height() {
    let mut space = make_space();
    space.add_body(floor_segment(
        Vec2::new(-500.0, 0.0),
        Vec2::new(500.0, 0.0),
        0.0,
        1.0,
    ));

    let radius = 20.0;
    let drop_height = 200.0;
    let rest_y = radius; // floor surface + radius
    let handle = space.add_body(ball(
        Vec2::new(0.0, rest_y + drop_height),
        radius,
        1.0,
        1.0,
    ));

    // Track the first impact and the peak that follows it.
    let mut bounced = false;
    let mut peak_after_bounce: Float = 0.0;
    for _ in 0..(4.0 / DT) as usize {
        space.step(DT);
        let body = space.body(handle).unwrap();
        if !bounced && body.velocity().y > 0.0 {
            bounced = true;
        }
        if bounced && body.velocity().y > 0.0 {
            peak_after_bounce = peak_after_bounce.max(body.position().y);
        }
        if bounced && body.velocity().y < 0.0 {
            break;
        }
    }

    assert!(bounced, "ball must bounce off an elastic floor");
    let recovered = peak_after_bounce - rest_y;
    assert!(
        recovered >= 0.9 * drop_height,
        "elastic bounce should recover at least 90% of the height, got {recovered}"
    );
}

// ============================================================================
// Scenario 5 — Sensor pass-through
// ============================================================================

#[derive(Default)]
struct Counts {
    enter: usize,
    pre_solve: usize,
    post_solve: usize,
    exit: usize,
}

struct Recorder {
    counts: Rc<RefCell<Counts>>,
}

impl CollisionHandler for Recorder {
    fn enter(&mut self, _arbiter: &mut Arbiter) -> bool {
        self.counts.borrow_mut().enter += 1;
        true
    }

    fn pre_solve(&mut self, _arbiter: &mut Arbiter) -> bool {
        self.counts.borrow_mut().pre_solve += 1;
        true
    }

    fn post_solve(&mut self, _arbiter: &Arbiter) {
        self.counts.borrow_mut().post_solve += 1;
    }

    fn exit(&mut self, _arbiter: &Arbiter) {
        self.counts.borrow_mut().exit += 1;
    }
}

#[test]
fn test_sensor_fires_callbacks_without_impulses() {
    let mut space = Space::new(); // no gravity

    let mut sensor_shape = Shape::new_circle(Vec2::ZERO, 20.0);
    sensor_shape.is_sensor = true;
    let mut sensor_body = Body::new_static();
    sensor_body.add_shape(sensor_shape);
    space.add_body(sensor_body);

    let counts = Rc::new(RefCell::new(Counts::default()));
    let mut mover = ball(Vec2::new(-60.0, 0.0), 10.0, 1.0, 0.5);
    mover.set_velocity(Vec2::new(120.0, 0.0));
    mover.handler = Some(Box::new(Recorder {
        counts: Rc::clone(&counts),
    }));
    let handle = space.add_body(mover);

    run(&mut space, 1.5);

    let counts = counts.borrow();
    assert_eq!(counts.enter, 1, "enter fires once on first overlap");
    assert!(counts.pre_solve > 1, "pre_solve fires every overlapping step");
    assert_eq!(counts.exit, 1, "exit fires once on separation");
    assert_eq!(
        counts.post_solve, 0,
        "sensor manifolds never reach the solver"
    );

    // No impulse was applied: velocity is untouched.
    let body = space.body(handle).unwrap();
    assert_relative_eq!(body.velocity().x, 120.0, epsilon = 1e-9);
    assert_relative_eq!(body.velocity().y, 0.0, epsilon = 1e-9);
}

// ============================================================================
// Scenario 6 — Add/remove under traffic
// ============================================================================

#[test]
fn test_remove_bodies_under_traffic_keeps_invariants() {
    let mut space = make_space();
    space.add_body(floor_segment(
        Vec2::new(-400.0, 0.0),
        Vec2::new(400.0, 0.0),
        0.5,
        0.2,
    ));

    let mut handles = Vec::new();
    for i in 0..50 {
        let x = ((i % 10) as Float) * 20.0 - 90.0;
        let y = 20.0 + ((i / 10) as Float) * 18.0;
        handles.push(space.add_body(ball(Vec2::new(x, y), 8.0, 1.0, 0.2)));
    }

    // Remove one circle per step, most recently added first, while
    // everything falls and collides.
    for step in 0..60 {
        space.step(DT);
        if let Some(handle) = handles.pop() {
            space.remove_body(handle);
        }
        if step % 10 == 0 {
            space.validate();
        }
    }

    space.validate();
    // 50 circles added, 60 removal requests: every circle is gone.
    assert_eq!(space.body_count(), 1, "only the floor remains");
    assert_eq!(
        space.cached_arbiter_count(),
        0,
        "no arbiter may outlive its bodies"
    );
    assert!(space.pooled_arbiters() < 1024, "arbiter pool is bounded");
    assert!(
        space.pooled_contact_arrays() < 1024,
        "contact pool is bounded"
    );
}

// ============================================================================
// Joints under gravity
// ============================================================================

#[test]
fn test_pivot_joint_pendulum_keeps_anchor_distance() {
    let mut space = make_space();

    let anchor_body = space.add_body({
        let mut body = Body::new_static();
        body.add_shape(Shape::new_circle(Vec2::ZERO, 1.0));
        body.set_position(Vec2::new(0.0, 200.0));
        body
    });
    let bob = space.add_body(ball(Vec2::new(50.0, 200.0), 5.0, 1.0, 0.0));

    let joint = PivotJoint::new_with_anchors(
        anchor_body,
        bob,
        Vec2::ZERO,
        Vec2::new(-50.0, 0.0),
    );
    space.add_constraint(Box::new(joint)).unwrap();

    let mut min_y: Float = 200.0;
    for _ in 0..(2.0 / DT) as usize {
        space.step(DT);
        min_y = min_y.min(space.body(bob).unwrap().position().y);
    }

    // The bob's local anchor (-50, 0) must stay pinned to (0, 200).
    let body = space.body(bob).unwrap();
    let world_anchor = body.position() + body.rotation().rotate(Vec2::new(-50.0, 0.0));
    assert!(
        (world_anchor - Vec2::new(0.0, 200.0)).length() < 1.0,
        "pivot anchor drifted to {world_anchor:?}"
    );
    // And the pendulum actually swung through the bottom of its arc.
    assert!(min_y < 170.0, "pendulum never swung down, min y = {min_y}");
}

// ============================================================================
// Determinism across identical runs
// ============================================================================

#[test]
fn test_two_identical_runs_are_bit_exact() {
    fn simulate() -> Vec<u64> {
        let mut space = make_space();
        space.add_body(floor_segment(
            Vec2::new(-300.0, 0.0),
            Vec2::new(300.0, 0.0),
            0.7,
            0.3,
        ));
        for i in 0..10 {
            space.add_body(ball(
                Vec2::new((i as Float) * 15.0 - 70.0, 30.0 + (i as Float) * 22.0),
                9.0,
                1.0,
                0.3,
            ));
        }

        run(&mut space, 2.0);

        let mut bits = Vec::new();
        space.each_body(|_, body| {
            bits.push(body.position().x.to_bits());
            bits.push(body.position().y.to_bits());
            bits.push(body.angle().to_bits());
            bits.push(body.velocity().x.to_bits());
            bits.push(body.velocity().y.to_bits());
            bits.push(body.angular_velocity().to_bits());
        });
        bits
    }

    let first = simulate();
    let second = simulate();
    assert_eq!(first, second, "identical runs must be bit-exact");
}
