use nalgebra::{Rotation2, Vector2};

use crate::geometry::predicates::{closest_point_on_boundary, cross, point_in_polygon, signed_area};
use crate::geometry::Trace;

const EPS: f64 = 1e-12;

/// Position of a body's reference point and its accumulated rotation (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector2<f64>,
    pub angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WallsHandle(pub(crate) usize);

/// Minimal 2D rigid-body world driven by the deformation loop. There is no
/// gravity; bodies only move when walls or other bodies push them.
pub trait RigidBodyWorld {
    /// Adds a dynamic body with the given outline. Its pose reports where
    /// `reference` (a world point at creation) has been carried.
    fn add_body(&mut self, outline: &[Vector2<f64>], reference: Vector2<f64>) -> BodyHandle;

    /// Adds the closed boundary `frame` as static, non-penetrable walls that
    /// keep bodies on the inside.
    fn add_static_walls(&mut self, frame: &Trace) -> WallsHandle;

    fn remove_static_walls(&mut self, walls: WallsHandle);

    fn step(&mut self, dt: f64);

    fn pose(&self, body: BodyHandle) -> Option<Pose>;
}

#[derive(Debug, Clone)]
struct Body {
    /// Outline relative to the centre of mass, unrotated.
    local: Vec<Vector2<f64>>,
    /// Reference point relative to the centre of mass, unrotated.
    reference: Vector2<f64>,
    center: Vector2<f64>,
    angle: f64,
    velocity: Vector2<f64>,
    angular_velocity: f64,
    inv_mass: f64,
    inv_inertia: f64,
    radius: f64,
}

impl Body {
    fn new(outline: &[Vector2<f64>], reference: Vector2<f64>) -> Self {
        let (center, mass, inertia) = mass_properties(outline);
        let local: Vec<Vector2<f64>> = outline.iter().map(|p| p - center).collect();
        let radius = local.iter().map(|v| v.norm()).fold(0.0, f64::max);
        let inverse = |x: f64| if x > EPS { 1.0 / x } else { 0.0 };
        Self {
            local,
            reference: reference - center,
            center,
            angle: 0.0,
            velocity: Vector2::zeros(),
            angular_velocity: 0.0,
            inv_mass: inverse(mass),
            inv_inertia: inverse(inertia),
            radius,
        }
    }

    fn vertex(&self, rotation: &Rotation2<f64>, k: usize) -> Vector2<f64> {
        self.center + rotation * self.local[k]
    }

    fn world_vertices(&self) -> Vec<Vector2<f64>> {
        let rotation = Rotation2::new(self.angle);
        (0..self.local.len()).map(|k| self.vertex(&rotation, k)).collect()
    }

    fn pose(&self) -> Pose {
        Pose {
            position: self.center + Rotation2::new(self.angle) * self.reference,
            angle: self.angle,
        }
    }

    fn is_static(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia == 0.0
    }

    /// Generalised inverse mass for a push along `normal` at lever `arm`.
    fn inverse_mass_along(&self, arm: &Vector2<f64>, normal: &Vector2<f64>) -> f64 {
        let rn = cross(arm, normal);
        self.inv_mass + self.inv_inertia * rn * rn
    }

    fn apply(&mut self, arm: &Vector2<f64>, normal: &Vector2<f64>, lambda: f64) {
        self.center += normal * (lambda * self.inv_mass);
        self.angle += self.inv_inertia * cross(arm, normal) * lambda;
    }
}

/// Centre of mass, area and polar moment of a uniform polygon.
fn mass_properties(outline: &[Vector2<f64>]) -> (Vector2<f64>, f64, f64) {
    let n = outline.len();
    let mean = outline.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n.max(1) as f64;
    let area = signed_area(outline);
    if area.abs() <= EPS {
        return (mean, 0.0, 0.0);
    }

    let mut c = Vector2::zeros();
    for i in 0..n {
        let (p, q) = (outline[i] - mean, outline[(i + 1) % n] - mean);
        c += (p + q) * cross(&p, &q);
    }
    let center = mean + c / (6.0 * area);

    let mut inertia = 0.0;
    for i in 0..n {
        let (p, q) = (outline[i] - center, outline[(i + 1) % n] - center);
        inertia += cross(&p, &q) * (p.dot(&p) + p.dot(&q) + q.dot(&q));
    }
    (center, area.abs(), (inertia / 12.0).abs())
}

#[derive(Debug, Clone)]
struct Walls {
    ring: Vec<Vector2<f64>>,
    center: Vector2<f64>,
}

/// Position-based contact solver: bodies are projected out of each other
/// and back inside the active wall loops, and velocities are derived from
/// the resulting position change.
#[derive(Debug, Clone)]
pub struct ContactWorld {
    bodies: Vec<Body>,
    walls: Vec<Option<Walls>>,
    /// Solver passes per step.
    pub iterations: usize,
    /// Clearance kept between body vertices and a wall.
    pub wall_radius: f64,
    /// Fraction of the derived velocity carried into the next step.
    pub velocity_retention: f64,
}

impl Default for ContactWorld {
    fn default() -> Self {
        Self {
            bodies: Vec::new(),
            walls: Vec::new(),
            iterations: 4,
            wall_radius: 1.0,
            velocity_retention: 0.25,
        }
    }
}

impl ContactWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// World-space outline of a body.
    pub fn outline(&self, body: BodyHandle) -> Option<Vec<Vector2<f64>>> {
        self.bodies.get(body.0).map(Body::world_vertices)
    }
}

impl RigidBodyWorld for ContactWorld {
    fn add_body(&mut self, outline: &[Vector2<f64>], reference: Vector2<f64>) -> BodyHandle {
        self.bodies.push(Body::new(outline, reference));
        BodyHandle(self.bodies.len() - 1)
    }

    fn add_static_walls(&mut self, frame: &Trace) -> WallsHandle {
        let ring = frame.xy().to_vec();
        let center = ring.iter().fold(Vector2::zeros(), |acc, p| acc + p) / ring.len() as f64;
        self.walls.push(Some(Walls { ring, center }));
        WallsHandle(self.walls.len() - 1)
    }

    fn remove_static_walls(&mut self, walls: WallsHandle) {
        if let Some(slot) = self.walls.get_mut(walls.0) {
            *slot = None;
        }
    }

    fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let previous: Vec<(Vector2<f64>, f64)> =
            self.bodies.iter().map(|b| (b.center, b.angle)).collect();
        for body in &mut self.bodies {
            body.center += body.velocity * dt;
            body.angle += body.angular_velocity * dt;
        }

        for _ in 0..self.iterations {
            for wall in self.walls.iter().flatten() {
                for body in &mut self.bodies {
                    solve_wall(body, wall, self.wall_radius);
                }
            }
            for j in 1..self.bodies.len() {
                let (head, tail) = self.bodies.split_at_mut(j);
                for a in head.iter_mut() {
                    solve_pair(a, &mut tail[0]);
                }
            }
        }

        let retention = self.velocity_retention;
        for (body, (center, angle)) in self.bodies.iter_mut().zip(previous) {
            body.velocity = (body.center - center) / dt * retention;
            body.angular_velocity = (body.angle - angle) / dt * retention;
        }
    }

    fn pose(&self, body: BodyHandle) -> Option<Pose> {
        self.bodies.get(body.0).map(Body::pose)
    }
}

/// Pushes every vertex of `body` back inside `wall`, `radius` clear of it.
fn solve_wall(body: &mut Body, wall: &Walls, radius: f64) {
    if body.is_static() {
        return;
    }
    let (_, clearance) = closest_point_on_boundary(&body.center, &wall.ring);
    if point_in_polygon(&body.center, &wall.ring) && clearance > body.radius + radius {
        return;
    }

    for k in 0..body.local.len() {
        let p = body.vertex(&Rotation2::new(body.angle), k);
        let inside = point_in_polygon(&p, &wall.ring);
        let (q, d) = closest_point_on_boundary(&p, &wall.ring);
        let (normal, depth) = if d <= EPS {
            match (wall.center - p).try_normalize(EPS) {
                Some(n) => (n, radius),
                None => continue,
            }
        } else if !inside {
            ((q - p) / d, d + radius)
        } else if d < radius {
            ((p - q) / d, radius - d)
        } else {
            continue;
        };

        let arm = p - body.center;
        let w = body.inverse_mass_along(&arm, &normal);
        if w > EPS {
            body.apply(&arm, &normal, depth / w);
        }
    }
}

fn solve_pair(a: &mut Body, b: &mut Body) {
    if (a.center - b.center).norm() > a.radius + b.radius {
        return;
    }
    push_out(a, b);
    push_out(b, a);
}

/// Moves vertices of `a` that lie inside `b` onto the boundary of `b`,
/// sharing the correction between the two bodies.
fn push_out(a: &mut Body, b: &mut Body) {
    let mut polygon = b.world_vertices();
    for k in 0..a.local.len() {
        let p = a.vertex(&Rotation2::new(a.angle), k);
        if !point_in_polygon(&p, &polygon) {
            continue;
        }
        let (q, d) = closest_point_on_boundary(&p, &polygon);
        if d <= EPS {
            continue;
        }
        let normal = (q - p) / d;
        let arm_a = p - a.center;
        let arm_b = q - b.center;
        let w = a.inverse_mass_along(&arm_a, &normal) + b.inverse_mass_along(&arm_b, &normal);
        if w <= EPS {
            continue;
        }
        let lambda = d / w;
        a.apply(&arm_a, &normal, lambda);
        b.apply(&arm_b, &-normal, lambda);
        polygon = b.world_vertices();
    }
}
