//! Low level 2D predicates shared by traces and the contact world.
//!
//! Polygons are passed as vertex slices; the closing edge from the last vertex
//! back to the first is always implied.

use nalgebra::Vector2;

const EPS: f64 = 1e-12;

#[inline]
pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

#[inline]
fn orient(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    cross(&(b - a), &(c - a))
}

#[inline]
fn on_segment(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> bool {
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

/// True if the closed segments `p1-p2` and `q1-q2` share at least one point.
pub fn segments_intersect(
    p1: &Vector2<f64>,
    p2: &Vector2<f64>,
    q1: &Vector2<f64>,
    q2: &Vector2<f64>,
) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);

    if ((d1 > EPS && d2 < -EPS) || (d1 < -EPS && d2 > EPS))
        && ((d3 > EPS && d4 < -EPS) || (d3 < -EPS && d4 > EPS))
    {
        return true;
    }

    (d1.abs() <= EPS && on_segment(q1, q2, p1))
        || (d2.abs() <= EPS && on_segment(q1, q2, p2))
        || (d3.abs() <= EPS && on_segment(p1, p2, q1))
        || (d4.abs() <= EPS && on_segment(p1, p2, q2))
}

/// Even-odd ray casting; points exactly on the boundary may land either way.
pub fn point_in_polygon(p: &Vector2<f64>, polygon: &[Vector2<f64>]) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let a = &polygon[i];
        let b = &polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

pub fn closest_point_on_segment(
    p: &Vector2<f64>,
    a: &Vector2<f64>,
    b: &Vector2<f64>,
) -> Vector2<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= EPS {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point on the polygon boundary to `p`, with its distance.
pub fn closest_point_on_boundary(
    p: &Vector2<f64>,
    polygon: &[Vector2<f64>],
) -> (Vector2<f64>, f64) {
    let n = polygon.len();
    let mut best = polygon[0];
    let mut best_dist_sq = f64::MAX;
    for i in 0..n {
        let q = closest_point_on_segment(p, &polygon[i], &polygon[(i + 1) % n]);
        let d = (q - p).norm_squared();
        if d < best_dist_sq {
            best_dist_sq = d;
            best = q;
        }
    }
    (best, best_dist_sq.sqrt())
}

/// Parameter `t >= 0` at which the ray `origin + t * dir` meets segment `a-b`.
pub fn ray_segment_intersection(
    origin: &Vector2<f64>,
    dir: &Vector2<f64>,
    a: &Vector2<f64>,
    b: &Vector2<f64>,
) -> Option<f64> {
    let seg = b - a;
    let denom = cross(dir, &seg);
    if denom.abs() <= EPS {
        return None;
    }
    let diff = a - origin;
    let t = cross(&diff, &seg) / denom;
    let u = cross(&diff, dir) / denom;
    if t >= 0.0 && (-EPS..=1.0 + EPS).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Shoelace area, positive for counter-clockwise vertex order.
pub fn signed_area(polygon: &[Vector2<f64>]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        sum += cross(&polygon[i], &polygon[(i + 1) % n]);
    }
    0.5 * sum
}
