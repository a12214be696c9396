use std::f64::consts::PI;

use crate::geometry::{Point, Trace};

/// Generates ellipse points for testing, counter-clockwise from the major axis.
pub fn generate_ellipse_points(
    major: f64,
    minor: f64,
    num_points: usize,
    rotation: f64,
    translation: (f64, f64),
) -> Vec<Point> {
    let mut points = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let theta = 2.0 * PI * (i as f64) / (num_points as f64);
        let x = major * theta.cos();
        let y = minor * theta.sin();
        let (x_rot, y_rot) = rotate_point((x, y), rotation);
        points.push(Point::new(x_rot + translation.0, y_rot + translation.1));
    }
    points
}

/// Rotates a point around origin
pub fn rotate_point(point: (f64, f64), angle: f64) -> (f64, f64) {
    let (x, y) = point;
    let cos = angle.cos();
    let sin = angle.sin();
    (x * cos - y * sin, x * sin + y * cos)
}

pub fn ellipse_trace(
    major: f64,
    minor: f64,
    num_points: usize,
    rotation: f64,
    translation: (f64, f64),
) -> Trace {
    Trace::new(generate_ellipse_points(major, minor, num_points, rotation, translation))
        .expect("ellipse fixture is a valid trace")
}

pub fn circle_trace(radius: f64, num_points: usize, center: (f64, f64)) -> Trace {
    ellipse_trace(radius, radius, num_points, 0.0, center)
}
