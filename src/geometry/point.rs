use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A trace vertex. `z` only records the section plane and never takes part
/// in 2D geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_xy(v: Vector2<f64>, z: f64) -> Self {
        Self { x: v.x, y: v.y, z }
    }

    #[inline]
    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn translate(&mut self, v: &Vector2<f64>) {
        self.x += v.x;
        self.y += v.y;
    }

    /// Rotates the point CCW by `angle` radians about `center`.
    pub fn rotate_about(&mut self, angle: f64, center: &Vector2<f64>) {
        let (sin_a, cos_a) = angle.sin_cos();
        let x = self.x - center.x;
        let y = self.y - center.y;
        self.x = x * cos_a - y * sin_a + center.x;
        self.y = x * sin_a + y * cos_a + center.y;
    }

    pub fn scale_about(&mut self, factor: f64, center: &Vector2<f64>) {
        self.x = center.x + (self.x - center.x) * factor;
        self.y = center.y + (self.y - center.y) * factor;
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

impl From<(f64, f64, f64)> for Point {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Point::with_z(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_rotate_about_center() {
        let mut p = Point::new(2.0, 1.0);
        p.rotate_about(FRAC_PI_2, &Vector2::new(1.0, 1.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_keeps_z() {
        let mut p = Point::with_z(3.0, -1.0, 7.0);
        p.scale_about(2.0, &Vector2::new(1.0, 1.0));
        assert_relative_eq!(p.x, 5.0);
        assert_relative_eq!(p.y, -3.0);
        assert_eq!(p.z, 7.0);
    }
}
