use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: (f64, f64),
    pub radius: f64,
}

impl Circle {
    fn from_center(center: Vector2<f64>, radius: f64) -> Self {
        Self {
            center: (center.x, center.y),
            radius,
        }
    }

    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(self.center.0, self.center.1)
    }

    fn contains(&self, p: &Vector2<f64>) -> bool {
        (p - self.center()).norm() <= self.radius * (1.0 + 1e-12) + 1e-9
    }

    fn diameter(a: &Vector2<f64>, b: &Vector2<f64>) -> Self {
        let center = (a + b) * 0.5;
        Self::from_center(center, (a - center).norm())
    }

    fn circumscribed(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> Self {
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < 1e-12 {
            // collinear: the widest pair spans the circle
            let candidates = [Self::diameter(a, b), Self::diameter(a, c), Self::diameter(b, c)];
            return candidates
                .into_iter()
                .max_by(|l, r| l.radius.total_cmp(&r.radius))
                .unwrap_or_else(|| Self::diameter(a, b));
        }
        let a2 = a.norm_squared();
        let b2 = b.norm_squared();
        let c2 = c.norm_squared();
        let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        let center = Vector2::new(ux, uy);
        Self::from_center(center, (a - center).norm())
    }
}

/// Smallest circle enclosing every point (incremental Welzl construction).
pub fn minimum_bounding_circle(points: &[Vector2<f64>]) -> Circle {
    let Some(first) = points.first() else {
        return Circle::from_center(Vector2::zeros(), 0.0);
    };
    let mut circle = Circle::from_center(*first, 0.0);
    for i in 1..points.len() {
        if circle.contains(&points[i]) {
            continue;
        }
        circle = Circle::from_center(points[i], 0.0);
        for j in 0..i {
            if circle.contains(&points[j]) {
                continue;
            }
            circle = Circle::diameter(&points[i], &points[j]);
            for k in 0..j {
                if !circle.contains(&points[k]) {
                    circle = Circle::circumscribed(&points[i], &points[j], &points[k]);
                }
            }
        }
    }
    circle
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_bounding_circle() {
        let pts = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 2.0),
            Vector2::new(0.0, 2.0),
            Vector2::new(1.0, 1.5),
        ];
        let c = minimum_bounding_circle(&pts);
        assert_relative_eq!(c.center.0, 1.0, epsilon = 1e-9);
        assert_relative_eq!(c.center.1, 1.0, epsilon = 1e-9);
        assert_relative_eq!(c.radius, 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_obtuse_triangle_uses_longest_side() {
        let pts = vec![Vector2::new(-5.0, 0.0), Vector2::new(5.0, 0.0), Vector2::new(0.0, 1.0)];
        let c = minimum_bounding_circle(&pts);
        assert_relative_eq!(c.radius, 5.0, epsilon = 1e-9);
        assert_relative_eq!(c.center.1, 0.0, epsilon = 1e-9);
    }
}
