use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::ReshapeMode;
use crate::error::{MorphError, MorphResult};

/// Best-fit ellipse of a trace. `angle` is the direction of the major axis
/// in degrees, normalised to `[0, 180)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: (f64, f64),
    pub semi_major: f64,
    pub semi_minor: f64,
    pub angle: f64,
}

impl Ellipse {
    pub fn new(center: Vector2<f64>, semi_major: f64, semi_minor: f64, angle_deg: f64) -> Self {
        let (semi_major, semi_minor, angle_deg) = if semi_minor > semi_major {
            (semi_minor, semi_major, angle_deg + 90.0)
        } else {
            (semi_major, semi_minor, angle_deg)
        };
        Self {
            center: (center.x, center.y),
            semi_major,
            semi_minor,
            angle: normalize_degrees(angle_deg),
        }
    }

    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(self.center.0, self.center.1)
    }

    pub fn angle_radians(&self) -> f64 {
        self.angle.to_radians()
    }

    pub fn major_axis_direction(&self) -> Vector2<f64> {
        let a = self.angle_radians();
        Vector2::new(a.cos(), a.sin())
    }

    pub fn mean_radius(&self) -> f64 {
        0.5 * (self.semi_major + self.semi_minor)
    }

    pub fn area(&self) -> f64 {
        PI * self.semi_major * self.semi_minor
    }

    /// The canonical shape a nerve is reshaped into: the ellipse itself, or a
    /// circle whose radius is the mean of the semi-axes.
    pub fn reshaped(&self, mode: ReshapeMode) -> Ellipse {
        match mode {
            ReshapeMode::Ellipse => *self,
            ReshapeMode::Circle => {
                let r = self.mean_radius();
                Ellipse {
                    semi_major: r,
                    semi_minor: r,
                    ..*self
                }
            }
        }
    }

    /// Grows (or shrinks, for negative `margin`) both semi-axes.
    pub fn with_margin(&self, margin: f64) -> MorphResult<Ellipse> {
        let semi_major = self.semi_major + margin;
        let semi_minor = self.semi_minor + margin;
        if semi_minor <= 0.0 {
            return Err(MorphError::Geometry(format!(
                "margin {margin} collapses ellipse with semi-minor axis {}",
                self.semi_minor
            )));
        }
        Ok(Ellipse {
            semi_major,
            semi_minor,
            ..*self
        })
    }

    pub fn scaled(&self, factor: f64) -> Ellipse {
        Ellipse {
            semi_major: self.semi_major * factor,
            semi_minor: self.semi_minor * factor,
            ..*self
        }
    }

    /// `count` points spaced uniformly in parameter space, counter-clockwise,
    /// starting on the major axis.
    pub fn sample(&self, count: usize) -> Vec<Vector2<f64>> {
        let (sin_r, cos_r) = self.angle_radians().sin_cos();
        let center = self.center();
        (0..count)
            .map(|i| {
                let t = 2.0 * PI * (i as f64) / (count as f64);
                let x = self.semi_major * t.cos();
                let y = self.semi_minor * t.sin();
                center + Vector2::new(x * cos_r - y * sin_r, x * sin_r + y * cos_r)
            })
            .collect()
    }
}

fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(180.0);
    if 180.0 - a < 1e-9 {
        0.0
    } else {
        a
    }
}

/// Direct least-squares ellipse fit (Fitzgibbon, in the numerically stable
/// Halir & Flusser formulation). Points are centred and scaled before the fit
/// so the scatter matrices stay well conditioned for micrometre coordinates.
pub fn fit_ellipse(points: &[Vector2<f64>]) -> MorphResult<Ellipse> {
    let n = points.len();
    if n < 5 {
        return Err(MorphError::Geometry(format!(
            "ellipse fit needs at least 5 points, got {n}"
        )));
    }

    let mean = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n as f64;
    let spread = (points.iter().map(|p| (p - mean).norm_squared()).sum::<f64>() / n as f64).sqrt();
    if !spread.is_finite() || spread <= f64::EPSILON {
        return Err(MorphError::Geometry(
            "ellipse fit over coincident points".to_string(),
        ));
    }

    let mut s1 = Matrix3::<f64>::zeros();
    let mut s2 = Matrix3::<f64>::zeros();
    let mut s3 = Matrix3::<f64>::zeros();
    for p in points {
        let q = (p - mean) / spread;
        let d1 = Vector3::new(q.x * q.x, q.x * q.y, q.y * q.y);
        let d2 = Vector3::new(q.x, q.y, 1.0);
        s1 += d1 * d1.transpose();
        s2 += d1 * d2.transpose();
        s3 += d2 * d2.transpose();
    }

    let s3_inv = s3
        .try_inverse()
        .ok_or_else(|| MorphError::Geometry("ellipse fit over collinear points".to_string()))?;
    let t = (s3_inv * s2.transpose()) * -1.0;
    let m = s1 + s2 * t;
    // C1^-1 * M for the constraint 4ac - b^2 = 1
    let reduced = Matrix3::from_rows(&[m.row(2) * 0.5, m.row(1) * -1.0, m.row(0) * 0.5]);

    let mut best: Option<(f64, Vector3<f64>)> = None;
    for lambda in reduced.complex_eigenvalues().iter() {
        if lambda.im.abs() > 1e-9 * (1.0 + lambda.re.abs()) {
            continue;
        }
        let Some(v) = null_vector(&(reduced - Matrix3::identity() * lambda.re)) else {
            continue;
        };
        let condition = 4.0 * v[0] * v[2] - v[1] * v[1];
        if condition > 0.0 && best.map_or(true, |(c, _)| condition > c) {
            best = Some((condition, v));
        }
    }
    let (_, a1) = best.ok_or_else(|| {
        MorphError::Geometry("no elliptical solution for the point set".to_string())
    })?;
    let a2 = t * a1;

    let (a, b, c) = (a1[0], a1[1], a1[2]);
    let (d, e, f) = (a2[0], a2[1], a2[2]);

    let den = b * b - 4.0 * a * c;
    if den.abs() <= f64::EPSILON {
        return Err(MorphError::Geometry("degenerate conic in ellipse fit".to_string()));
    }
    let x0 = (2.0 * c * d - b * e) / den;
    let y0 = (2.0 * a * e - b * d) / den;
    let f0 = a * x0 * x0 + b * x0 * y0 + c * y0 * y0 + d * x0 + e * y0 + f;

    let eigen = Matrix2::new(a, b / 2.0, b / 2.0, c).symmetric_eigen();
    let mut axes = [(0.0, Vector2::zeros()); 2];
    for (i, axis) in axes.iter_mut().enumerate() {
        let ratio = -f0 / eigen.eigenvalues[i];
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(MorphError::Geometry("ellipse fit produced an imaginary axis".to_string()));
        }
        *axis = (ratio.sqrt(), eigen.eigenvectors.column(i).into_owned());
    }
    axes.sort_by(|l, r| r.0.total_cmp(&l.0));
    let (major, direction) = axes[0];
    let minor = axes[1].0;

    let center = mean + Vector2::new(x0, y0) * spread;
    let angle = direction.y.atan2(direction.x).to_degrees();
    Ok(Ellipse::new(center, major * spread, minor * spread, angle))
}

/// Null vector of a (numerically) rank-2 3x3 matrix: the largest cross
/// product of two of its rows.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let rows: [Vector3<f64>; 3] = [
        m.row(0).transpose(),
        m.row(1).transpose(),
        m.row(2).transpose(),
    ];
    [
        rows[0].cross(&rows[1]),
        rows[0].cross(&rows[2]),
        rows[1].cross(&rows[2]),
    ]
    .into_iter()
    .max_by(|l, r| l.norm_squared().total_cmp(&r.norm_squared()))
    .filter(|v| v.norm_squared() > 1e-30)
    .map(|v| v.normalize())
}
