use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

use super::circle::{minimum_bounding_circle, Circle};
use super::ellipse::{fit_ellipse, Ellipse};
use super::offset::offset_polygon;
use super::point::Point;
use super::predicates::{
    closest_point_on_boundary, point_in_polygon, ray_segment_intersection, segments_intersect,
    signed_area,
};
use crate::config::ReshapeMode;
use crate::error::{MorphError, MorphResult};

/// Reference point for `scale` and `rotate`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransformCenter {
    #[default]
    Centroid,
    /// Centre of the axis-aligned bounding box.
    BoundsCenter,
    At(Vector2<f64>),
}

/// How far `offset` moves the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OffsetAmount {
    /// Signed distance along the normal.
    Distance(f64),
    /// Multiplicative fit factor; the distance is `mean_radius * (factor - 1)`.
    Fit(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownSampleMode {
    /// Keep only every `step`-th point.
    Keep,
    /// Remove every `step`-th point.
    Remove,
}

/// Derived geometry, filled lazily and dropped wholesale whenever the points
/// change. Only `Trace::mutate` touches the points after construction, so a
/// stale cache cannot survive a mutation.
#[derive(Debug, Clone, Default)]
struct TraceCache {
    xy: OnceCell<Vec<Vector2<f64>>>,
    signed_area: OnceCell<f64>,
    centroid: OnceCell<Vector2<f64>>,
    ellipse: OnceCell<Ellipse>,
    bounding_circle: OnceCell<Circle>,
}

/// A simple closed polygon in one z-plane; the last point implicitly
/// connects back to the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Trace {
    points: Vec<Point>,
    cache: TraceCache,
}

impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl TryFrom<Vec<Point>> for Trace {
    type Error = MorphError;

    fn try_from(points: Vec<Point>) -> MorphResult<Self> {
        Trace::new(points)
    }
}

impl From<Trace> for Vec<Point> {
    fn from(trace: Trace) -> Self {
        trace.points
    }
}

impl Trace {
    pub fn new(points: Vec<Point>) -> MorphResult<Self> {
        check_points(&points)?;
        Ok(Self {
            points,
            cache: TraceCache::default(),
        })
    }

    pub fn from_xy<I>(coords: I) -> MorphResult<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self::new(coords.into_iter().map(Point::from).collect())
    }

    /// Samples `count` points along `ellipse` in the plane `z`.
    pub fn from_ellipse(ellipse: &Ellipse, count: usize, z: f64) -> MorphResult<Self> {
        if count < 3 {
            return Err(MorphError::InvalidArgument(format!(
                "an ellipse trace needs at least 3 points, got {count}"
            )));
        }
        Self::new(
            ellipse
                .sample(count)
                .into_iter()
                .map(|v| Point::from_xy(v, z))
                .collect(),
        )
    }

    fn mutate<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Vec<Point>),
    {
        f(&mut self.points);
        self.cache = TraceCache::default();
    }

    fn replace_xy(&mut self, ring: Vec<Vector2<f64>>) -> MorphResult<()> {
        let z = self.z();
        let points: Vec<Point> = ring.into_iter().map(|v| Point::from_xy(v, z)).collect();
        check_points(&points)?;
        self.mutate(|pts| *pts = points);
        Ok(())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn z(&self) -> f64 {
        self.points[0].z
    }

    /// The 2D vertices, as used by every geometric query.
    pub fn xy(&self) -> &[Vector2<f64>] {
        self.cache
            .xy
            .get_or_init(|| self.points.iter().map(Point::xy).collect())
    }

    // ---- mutating ----

    pub fn shift(&mut self, vector: &Vector2<f64>) {
        self.mutate(|pts| pts.iter_mut().for_each(|p| p.translate(vector)));
    }

    /// Shift from loose components: `[dx, dy]` or `[dx, dy, 0]`.
    pub fn shift_components(&mut self, components: &[f64]) -> MorphResult<()> {
        let vector = vector_from_components(components)?;
        self.shift(&vector);
        Ok(())
    }

    pub fn scale(&mut self, factor: f64, center: TransformCenter) -> MorphResult<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(MorphError::InvalidArgument(format!(
                "scale factor must be positive, got {factor}"
            )));
        }
        let c = self.resolve_center(center);
        self.mutate(|pts| pts.iter_mut().for_each(|p| p.scale_about(factor, &c)));
        Ok(())
    }

    /// Rotates CCW by `angle` radians.
    pub fn rotate(&mut self, angle: f64, center: TransformCenter) {
        let c = self.resolve_center(center);
        self.mutate(|pts| pts.iter_mut().for_each(|p| p.rotate_about(angle, &c)));
    }

    /// Replaces the boundary with its parallel offset. Not an affine map: the
    /// point count usually changes.
    pub fn offset(&mut self, amount: OffsetAmount) -> MorphResult<()> {
        let distance = match amount {
            OffsetAmount::Distance(d) => d,
            OffsetAmount::Fit(factor) => self.mean_radius()? * (factor - 1.0),
        };
        let ring = offset_polygon(self.xy(), distance)?;
        self.replace_xy(ring)
    }

    /// Drops points at even intervals. Selected indices start at `step - 1`.
    pub fn down_sample(&mut self, mode: DownSampleMode, step: usize) -> MorphResult<()> {
        if step == 0 {
            return Err(MorphError::InvalidArgument("down sample step must be >= 1".to_string()));
        }
        let selected = |i: usize| (i + 1) % step == 0;
        let kept: Vec<Point> = self
            .points
            .iter()
            .enumerate()
            .filter(|(i, _)| match mode {
                DownSampleMode::Keep => selected(*i),
                DownSampleMode::Remove => !selected(*i),
            })
            .map(|(_, p)| *p)
            .collect();
        check_points(&kept)?;
        self.mutate(|pts| *pts = kept);
        Ok(())
    }

    fn resolve_center(&self, center: TransformCenter) -> Vector2<f64> {
        match center {
            TransformCenter::Centroid => self.centroid(),
            TransformCenter::BoundsCenter => {
                let (min, max) = self.bounds();
                (min + max) * 0.5
            }
            TransformCenter::At(c) => c,
        }
    }

    // ---- derived geometry ----

    /// Positive for counter-clockwise point order.
    pub fn signed_area(&self) -> f64 {
        *self.cache.signed_area.get_or_init(|| signed_area(self.xy()))
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Area centroid; falls back to the vertex mean for zero-area rings.
    pub fn centroid(&self) -> Vector2<f64> {
        *self.cache.centroid.get_or_init(|| {
            let xy = self.xy();
            let n = xy.len();
            let a = self.signed_area();
            if a.abs() <= f64::EPSILON {
                return xy.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n as f64;
            }
            // shift to the first vertex to keep the sums small
            let origin = xy[0];
            let mut c = Vector2::zeros();
            for i in 0..n {
                let p = xy[i] - origin;
                let q = xy[(i + 1) % n] - origin;
                let w = p.x * q.y - q.x * p.y;
                c += (p + q) * w;
            }
            origin + c / (6.0 * a)
        })
    }

    pub fn ellipse(&self) -> MorphResult<Ellipse> {
        if let Some(e) = self.cache.ellipse.get() {
            return Ok(*e);
        }
        let e = fit_ellipse(self.xy())?;
        let _ = self.cache.ellipse.set(e);
        Ok(e)
    }

    /// Mean of the best-fit ellipse semi-axes.
    pub fn mean_radius(&self) -> MorphResult<f64> {
        Ok(self.ellipse()?.mean_radius())
    }

    pub fn bounding_circle(&self) -> Circle {
        *self
            .cache
            .bounding_circle
            .get_or_init(|| minimum_bounding_circle(self.xy()))
    }

    pub fn bounds(&self) -> (Vector2<f64>, Vector2<f64>) {
        self.xy().iter().fold(
            (
                Vector2::new(f64::MAX, f64::MAX),
                Vector2::new(f64::MIN, f64::MIN),
            ),
            |(min, max), p| (min.inf(p), max.sup(p)),
        )
    }

    /// New trace on the best-fit circle with this trace's point count.
    pub fn to_circle(&self) -> MorphResult<Trace> {
        self.to_shape(ReshapeMode::Circle)
    }

    /// New trace on the best-fit ellipse with this trace's point count.
    pub fn to_ellipse(&self) -> MorphResult<Trace> {
        self.to_shape(ReshapeMode::Ellipse)
    }

    pub fn to_shape(&self, mode: ReshapeMode) -> MorphResult<Trace> {
        let shape = self.ellipse()?.reshaped(mode);
        Trace::from_ellipse(&shape, self.count(), self.z())
    }

    // ---- predicates ----

    pub fn contains_point(&self, p: &Vector2<f64>) -> bool {
        point_in_polygon(p, self.xy())
    }

    /// True if this trace lies inside `outer` without touching its boundary.
    pub fn within(&self, outer: &Trace) -> bool {
        let (min, max) = self.bounds();
        let (omin, omax) = outer.bounds();
        if min.x < omin.x || min.y < omin.y || max.x > omax.x || max.y > omax.y {
            return false;
        }
        self.xy().iter().all(|p| outer.contains_point(p)) && !self.intersects(outer)
    }

    /// True if the two boundaries touch or cross.
    pub fn intersects(&self, other: &Trace) -> bool {
        let (min, max) = self.bounds();
        let (omin, omax) = other.bounds();
        if max.x < omin.x || omax.x < min.x || max.y < omin.y || omax.y < min.y {
            return false;
        }
        let a = self.xy();
        let b = other.xy();
        let (n, m) = (a.len(), b.len());
        (0..n).any(|i| {
            let (p1, p2) = (&a[i], &a[(i + 1) % n]);
            (0..m).any(|j| segments_intersect(p1, p2, &b[j], &b[(j + 1) % m]))
        })
    }

    /// True if no two non-adjacent edges meet.
    pub fn is_simple(&self) -> bool {
        let xy = self.xy();
        let n = xy.len();
        for i in 0..n {
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                if segments_intersect(&xy[i], &xy[(i + 1) % n], &xy[j], &xy[(j + 1) % n]) {
                    return false;
                }
            }
        }
        true
    }

    // ---- distances ----

    /// Smallest vertex-to-vertex distance between the two traces.
    pub fn min_distance(&self, other: &Trace) -> f64 {
        self.min_distance_points(other).0
    }

    /// `min_distance` together with the closest vertex pair.
    pub fn min_distance_points(&self, other: &Trace) -> (f64, Point, Point) {
        let mut best = (f64::MAX, 0, 0);
        for (i, p) in self.xy().iter().enumerate() {
            for (j, q) in other.xy().iter().enumerate() {
                let d = (p - q).norm_squared();
                if d < best.0 {
                    best = (d, i, j);
                }
            }
        }
        (best.0.sqrt(), self.points[best.1], other.points[best.2])
    }

    /// Symmetric vertex Hausdorff distance.
    pub fn max_distance(&self, other: &Trace) -> f64 {
        let directed = |a: &[Vector2<f64>], b: &[Vector2<f64>]| {
            a.iter()
                .map(|p| {
                    b.iter()
                        .map(|q| (p - q).norm_squared())
                        .fold(f64::MAX, f64::min)
                })
                .fold(0.0, f64::max)
                .sqrt()
        };
        directed(self.xy(), other.xy()).max(directed(other.xy(), self.xy()))
    }

    /// Distance from this trace's centroid to the boundary of `other`.
    pub fn centroid_distance(&self, other: &Trace) -> f64 {
        closest_point_on_boundary(&self.centroid(), other.xy()).1
    }

    /// CCW bearing in radians from this centroid to the centroid of `other`.
    pub fn angle_to(&self, other: &Trace) -> f64 {
        let d = other.centroid() - self.centroid();
        d.y.atan2(d.x)
    }

    /// Farthest point where the ray `origin + t * direction` (`t >= 0`)
    /// crosses the boundary.
    pub fn ray_intersection(
        &self,
        origin: &Vector2<f64>,
        direction: &Vector2<f64>,
    ) -> Option<Vector2<f64>> {
        let xy = self.xy();
        let n = xy.len();
        (0..n)
            .filter_map(|i| ray_segment_intersection(origin, direction, &xy[i], &xy[(i + 1) % n]))
            .fold(None, |best: Option<f64>, t| Some(best.map_or(t, |b| b.max(t))))
            .map(|t| origin + direction * t)
    }
}

fn check_points(points: &[Point]) -> MorphResult<()> {
    if points.len() < 3 {
        return Err(MorphError::Geometry(format!(
            "a trace needs at least 3 points, got {}",
            points.len()
        )));
    }
    if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(MorphError::Geometry("trace contains non-finite coordinates".to_string()));
    }
    let z = points[0].z;
    if points.iter().any(|p| p.z != z) {
        return Err(MorphError::Geometry(
            "trace points do not share one z-plane".to_string(),
        ));
    }
    Ok(())
}

/// Accepts `[dx, dy]` or `[dx, dy, 0]`; anything else would leave the plane.
pub fn vector_from_components(components: &[f64]) -> MorphResult<Vector2<f64>> {
    match components {
        [x, y] => Ok(Vector2::new(*x, *y)),
        [x, y, z] if *z == 0.0 => Ok(Vector2::new(*x, *y)),
        _ => Err(MorphError::InvalidArgument(format!(
            "expected a 2D vector (or 3D with zero z), got {components:?}"
        ))),
    }
}
