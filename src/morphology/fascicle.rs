use nalgebra::Vector2;

use crate::error::{MorphError, MorphResult, MorphologyViolation};
use crate::geometry::{Ellipse, OffsetAmount, Trace, TransformCenter};

use super::nerve::Nerve;

/// A perineurium (outer) trace enclosing one or more endoneurium (inner)
/// traces.
#[derive(Debug, Clone, PartialEq)]
pub struct Fascicle {
    outer: Trace,
    inners: Vec<Trace>,
}

impl Fascicle {
    /// Builds and validates a fascicle.
    ///
    /// With no `inners`, `trace` is taken as the only inner and the outer is
    /// synthesised by offsetting a copy with `outer_factor` (see
    /// [`OffsetAmount::Fit`]); the factor is required in that case.
    pub fn new(trace: Trace, inners: Vec<Trace>, outer_factor: Option<f64>) -> MorphResult<Self> {
        let fascicle = Self::deferred(trace, inners, outer_factor)?;
        fascicle.validate()?;
        Ok(fascicle)
    }

    /// Same as [`Fascicle::new`] without running [`Fascicle::validate`].
    pub fn deferred(trace: Trace, inners: Vec<Trace>, outer_factor: Option<f64>) -> MorphResult<Self> {
        if !inners.is_empty() {
            return Ok(Self {
                outer: trace,
                inners,
            });
        }
        let factor = outer_factor.ok_or_else(|| {
            MorphError::MissingParameter(
                "outer scale factor is required to build a fascicle from an inner trace".to_string(),
            )
        })?;
        let mut outer = trace.clone();
        outer.offset(OffsetAmount::Fit(factor))?;
        Ok(Self {
            outer,
            inners: vec![trace],
        })
    }

    /// Every inner must sit inside the outer and no two member traces may touch.
    pub fn validate(&self) -> MorphResult<()> {
        if let Some(index) = self
            .inners
            .iter()
            .position(|inner| !inner.within(&self.outer))
        {
            return Err(MorphologyViolation::InnerOutsideOuter { index }.into());
        }

        let all = self.all_traces();
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                if all[i].intersects(all[j]) {
                    return Err(MorphologyViolation::FascicleTracesIntersect {
                        first: i,
                        second: j,
                        outer: self.inners.len(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn outer(&self) -> &Trace {
        &self.outer
    }

    pub fn inners(&self) -> &[Trace] {
        &self.inners
    }

    /// Inners followed by the outer.
    pub fn all_traces(&self) -> Vec<&Trace> {
        self.inners.iter().chain(std::iter::once(&self.outer)).collect()
    }

    fn all_traces_mut(&mut self) -> impl Iterator<Item = &mut Trace> {
        self.inners.iter_mut().chain(std::iter::once(&mut self.outer))
    }

    pub fn shift(&mut self, vector: &Vector2<f64>) {
        self.all_traces_mut().for_each(|t| t.shift(vector));
    }

    /// Scales every member about one common point (the outer centroid by default).
    pub fn scale(&mut self, factor: f64, center: TransformCenter) -> MorphResult<()> {
        let c = self.common_center(center);
        for trace in self.all_traces_mut() {
            trace.scale(factor, TransformCenter::At(c))?;
        }
        Ok(())
    }

    /// Rotates every member CCW about one common point (the outer centroid by default).
    pub fn rotate(&mut self, angle: f64, center: TransformCenter) {
        let c = self.common_center(center);
        self.all_traces_mut()
            .for_each(|t| t.rotate(angle, TransformCenter::At(c)));
    }

    fn common_center(&self, center: TransformCenter) -> Vector2<f64> {
        match center {
            TransformCenter::Centroid => self.outer.centroid(),
            TransformCenter::BoundsCenter => {
                let (min, max) = self.outer.bounds();
                (min + max) * 0.5
            }
            TransformCenter::At(c) => c,
        }
    }

    /// Member trace with the smallest area.
    pub fn smallest_trace(&self) -> &Trace {
        self.all_traces()
            .into_iter()
            .min_by(|a, b| a.area().total_cmp(&b.area()))
            .unwrap_or(&self.outer)
    }

    pub fn area(&self) -> f64 {
        self.outer.area()
    }

    pub fn centroid(&self) -> Vector2<f64> {
        self.outer.centroid()
    }

    pub fn ellipse(&self) -> MorphResult<Ellipse> {
        self.outer.ellipse()
    }

    pub fn within_nerve(&self, nerve: &Nerve) -> bool {
        self.outer.within(nerve.trace())
    }

    pub fn intersects_nerve(&self, nerve: &Nerve) -> bool {
        self.outer.intersects(nerve.trace())
    }

    pub fn intersects(&self, other: &Fascicle) -> bool {
        self.outer.intersects(&other.outer)
    }

    pub fn min_distance(&self, other: &Fascicle) -> f64 {
        self.outer.min_distance(&other.outer)
    }

    pub fn min_distance_to_nerve(&self, nerve: &Nerve) -> f64 {
        self.outer.min_distance(nerve.trace())
    }

    pub fn centroid_distance(&self, other: &Fascicle) -> f64 {
        self.outer.centroid_distance(&other.outer)
    }

    pub fn angle_to(&self, other: &Fascicle) -> f64 {
        self.outer.angle_to(&other.outer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::circle_trace;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn two_inner_fascicle() -> Fascicle {
        Fascicle::new(
            circle_trace(100.0, 48, (0.0, 0.0)),
            vec![
                circle_trace(30.0, 24, (-40.0, 0.0)),
                circle_trace(20.0, 24, (40.0, 10.0)),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_inner_outside_outer_is_rejected() {
        let err = Fascicle::new(
            circle_trace(50.0, 32, (0.0, 0.0)),
            vec![circle_trace(10.0, 16, (200.0, 0.0))],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MorphError::Morphology(MorphologyViolation::InnerOutsideOuter { index: 0 })
        ));
    }

    #[test]
    fn test_intersecting_inners_are_rejected() {
        let err = Fascicle::new(
            circle_trace(100.0, 48, (0.0, 0.0)),
            vec![
                circle_trace(30.0, 24, (-10.0, 0.0)),
                circle_trace(30.0, 24, (10.0, 0.0)),
            ],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MorphError::Morphology(MorphologyViolation::FascicleTracesIntersect { first: 0, second: 1, .. })
        ));
    }

    #[test]
    fn test_synthesised_outer_requires_factor() {
        let inner = circle_trace(40.0, 32, (0.0, 0.0));
        assert!(matches!(
            Fascicle::new(inner.clone(), vec![], None),
            Err(MorphError::MissingParameter(_))
        ));

        let fascicle = Fascicle::new(inner, vec![], Some(1.25)).unwrap();
        assert_eq!(fascicle.inners().len(), 1);
        assert_relative_eq!(fascicle.outer().mean_radius().unwrap(), 50.0, epsilon = 1.0);
    }

    #[test]
    fn test_rigid_rotation_keeps_layout() {
        let mut f = two_inner_fascicle();
        let before = f.inners()[1].centroid() - f.centroid();
        f.rotate(PI, TransformCenter::Centroid);
        let after = f.inners()[1].centroid() - f.centroid();
        assert_relative_eq!(after.x, -before.x, epsilon = 1e-6);
        assert_relative_eq!(after.y, -before.y, epsilon = 1e-6);
        f.validate().unwrap();
    }

    #[test]
    fn test_shift_moves_all_members() {
        let mut f = two_inner_fascicle();
        f.shift(&Vector2::new(10.0, -5.0));
        assert_relative_eq!(f.centroid().x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(f.inners()[0].centroid().y, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotate_about_bounds_center() {
        let mut f = two_inner_fascicle();
        f.shift(&Vector2::new(100.0, 50.0));
        f.rotate(PI, TransformCenter::BoundsCenter);
        // inner 0 sat at (60, 50), mirrored through the outer's box centre (100, 50)
        assert_relative_eq!(f.inners()[0].centroid().x, 140.0, epsilon = 1e-6);
        assert_relative_eq!(f.inners()[0].centroid().y, 50.0, epsilon = 1e-6);
        assert_relative_eq!(f.centroid().x, 100.0, epsilon = 1e-6);
        f.validate().unwrap();
    }

    #[test]
    fn test_smallest_trace() {
        let f = two_inner_fascicle();
        assert_relative_eq!(f.smallest_trace().area(), f.inners()[1].area());
    }
}
