use nalgebra::Vector2;
use tracing::debug;

use crate::config::ReshapeMode;
use crate::error::{MorphError, MorphResult, MorphologyViolation};
use crate::geometry::{Trace, TransformCenter};

use super::fascicle::Fascicle;
use super::nerve::Nerve;
use super::summary::MorphologySummary;

/// One histology cross-section: an optional nerve and its fascicles.
///
/// Without a nerve the slide must hold exactly one fascicle, whose outer
/// trace then plays the part of the nerve boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    nerve: Option<Nerve>,
    fascicles: Vec<Fascicle>,
}

impl Slide {
    pub fn new(fascicles: Vec<Fascicle>, nerve: Option<Nerve>) -> MorphResult<Self> {
        if nerve.is_none() && fascicles.len() != 1 {
            return Err(MorphError::InvalidArgument(format!(
                "a slide without a nerve must contain exactly one fascicle, got {}",
                fascicles.len()
            )));
        }
        if let Some(n) = &nerve {
            if !n.trace().is_simple() {
                return Err(MorphologyViolation::SelfIntersecting {
                    what: "nerve trace".to_string(),
                }
                .into());
            }
        }
        if let Some(index) = fascicles.iter().position(|f| !f.outer().is_simple()) {
            return Err(MorphologyViolation::SelfIntersecting {
                what: format!("outer trace of fascicle {index}"),
            }
            .into());
        }
        Ok(Self { nerve, fascicles })
    }

    pub fn nerve(&self) -> Option<&Nerve> {
        self.nerve.as_ref()
    }

    pub fn fascicles(&self) -> &[Fascicle] {
        &self.fascicles
    }

    pub fn fascicles_mut(&mut self) -> &mut [Fascicle] {
        &mut self.fascicles
    }

    /// Replaces the nerve. Validity is not rechecked.
    pub fn set_nerve(&mut self, nerve: Nerve) {
        self.nerve = Some(nerve);
    }

    /// Single fascicle with no separate nerve boundary.
    pub fn monofasc(&self) -> bool {
        self.nerve.is_none() && self.fascicles.len() == 1
    }

    /// Nerve trace, or the lone fascicle outer for a monofascicular slide.
    pub fn boundary(&self) -> &Trace {
        match &self.nerve {
            Some(n) => n.trace(),
            None => self.fascicles[0].outer(),
        }
    }

    /// Checks the slide invariants in order: fascicle/fascicle intersection,
    /// fascicle/nerve intersection, fascicles outside the nerve, then (with a
    /// `tolerance`) minimum separation.
    ///
    /// With `specific` the first violation is returned as its own error.
    /// Otherwise any violation yields `Err(Invalid)` when `die`, else `Ok(false)`.
    pub fn validation(&self, specific: bool, die: bool, tolerance: Option<f64>) -> MorphResult<bool> {
        match self.first_violation(tolerance) {
            None => Ok(true),
            Some(violation) if specific => Err(violation.into()),
            Some(_) if die => Err(MorphologyViolation::Invalid.into()),
            Some(_) => Ok(false),
        }
    }

    /// True when every invariant holds, with separation checked at `tolerance`.
    pub fn is_valid(&self, tolerance: Option<f64>) -> bool {
        self.first_violation(tolerance).is_none()
    }

    fn first_violation(&self, tolerance: Option<f64>) -> Option<MorphologyViolation> {
        let n = self.fascicles.len();

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&self.fascicles[i], &self.fascicles[j]);
                if a.intersects(b) || a.outer().within(b.outer()) || b.outer().within(a.outer()) {
                    return Some(MorphologyViolation::FascicleIntersection { first: i, second: j });
                }
            }
        }

        if let Some(nerve) = &self.nerve {
            if let Some(index) = self.fascicles.iter().position(|f| f.intersects_nerve(nerve)) {
                return Some(MorphologyViolation::FascicleNerveIntersection { index });
            }
            if let Some(index) = self.fascicles.iter().position(|f| !f.within_nerve(nerve)) {
                return Some(MorphologyViolation::FascicleOutsideNerve { index });
            }
        }

        let tolerance = tolerance?;
        for i in 0..n {
            for j in (i + 1)..n {
                let distance = self.fascicles[i].min_distance(&self.fascicles[j]);
                if distance < tolerance {
                    return Some(MorphologyViolation::FasciclesTooClose {
                        first: i,
                        second: j,
                        distance,
                        tolerance,
                    });
                }
            }
        }
        if let Some(nerve) = &self.nerve {
            for (index, f) in self.fascicles.iter().enumerate() {
                let distance = f.min_distance_to_nerve(nerve);
                if distance < tolerance {
                    return Some(MorphologyViolation::FascicleTooCloseToNerve {
                        index,
                        distance,
                        tolerance,
                    });
                }
            }
        }
        None
    }

    /// Best-fit circle or ellipse of the nerve, keeping its point count.
    pub fn reshaped_nerve(&self, mode: ReshapeMode) -> MorphResult<Nerve> {
        let nerve = self.nerve.as_ref().ok_or_else(|| {
            MorphError::Precondition("cannot reshape the nerve of a slide without one".to_string())
        })?;
        let reshaped = nerve.reshaped(mode)?;
        debug!(
            "reshaped nerve to {mode}: {} points, area {:.1} -> {:.1}",
            reshaped.trace().count(),
            nerve.area(),
            reshaped.area()
        );
        Ok(reshaped)
    }

    pub fn shift(&mut self, vector: &Vector2<f64>) {
        if let Some(n) = &mut self.nerve {
            n.shift(vector);
        }
        self.fascicles.iter_mut().for_each(|f| f.shift(vector));
    }

    /// Scales the whole slide about the boundary centroid.
    pub fn scale(&mut self, factor: f64) -> MorphResult<()> {
        let c = TransformCenter::At(self.boundary().centroid());
        if let Some(n) = &mut self.nerve {
            n.scale(factor, c)?;
        }
        for f in &mut self.fascicles {
            f.scale(factor, c)?;
        }
        Ok(())
    }

    /// Rotates the whole slide CCW about the boundary centroid.
    pub fn rotate(&mut self, angle: f64) {
        let c = TransformCenter::At(self.boundary().centroid());
        if let Some(n) = &mut self.nerve {
            n.rotate(angle, c);
        }
        self.fascicles.iter_mut().for_each(|f| f.rotate(angle, c));
    }

    /// Shifts everything so the boundary centroid lands on `point`.
    pub fn move_center(&mut self, point: &Vector2<f64>) {
        let delta = point - self.boundary().centroid();
        self.shift(&delta);
    }

    pub fn morphology(&self) -> MorphResult<MorphologySummary> {
        MorphologySummary::of(self)
    }
}
