use nalgebra::Vector2;

use crate::config::ReshapeMode;
use crate::error::MorphResult;
use crate::geometry::{Ellipse, Trace, TransformCenter};

/// The epineurium boundary of a cross-section.
#[derive(Debug, Clone, PartialEq)]
pub struct Nerve {
    trace: Trace,
}

impl Nerve {
    pub fn new(trace: Trace) -> Self {
        Self { trace }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn area(&self) -> f64 {
        self.trace.area()
    }

    pub fn centroid(&self) -> Vector2<f64> {
        self.trace.centroid()
    }

    pub fn ellipse(&self) -> MorphResult<Ellipse> {
        self.trace.ellipse()
    }

    pub fn shift(&mut self, vector: &Vector2<f64>) {
        self.trace.shift(vector);
    }

    pub fn scale(&mut self, factor: f64, center: TransformCenter) -> MorphResult<()> {
        self.trace.scale(factor, center)
    }

    pub fn rotate(&mut self, angle: f64, center: TransformCenter) {
        self.trace.rotate(angle, center);
    }

    /// Best-fit canonical shape with the same point count.
    pub fn reshaped(&self, mode: ReshapeMode) -> MorphResult<Nerve> {
        Ok(Nerve::new(self.trace.to_shape(mode)?))
    }
}

impl From<Trace> for Nerve {
    fn from(trace: Trace) -> Self {
        Nerve::new(trace)
    }
}
