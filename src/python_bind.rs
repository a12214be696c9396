use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::config::MorphologyConfig;
use crate::deform::{CancelToken, Deformable, NoopObserver};
use crate::geometry::{Point, Trace};
use crate::morphology::{Fascicle, Nerve, Slide};
use crate::pipeline::normalize_slide;

fn runtime_error(e: impl std::fmt::Display) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyTrace {
    #[pyo3(get, set)]
    pub points: Vec<(f64, f64, f64)>,
}

#[pymethods]
impl PyTrace {
    #[new]
    fn new(points: Vec<(f64, f64, f64)>) -> PyResult<Self> {
        let py = Self { points };
        py.to_rust_trace()?;
        Ok(py)
    }

    fn __repr__(&self) -> String {
        format!("Trace(points={})", self.points.len())
    }

    fn __len__(&self) -> usize {
        self.points.len()
    }

    fn area(&self) -> PyResult<f64> {
        Ok(self.to_rust_trace()?.area())
    }

    fn centroid(&self) -> PyResult<(f64, f64)> {
        let c = self.to_rust_trace()?.centroid();
        Ok((c.x, c.y))
    }

    /// `((cx, cy), (semi_major, semi_minor), angle_degrees)`
    fn ellipse(&self) -> PyResult<((f64, f64), (f64, f64), f64)> {
        let e = self.to_rust_trace()?.ellipse().map_err(runtime_error)?;
        Ok((e.center, (e.semi_major, e.semi_minor), e.angle))
    }

    fn to_circle(&self) -> PyResult<PyTrace> {
        let trace = self.to_rust_trace()?.to_circle().map_err(runtime_error)?;
        Ok((&trace).into())
    }

    fn to_ellipse(&self) -> PyResult<PyTrace> {
        let trace = self.to_rust_trace()?.to_ellipse().map_err(runtime_error)?;
        Ok((&trace).into())
    }
}

impl PyTrace {
    fn to_rust_trace(&self) -> PyResult<Trace> {
        Trace::try_from(self).map_err(runtime_error)
    }
}

impl From<&Trace> for PyTrace {
    fn from(trace: &Trace) -> Self {
        Self {
            points: trace.points().iter().map(|p| (p.x, p.y, p.z)).collect(),
        }
    }
}

impl TryFrom<&PyTrace> for Trace {
    type Error = crate::error::MorphError;

    fn try_from(py: &PyTrace) -> Result<Self, Self::Error> {
        Trace::new(py.points.iter().map(|&(x, y, z)| Point::with_z(x, y, z)).collect())
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyFascicle {
    #[pyo3(get, set)]
    pub outer: PyTrace,
    #[pyo3(get, set)]
    pub inners: Vec<PyTrace>,
}

#[pymethods]
impl PyFascicle {
    #[new]
    #[pyo3(signature = (outer, inners = Vec::new()))]
    fn new(outer: PyTrace, inners: Vec<PyTrace>) -> Self {
        Self { outer, inners }
    }

    fn __repr__(&self) -> String {
        format!(
            "Fascicle(outer={}, inners={})",
            self.outer.points.len(),
            self.inners.len()
        )
    }
}

impl From<&Fascicle> for PyFascicle {
    fn from(fascicle: &Fascicle) -> Self {
        Self {
            outer: fascicle.outer().into(),
            inners: fascicle.inners().iter().map(PyTrace::from).collect(),
        }
    }
}

impl PyFascicle {
    fn to_rust_fascicle(&self, outer_factor: Option<f64>) -> PyResult<Fascicle> {
        let outer = self.outer.to_rust_trace()?;
        let inners = self
            .inners
            .iter()
            .map(PyTrace::to_rust_trace)
            .collect::<PyResult<Vec<_>>>()?;
        Fascicle::new(outer, inners, outer_factor).map_err(runtime_error)
    }
}

/// Normalizes one slide. `config_json` holds the morphology settings; the
/// returned tuple is `(nerve, fascicles, report_json)`.
#[pyfunction]
#[pyo3(signature = (nerve, fascicles, config_json = None, outer_factor = None))]
pub fn normalize_slide_py(
    nerve: Option<PyTrace>,
    fascicles: Vec<PyFascicle>,
    config_json: Option<&str>,
    outer_factor: Option<f64>,
) -> PyResult<(Option<PyTrace>, Vec<PyFascicle>, String)> {
    let config = match config_json {
        Some(json) => MorphologyConfig::from_json_str(json).map_err(runtime_error)?,
        None => MorphologyConfig::default(),
    };
    let nerve = nerve
        .as_ref()
        .map(|n| n.to_rust_trace().map(Nerve::new))
        .transpose()?;
    let fascicles = fascicles
        .iter()
        .map(|f| f.to_rust_fascicle(outer_factor))
        .collect::<PyResult<Vec<_>>>()?;

    let mut slide = Slide::new(fascicles, nerve).map_err(runtime_error)?;
    let report = normalize_slide(&mut slide, &config, &mut NoopObserver, &CancelToken::new())
        .map_err(|e| PyRuntimeError::new_err(format!("{e:#}")))?;
    let report_json = serde_json::to_string(&report).map_err(runtime_error)?;

    Ok((
        slide.nerve().map(|n| n.trace().into()),
        slide.fascicles().iter().map(PyFascicle::from).collect(),
        report_json,
    ))
}

#[pyfunction]
#[pyo3(signature = (start, end, count, ratio = None))]
pub fn deform_steps_py(
    start: PyTrace,
    end: PyTrace,
    count: usize,
    ratio: Option<f64>,
) -> PyResult<Vec<PyTrace>> {
    let frames = Deformable::deform_steps(
        &start.to_rust_trace()?,
        &end.to_rust_trace()?,
        count,
        ratio,
    )
    .map_err(runtime_error)?;
    Ok(frames.iter().map(PyTrace::from).collect())
}
