pub mod config;
pub mod deform;
pub mod error;
pub mod geometry;
pub mod morphology;
pub mod pipeline;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use config::{DeformMode, DeformStrategy, MorphologyConfig, ReshapeMode};
pub use deform::{CancelToken, DeformParams, Deformable, Deformation, FrameObserver};
pub use error::{MorphError, MorphResult, MorphologyViolation};
pub use geometry::{Ellipse, Point, Trace, TransformCenter};
pub use morphology::{Fascicle, MorphologySummary, Nerve, Slide};
pub use pipeline::{normalize_slide, NormalizationReport};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module:
///
/// ```python
/// import nervemorph as nm
/// nerve, fascicles, report = nm.normalize_slide_py(
///     nm.PyTrace(nerve_points),
///     [nm.PyFascicle(nm.PyTrace(outer), [nm.PyTrace(inner)])],
///     '{"deform": "physics", "reshape_nerve": "circle"}',
/// )
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn nervemorph(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(python_bind::normalize_slide_py, m)?)?;
    m.add_function(wrap_pyfunction!(python_bind::deform_steps_py, m)?)?;

    m.add_class::<python_bind::PyTrace>()?;
    m.add_class::<python_bind::PyFascicle>()?;
    Ok(())
}
