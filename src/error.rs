use thiserror::Error;

/// Which containment/intersection rule a fascicle, nerve or slide broke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MorphologyViolation {
    #[error("outer traces of fascicles {first} and {second} intersect")]
    FascicleIntersection { first: usize, second: usize },

    #[error("outer trace of fascicle {index} intersects the nerve")]
    FascicleNerveIntersection { index: usize },

    #[error("fascicle {index} is not inside the nerve")]
    FascicleOutsideNerve { index: usize },

    #[error("fascicles {first} and {second} are {distance:.3} apart, below the tolerance of {tolerance}")]
    FasciclesTooClose {
        first: usize,
        second: usize,
        distance: f64,
        tolerance: f64,
    },

    #[error("fascicle {index} is {distance:.3} from the nerve, below the tolerance of {tolerance}")]
    FascicleTooCloseToNerve {
        index: usize,
        distance: f64,
        tolerance: f64,
    },

    #[error("inner trace {index} is not inside the fascicle outer trace")]
    InnerOutsideOuter { index: usize },

    #[error("fascicle traces {first} and {second} intersect (index {outer} is the outer)")]
    FascicleTracesIntersect {
        first: usize,
        second: usize,
        outer: usize,
    },

    #[error("{what} is self-intersecting")]
    SelfIntersecting { what: String },

    #[error("slide is invalid")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum MorphError {
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("morphology error: {0}")]
    Morphology(#[from] MorphologyViolation),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("no valid configuration after {iterations} jitter steps")]
    Convergence { iterations: usize },

    #[error("deformation cancelled after {steps} simulation steps")]
    Cancelled { steps: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type MorphResult<T> = Result<T, MorphError>;
