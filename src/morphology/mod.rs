pub mod fascicle;
pub mod nerve;
pub mod reposition;
pub mod slide;
pub mod summary;

pub use fascicle::Fascicle;
pub use nerve::Nerve;
pub use slide::Slide;
pub use summary::{FascicleSummary, MorphologySummary, TraceSummary};
