pub mod circle;
pub mod ellipse;
pub mod offset;
pub mod point;
pub mod predicates;
pub mod trace;

pub use circle::Circle;
pub use ellipse::Ellipse;
pub use point::Point;
pub use trace::{DownSampleMode, OffsetAmount, Trace, TransformCenter};
