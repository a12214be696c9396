use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::Trace;

use super::world::Pose;

/// Cooperative cancellation flag, checked between simulation steps.
/// Clones share the flag, so one can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receives body poses while a deformation runs. Implementations must not
/// assume they can influence the simulation; they only get shared references.
pub trait FrameObserver {
    /// Called when boundary frame `index` becomes the active wall set.
    fn on_frame(&mut self, index: usize, boundary: &Trace, poses: &[Pose]);

    /// Called once after the settling steps.
    fn on_settled(&mut self, _poses: &[Pose]) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FrameObserver for NoopObserver {
    fn on_frame(&mut self, _index: usize, _boundary: &Trace, _poses: &[Pose]) {}
}
