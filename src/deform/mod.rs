pub mod control;
pub mod deformable;
pub mod world;

pub use control::{CancelToken, FrameObserver, NoopObserver};
pub use deformable::{DeformParams, Deformable, Deformation};
pub use world::{BodyHandle, ContactWorld, Pose, RigidBodyWorld, WallsHandle};
