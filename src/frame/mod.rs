// Frame core - upload stage, per-image resources and the frame loop
//
// Written against the traits in `gpu` so it runs the same on the Vulkan
// backend and on the simulated device used by the tests.

pub mod frame_loop;
pub mod gpu;
pub mod resources;
pub mod upload;

#[cfg(test)]
pub mod mock;

pub use frame_loop::{FrameLoop, FrameStats, LoopSettings};
pub use gpu::{AcquireStatus, FenceWait, FrameGpu, PlatformEvents, UploadGpu};
pub use resources::FrameResources;
pub use upload::VertexAttribute;
