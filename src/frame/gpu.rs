// The GPU seam the frame core is written against
//
// The Vulkan backend implements these traits for real hardware; tests drive
// the same code through a simulated device.

use crate::error::RenderResult;
use std::time::Duration;

/// Outcome of asking the presentation engine for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Acquired { index: u32, suboptimal: bool },
    /// No image this time (not ready or acquire timeout). Try again next iteration.
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWait {
    Signaled,
    TimedOut,
}

/// Operations the frame loop needs. All waits take `None` for "wait forever".
pub trait FrameGpu {
    type Fence;
    type Semaphore;
    type CommandBuffer;

    fn create_fence(&self, signaled: bool) -> RenderResult<Self::Fence>;
    fn create_semaphore(&self) -> RenderResult<Self::Semaphore>;

    /// Request the next presentable image. `signal` must be unsignaled and is
    /// signaled once the image is actually acquired.
    fn acquire_next_image(
        &self,
        signal: &Self::Fence,
        timeout: Option<Duration>,
    ) -> RenderResult<AcquireStatus>;

    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Option<Duration>) -> RenderResult<FenceWait>;
    fn reset_fence(&self, fence: &Self::Fence) -> RenderResult<()>;

    /// Queue `commands`; `signal` and `fence` are signaled when they finish.
    /// Returns without waiting for the GPU.
    fn submit(
        &self,
        commands: &Self::CommandBuffer,
        signal: Option<&Self::Semaphore>,
        fence: &Self::Fence,
    ) -> RenderResult<()>;

    /// Hand image `image_index` back to the presentation engine once `wait` is signaled
    fn present(&self, image_index: u32, wait: &Self::Semaphore) -> RenderResult<()>;

    /// Block until no submitted work remains
    fn wait_idle(&self) -> RenderResult<()>;
}

/// Host-visible buffer operations for the one-shot vertex upload
pub trait UploadGpu: FrameGpu {
    type Buffer;

    fn create_host_buffer(&self, label: &str, size: u64) -> RenderResult<Self::Buffer>;

    /// Copy `bytes` into the mapped buffer starting at offset 0
    fn write_mapped(&self, buffer: &mut Self::Buffer, bytes: &[u8]) -> RenderResult<()>;

    /// Make host writes to the mapped range available to the device
    fn flush_mapped(&self, buffer: &Self::Buffer) -> RenderResult<()>;

    /// Record a one-shot command buffer holding a single global
    /// HOST_WRITE -> VERTEX_ATTRIBUTE_READ barrier
    fn record_host_write_barrier(&self) -> RenderResult<Self::CommandBuffer>;
}

/// Window system event source, polled once per loop iteration
pub trait PlatformEvents {
    fn poll_close_requested(&mut self) -> bool;
}
