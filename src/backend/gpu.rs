// Vulkan implementation of the frame core's GPU traits

use ash::vk;
use std::sync::Arc;
use std::time::Duration;
use super::commands::{self, CommandBuffer, CommandPool};
use super::{Fence, Semaphore, Swapchain, VertexBuffer, VulkanDevice};
use crate::error::{RenderError, RenderResult};
use crate::frame::{AcquireStatus, FenceWait, FrameGpu, UploadGpu};

/// The device, its swapchain and the pool that frame commands come from
pub struct VulkanGpu {
    pub swapchain: Swapchain,
    pub command_pool: Arc<CommandPool>,
    pub device: Arc<VulkanDevice>,
}

impl VulkanGpu {
    pub fn new(device: Arc<VulkanDevice>, swapchain: Swapchain) -> RenderResult<Self> {
        let command_pool = CommandPool::new(&device)?;
        Ok(Self {
            swapchain,
            command_pool,
            device,
        })
    }

    /// One frame command buffer per swapchain image
    pub fn allocate_frame_commands(&self) -> RenderResult<Vec<CommandBuffer>> {
        self.command_pool.allocate(self.swapchain.image_count() as u32)
    }
}

/// None waits forever
fn timeout_ns(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
}

impl FrameGpu for VulkanGpu {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type CommandBuffer = CommandBuffer;

    fn create_fence(&self, signaled: bool) -> RenderResult<Fence> {
        Fence::new(&self.device, signaled)
    }

    fn create_semaphore(&self) -> RenderResult<Semaphore> {
        Semaphore::new(&self.device)
    }

    fn acquire_next_image(&self, signal: &Fence, timeout: Option<Duration>) -> RenderResult<AcquireStatus> {
        match self.swapchain.acquire_next_image(timeout_ns(timeout), signal.handle()) {
            Ok((index, suboptimal)) => Ok(AcquireStatus::Acquired { index, suboptimal }),
            Err(vk::Result::NOT_READY | vk::Result::TIMEOUT) => Ok(AcquireStatus::NotReady),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RenderError::DeviceLost),
            Err(e) => Err(RenderError::Acquire(e)),
        }
    }

    fn wait_for_fence(&self, fence: &Fence, timeout: Option<Duration>) -> RenderResult<FenceWait> {
        let fences = [fence.handle()];
        match unsafe { self.device.device.wait_for_fences(&fences, true, timeout_ns(timeout)) } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceWait::TimedOut),
            Err(e) => Err(RenderError::vulkan("wait for fence", e)),
        }
    }

    fn reset_fence(&self, fence: &Fence) -> RenderResult<()> {
        unsafe { self.device.device.reset_fences(&[fence.handle()]) }
            .map_err(|e| RenderError::vulkan("reset fence", e))
    }

    fn submit(&self, commands: &CommandBuffer, signal: Option<&Semaphore>, fence: &Fence) -> RenderResult<()> {
        let command_buffers = [commands.handle()];
        let signal_semaphores: Vec<vk::Semaphore> = signal.map(Semaphore::handle).into_iter().collect();

        // No wait semaphores: the image was fence-acquired before this call
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], fence.handle())
        }
        .map_err(|e| RenderError::vulkan("queue submit", e))
    }

    fn present(&self, image_index: u32, wait: &Semaphore) -> RenderResult<()> {
        let wait_semaphores = [wait.handle()];
        let suboptimal = self
            .swapchain
            .present(self.device.graphics_queue, image_index, &wait_semaphores)
            .map_err(|e| RenderError::vulkan("queue present", e))?;

        if suboptimal {
            log::debug!("Swapchain suboptimal on present of image {}", image_index);
        }
        Ok(())
    }

    fn wait_idle(&self) -> RenderResult<()> {
        self.device
            .wait_idle()
            .map_err(|e| RenderError::vulkan("device wait idle", e))
    }
}

impl UploadGpu for VulkanGpu {
    type Buffer = VertexBuffer;

    fn create_host_buffer(&self, label: &str, size: u64) -> RenderResult<VertexBuffer> {
        VertexBuffer::new(&self.device, label, size)
    }

    fn write_mapped(&self, buffer: &mut VertexBuffer, bytes: &[u8]) -> RenderResult<()> {
        buffer.write(bytes)
    }

    fn flush_mapped(&self, buffer: &VertexBuffer) -> RenderResult<()> {
        buffer.flush()
    }

    fn record_host_write_barrier(&self) -> RenderResult<CommandBuffer> {
        commands::record_host_write_barrier(&self.command_pool)
    }
}
