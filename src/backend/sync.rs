// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU (render -> present).
// Both destroy themselves when dropped.

use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

pub struct Fence {
    handle: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl Fence {
    pub fn new(device: &Arc<VulkanDevice>, signaled: bool) -> RenderResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);

        let handle = unsafe { device.device.create_fence(&fence_info, None) }
            .map_err(|e| RenderError::vulkan("create fence", e))?;

        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_fence(self.handle, None) };
    }
}

pub struct Semaphore {
    handle: vk::Semaphore,
    device: Arc<VulkanDevice>,
}

impl Semaphore {
    pub fn new(device: &Arc<VulkanDevice>) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let handle = unsafe { device.device.create_semaphore(&semaphore_info, None) }
            .map_err(|e| RenderError::vulkan("create semaphore", e))?;

        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_semaphore(self.handle, None) };
    }
}
