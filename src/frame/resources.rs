// Frame resource set - per swapchain image state
//
// Slot i always pairs swapchain image i with its command buffer, its
// render-complete semaphore and its reuse fence. The mapping is fixed here
// and never changes.

use super::gpu::FrameGpu;
use crate::error::{RenderError, RenderResult};

/// State owned by one swapchain image index
pub struct FrameSlot<G: FrameGpu> {
    /// Prerecorded commands that draw into image i
    pub commands: G::CommandBuffer,
    /// Signaled when the commands finish; presentation waits on it
    pub render_complete: G::Semaphore,
    /// Signaled iff `commands` is not executing on the GPU
    pub reusable: G::Fence,
}

pub struct FrameResources<G: FrameGpu> {
    slots: Vec<FrameSlot<G>>,
    /// Shared by every acquisition, one outstanding acquire at a time
    acquire_fence: G::Fence,
}

impl<G: FrameGpu> FrameResources<G> {
    /// Build one slot per command buffer. Slot fences start signaled so the
    /// first use of each slot does not block; the acquire fence starts unsignaled.
    pub fn new(gpu: &G, command_buffers: Vec<G::CommandBuffer>) -> RenderResult<Self> {
        if command_buffers.is_empty() {
            return Err(RenderError::NoFrameSlots);
        }

        let slots = command_buffers
            .into_iter()
            .map(|commands| {
                Ok(FrameSlot {
                    commands,
                    render_complete: gpu.create_semaphore()?,
                    reusable: gpu.create_fence(true)?,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let acquire_fence = gpu.create_fence(false)?;
        log::debug!("Created {} frame slots", slots.len());

        Ok(Self { slots, acquire_fence })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, image_index: u32) -> RenderResult<&FrameSlot<G>> {
        self.slots
            .get(image_index as usize)
            .ok_or(RenderError::ImageIndexOutOfRange {
                index: image_index,
                count: self.slots.len(),
            })
    }

    pub fn slots(&self) -> &[FrameSlot<G>] {
        &self.slots
    }

    pub fn acquire_fence(&self) -> &G::Fence {
        &self.acquire_fence
    }
}
