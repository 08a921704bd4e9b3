// Command pool, command buffers and frame command recording
//
// Frame command buffers are recorded once, one per swapchain image, and
// resubmitted every frame. They are begun without ONE_TIME_SUBMIT so that
// resubmission stays valid; the per-slot fence keeps a buffer from being
// submitted again while it is still executing.

use ash::vk;
use std::sync::Arc;
use super::{Framebuffers, GraphicsPipeline, RenderPass, VulkanDevice};
use crate::error::{RenderError, RenderResult};
use crate::scene;

pub struct CommandPool {
    handle: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    pub fn new(device: &Arc<VulkanDevice>) -> RenderResult<Arc<Self>> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family);

        let handle = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(|e| RenderError::vulkan("create command pool", e))?;

        Ok(Arc::new(Self {
            handle,
            device: Arc::clone(device),
        }))
    }

    /// Allocate `count` primary command buffers
    pub fn allocate(self: &Arc<Self>, count: u32) -> RenderResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let handles = unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| RenderError::vulkan("allocate command buffers", e))?;

        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                handle,
                pool: Arc::clone(self),
            })
            .collect())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_command_pool(self.handle, None) };
    }
}

pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    pool: Arc<CommandPool>,
}

impl CommandBuffer {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device
                .device
                .free_command_buffers(self.pool.handle, &[self.handle]);
        }
    }
}

/// A barrier together with the stages it sits between
pub(super) struct StagedBarrier<B> {
    pub barrier: B,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Move a freshly acquired swapchain image into the layout the render pass
/// starts from. Old contents are discarded; the render pass clears anyway.
pub(super) fn frame_image_barrier(image: vk::Image) -> StagedBarrier<vk::ImageMemoryBarrier> {
    // Which parts of the image to affect (all of it)
    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range)
        .build();

    StagedBarrier {
        barrier,
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    }
}

/// Flushed host writes become visible to vertex attribute fetches
pub(super) fn host_write_barrier() -> StagedBarrier<vk::MemoryBarrier> {
    let barrier = vk::MemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::HOST_WRITE)
        .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ)
        .build();

    StagedBarrier {
        barrier,
        src_stage: vk::PipelineStageFlags::HOST,
        dst_stage: vk::PipelineStageFlags::VERTEX_INPUT,
    }
}

/// Everything a frame command buffer draws with
pub struct FrameCommands<'a> {
    pub render_pass: &'a RenderPass,
    pub pipeline: &'a GraphicsPipeline,
    pub framebuffers: &'a Framebuffers,
    pub images: &'a [vk::Image],
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    /// Bound at bindings 0.. in order (positions, colors)
    pub vertex_buffers: &'a [vk::Buffer],
}

impl FrameCommands<'_> {
    /// Record one command buffer per swapchain image.
    ///
    /// Each one transitions its image to COLOR_ATTACHMENT_OPTIMAL, clears
    /// it and draws the triangle. The render pass leaves the image in
    /// PRESENT_SRC_KHR.
    pub fn record(&self, commands: &[CommandBuffer]) -> RenderResult<()> {
        let Some(first) = commands.first() else {
            return Ok(());
        };
        let device = &first.pool.device.device;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let offsets = vec![0; self.vertex_buffers.len()];

        for ((cmd, &image), &framebuffer) in commands
            .iter()
            .zip(self.images)
            .zip(self.framebuffers.handles())
        {
            let cmd = cmd.handle();

            unsafe {
                // ─────────────────────────────────────────────────────────
                // Begin recording (resubmittable)
                // ─────────────────────────────────────────────────────────
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::empty());
                device
                    .begin_command_buffer(cmd, &begin_info)
                    .map_err(|e| RenderError::vulkan("begin frame commands", e))?;

                // ─────────────────────────────────────────────────────────
                // IMAGE LAYOUT TRANSITION: UNDEFINED -> COLOR_ATTACHMENT
                // ─────────────────────────────────────────────────────────
                let to_color = frame_image_barrier(image);
                device.cmd_pipeline_barrier(
                    cmd,
                    to_color.src_stage,
                    to_color.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_color.barrier],
                );

                // ─────────────────────────────────────────────────────────
                // Clear + draw
                // ─────────────────────────────────────────────────────────
                let render_pass_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(self.render_pass.handle())
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: self.extent,
                    })
                    .clear_values(&clear_values);

                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
                device.cmd_bind_vertex_buffers(cmd, 0, self.vertex_buffers, &offsets);
                device.cmd_draw(cmd, scene::VERTEX_COUNT, 1, 0, 0);
                device.cmd_end_render_pass(cmd);

                // ─────────────────────────────────────────────────────────
                // End recording
                // ─────────────────────────────────────────────────────────
                device
                    .end_command_buffer(cmd)
                    .map_err(|e| RenderError::vulkan("end frame commands", e))?;
            }
        }

        log::info!("Recorded {} frame command buffers", commands.len());
        Ok(())
    }
}

/// One-shot command buffer that makes flushed host writes visible to
/// vertex attribute fetches
pub fn record_host_write_barrier(pool: &Arc<CommandPool>) -> RenderResult<CommandBuffer> {
    let mut buffers = pool.allocate(1)?;
    let Some(cmd) = buffers.pop() else {
        return Err(RenderError::vulkan(
            "allocate upload commands",
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        ));
    };
    let device = &pool.device.device;

    let host_write = host_write_barrier();

    unsafe {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(cmd.handle(), &begin_info)
            .map_err(|e| RenderError::vulkan("begin upload commands", e))?;

        device.cmd_pipeline_barrier(
            cmd.handle(),
            host_write.src_stage,
            host_write.dst_stage,
            vk::DependencyFlags::empty(),
            &[host_write.barrier],
            &[],
            &[],
        );

        device
            .end_command_buffer(cmd.handle())
            .map_err(|e| RenderError::vulkan("end upload commands", e))?;
    }

    Ok(cmd)
}
