// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, blending. There is no
// depth buffer: the scene is a single flat triangle.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::{ShaderModule, VulkanDevice};
use crate::scene;

/// Single-subpass render pass that clears and stores one color attachment.
///
/// The attachment is expected in COLOR_ATTACHMENT_OPTIMAL when the pass
/// begins (the frame commands transition it) and ends in PRESENT_SRC_KHR.
pub struct RenderPass {
    handle: vk::RenderPass,
    device: Arc<VulkanDevice>,
}

impl RenderPass {
    pub fn new(device: &Arc<VulkanDevice>, format: vk::Format) -> Result<Self> {
        let color_attachment = color_attachment(format);

        // Reference to color attachment
        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        // Subpass dependency
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let handle = unsafe { device.device.create_render_pass(&render_pass_info, None) }
            .context("Failed to create render pass")?;

        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

/// The swapchain image as the render pass sees it
pub(super) fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_render_pass(self.handle, None) };
    }
}

/// One framebuffer per swapchain image view
pub struct Framebuffers {
    handles: Vec<vk::Framebuffer>,
    device: Arc<VulkanDevice>,
}

impl Framebuffers {
    pub fn new(
        device: &Arc<VulkanDevice>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut this = Self {
            handles: Vec::with_capacity(image_views.len()),
            device: Arc::clone(device),
        };

        for &image_view in image_views {
            let attachments = &[image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.handle())
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            this.handles.push(framebuffer);
        }

        Ok(this)
    }

    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.handles
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.handles {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl GraphicsPipeline {
    /// Create the triangle pipeline (fixed viewport, no culling, no depth)
    pub fn new(
        device: &Arc<VulkanDevice>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        vert_shader: &ShaderModule,
        frag_shader: &ShaderModule,
    ) -> Result<Self> {
        // Shader stages
        let entry_point = c"main";

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader.handle())
            .name(entry_point)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader.handle())
            .name(entry_point)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        // Vertex input: positions at binding 0, colors at binding 1
        let (bindings, attributes) = scene::vertex_input_layout();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        // Input assembly
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor
        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build();

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        // Rasterization
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        // Multisampling (disabled)
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        // Pipeline layout: no descriptors, no push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();

        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        // Create pipeline
        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0)
            .build();

        let created = unsafe {
            device.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        };

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.device.destroy_pipeline_layout(layout, None) };
                return Err(e).context("Failed to create graphics pipeline");
            }
        };

        Ok(Self {
            pipeline,
            layout,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
