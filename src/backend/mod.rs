// Backend module - Vulkan abstraction layer
//
// Design: Thin RAII wrappers around ash. Every object holds an Arc to the
// device so the device context is always destroyed last.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod gpu;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::VertexBuffer;
pub use commands::{CommandBuffer, CommandPool, FrameCommands};
pub use device::VulkanDevice;
pub use gpu::VulkanGpu;
pub use pipeline::{Framebuffers, GraphicsPipeline, RenderPass};
pub use shader::ShaderModule;
pub use swapchain::{Swapchain, SwapchainSettings};
pub use sync::{Fence, Semaphore};
