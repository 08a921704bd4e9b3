// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. build.rs compiles the GLSL
// sources with glslc; the resulting .spv files are read at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use super::VulkanDevice;

pub struct ShaderModule {
    handle: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    /// Read a SPIR-V file and create a shader module from it
    pub fn load(device: &Arc<VulkanDevice>, path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open shader {:?}", path))?;

        // read_spv checks the length and realigns the bytes into u32 words
        let code = ash::util::read_spv(&mut file)
            .with_context(|| format!("{:?} is not valid SPIR-V", path))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let handle = unsafe { device.device.create_shader_module(&create_info, None) }
            .with_context(|| format!("Failed to create shader module from {:?}", path))?;

        log::debug!("Loaded shader {:?} ({} words)", path, code.len());

        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.handle, None) };
    }
}
