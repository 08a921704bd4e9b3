// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Images are acquired with a fence (never a semaphore), so the CPU knows
// an image is ready before it submits work that draws into it.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

/// What the caller asks for; the surface decides what it actually gets
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub width: u32,
    pub height: u32,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(device: Arc<VulkanDevice>, settings: SwapchainSettings) -> Result<Self> {
        log::info!("Creating swapchain: {}x{}", settings.width, settings.height);

        let surface = device.surface;
        let surface_loader = &device.surface_loader;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(
                device.physical_device,
                surface,
            )
        }?;

        // Query supported formats
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(
                device.physical_device,
                surface,
            )
        }?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(
                device.physical_device,
                surface,
            )
        }?;

        let surface_format = choose_surface_format(&formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&present_modes, settings.present_mode);
        let extent = choose_extent(&surface_caps, settings.width, settings.height);
        let image_count = choose_image_count(&surface_caps, settings.image_count);

        log::info!("Present mode: {:?}", present_mode);
        log::debug!("Surface format: {:?}, requested {} images", surface_format, image_count);

        // Create swapchain
        let swapchain_loader = ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&create_info, None)
        }
        .context("Unable to create vulkan swapchain")?;

        // Get swapchain images
        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)
        }?;

        log::info!("Created swapchain with {} images", images.len());

        // Build the struct first so Drop cleans up if a view fails
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            device,
        };

        for &image in &this.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                this.device.device.create_image_view(&create_info, None)
            }
            .context("Failed to create image view")?;
            this.image_views.push(view);
        }

        Ok(this)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image; `fence` is signaled once the image is really ours
    pub fn acquire_next_image(
        &self,
        timeout_ns: u64,
        fence: vk::Fence,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                vk::Semaphore::null(),
                fence,
            )
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader.queue_present(queue, &present_info)
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Prefer B8G8R8A8_UNORM / SRGB_NONLINEAR, else whatever the surface lists first
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

// FIFO is always supported
fn choose_present_mode(available: &[vk::PresentModeKHR], wanted: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if available.contains(&wanted) {
        wanted
    } else {
        if wanted != vk::PresentModeKHR::FIFO {
            log::warn!("Present mode {:?} not supported, using FIFO", wanted);
        }
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// max_image_count == 0 means no upper limit
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}
