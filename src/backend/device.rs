// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with window-system extensions and validation layers
// - Surface creation for the window
// - Physical device selection (prefer discrete GPU, must present to the surface)
// - Logical device + queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;
use winit::raw_window_handle_05::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::window::Window;

/// Device context: everything the renderer needs, created once and torn
/// down last. Every GPU object wrapper keeps an `Arc` back to it.
pub struct VulkanDevice {
    // Vulkan handles (destroyed explicitly in Drop, allocator first)
    pub allocator: Mutex<ManuallyDrop<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    pub entry: Entry,

    // Presentation target
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,

    // Queue handles (one family does graphics and present)
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create the device context for `window`
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `window` - Window to present to; must outlive the returned device
    pub fn new(app_name: &str, enable_validation: bool, window: &Window) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance with the extensions this window system needs
        let display_handle = window.raw_display_handle();
        let required_extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query required surface extensions")?;
        let instance = Self::create_instance(&entry, app_name, required_extensions, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Create surface
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window.raw_window_handle(), None)
        }
        .context("Unable to create vulkan surface")?;
        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

        // Step 5: Pick physical device (GPU) and a graphics+present queue family
        let (physical_device, graphics_queue_family) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 6: Create logical device
        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, graphics_queue_family)?;

        // Step 7: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!("Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy());
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));

        // Step 8: Create memory allocator
        let allocator = Self::create_allocator(&instance, physical_device, &device)?;

        Ok(Arc::new(Self {
            allocator: Mutex::new(ManuallyDrop::new(allocator)),
            device,
            physical_device,
            instance,
            entry,
            surface,
            surface_loader,
            graphics_queue,
            graphics_queue_family,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        required_extensions: &[*const std::ffi::c_char],
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("vk-triangle")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extensions = required_extensions.to_vec();
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Cannot create vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
        }
        .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            // Find a queue family that can both draw and present to our surface
            let queue_families = unsafe {
                instance.get_physical_device_queue_family_properties(device)
            };

            let family = queue_families
                .iter()
                .enumerate()
                .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32)
                .find(|&i| unsafe {
                    surface_loader
                        .get_physical_device_surface_support(device, i, surface)
                        .unwrap_or(false)
                });

            if let Some(family) = family {
                let score = device_type_score(props.device_type);
                if score > best_score {
                    best_score = score;
                    best_device = Some((device, family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("Can't find a suitable vulkan device"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe {
            instance.create_device(physical_device, &create_info, None)
        }
        .context("Failed to create vulkan device")?;

        let graphics_queue = unsafe {
            device.get_device_queue(graphics_queue_family, 0)
        };

        Ok((device, graphics_queue))
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Unable to create vulkan allocator")?;

        Ok(allocator)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }
}

/// Prefer discrete GPUs, then integrated, then anything else
fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order; the allocator frees its memory blocks
        // through the device, so it goes first.
        unsafe {
            ManuallyDrop::drop(self.allocator.get_mut());

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
