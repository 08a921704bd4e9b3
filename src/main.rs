// =============================================================================
// VULKAN TRIANGLE - minimal synchronized frame loop
// =============================================================================
//
// Draws one colored triangle into every swapchain image, using command
// buffers recorded once up front and resubmitted each frame.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  WinitPlatform (window, pumped event loop)                      │
// │    └── VulkanDevice (instance, surface, device, allocator)      │
// │          └── VulkanGpu (swapchain, command pool)                │
// │                └── FrameResources (per-image commands + sync)   │
// │                      └── FrameLoop (acquire/wait/submit/present)│
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Poll window events; stop on close or Escape
// 2. Acquire swapchain image i, signaling the acquire fence
// 3. Wait for + reset the acquire fence and slot i's fence
// 4. Submit slot i's prerecorded commands
// 5. Present image i once its render-complete semaphore is signaled
// 6. On exit: wait for device idle, then release everything
//
// =============================================================================

mod backend;
mod config;
mod error;
mod frame;
mod scene;
mod window;

use anyhow::{Context, Result};
use backend::{
    FrameCommands, Framebuffers, GraphicsPipeline, RenderPass, ShaderModule, Swapchain,
    SwapchainSettings, VulkanDevice, VulkanGpu,
};
use config::Config;
use frame::{upload, FrameLoop, FrameResources, FrameStats};
use std::fs::OpenOptions;
use std::io::Write;
use window::WinitPlatform;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting Vulkan triangle");
    log::info!("Present mode: {}", config.graphics.present_mode);

    // Every resource is released inside run(); only then may we exit
    match run(&config) {
        Ok(stats) => {
            log::info!("Exiting cleanly after {} frames", stats.submitted);
        }
        Err(e) => {
            log::error!("Fatal: {:#}", e);
            // Always reaches the terminal, whatever the log filter or target
            let _ = report_fatal(&e, &mut std::io::stderr());
            std::process::exit(error::exit_code(&e));
        }
    }
}

/// Human-readable failure report: the whole context chain plus the exit status
fn report_fatal(err: &anyhow::Error, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Fatal: {:#}", err)?;
    writeln!(out, "Exiting with status {}", error::exit_code(err))
}

/// Initialize logging, optionally piping everything into the log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Vulkan Triangle Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", config.debug.log_file, e);
            }
        }
    }

    builder.init();
}

// =============================================================================
// SETUP + FRAME LOOP
// =============================================================================

/// Build every GPU object, run the frame loop until close, tear down.
///
/// IMPORTANT: local declaration order is destruction order, reversed.
/// Frame resources go first, the device next to last, the window last.
fn run(config: &Config) -> Result<FrameStats> {
    // ─────────────────────────────────────────────────────────────────────────
    // Window + device
    // ─────────────────────────────────────────────────────────────────────────
    let mut platform = WinitPlatform::new(&config.window)?;
    let device = VulkanDevice::new(&config.window.title, config.validation_enabled(), platform.window())?;

    let swapchain = Swapchain::new(
        device.clone(),
        SwapchainSettings {
            width: config.window.width,
            height: config.window.height,
            present_mode: config.present_mode(),
            image_count: config.graphics.swapchain_images,
        },
    )?;
    let extent = swapchain.extent;
    let gpu = VulkanGpu::new(device.clone(), swapchain)?;

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────────
    let vert_shader = ShaderModule::load(&device, &config.shaders.vertex)?;
    let frag_shader = ShaderModule::load(&device, &config.shaders.fragment)?;
    let render_pass = RenderPass::new(&device, gpu.swapchain.format)?;
    let framebuffers = Framebuffers::new(&device, &render_pass, &gpu.swapchain.image_views, extent)?;
    let pipeline = GraphicsPipeline::new(&device, &render_pass, extent, &vert_shader, &frag_shader)?;

    // ─────────────────────────────────────────────────────────────────────────
    // Vertex upload (blocks until visible to vertex input)
    // ─────────────────────────────────────────────────────────────────────────
    let vertex_buffers = upload::upload_vertex_attributes(
        &gpu,
        &scene::vertex_attributes(),
        config.fence_timeout(),
    )
    .context("Vertex upload failed")?;

    // ─────────────────────────────────────────────────────────────────────────
    // Prerecord one command buffer per swapchain image
    // ─────────────────────────────────────────────────────────────────────────
    let command_buffers = gpu.allocate_frame_commands()?;
    let buffer_handles: Vec<_> = vertex_buffers.iter().map(|b| b.handle()).collect();
    FrameCommands {
        render_pass: &render_pass,
        pipeline: &pipeline,
        framebuffers: &framebuffers,
        images: &gpu.swapchain.images,
        extent,
        clear_color: config.graphics.clear_color,
        vertex_buffers: &buffer_handles,
    }
    .record(&command_buffers)?;

    // ─────────────────────────────────────────────────────────────────────────
    // Run
    // ─────────────────────────────────────────────────────────────────────────
    let frames = FrameResources::new(&gpu, command_buffers)?;
    log::info!("Rendering with {} frame slots", frames.len());

    let stats = FrameLoop::new(&gpu, &frames, config.loop_settings()).run(&mut platform)?;

    log::info!("Cleaning up Vulkan resources...");
    Ok(stats)
}
