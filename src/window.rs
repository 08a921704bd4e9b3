// Window and event pump
//
// The frame loop owns control flow, so winit runs in pump-events mode: each
// loop iteration drains pending events without blocking and reports whether
// the user asked to close the window (close button or Escape).

use crate::config::WindowConfig;
use crate::frame::PlatformEvents;
use anyhow::{Context, Result};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

/// Give up if the platform has not resumed after this many pumps
const MAX_STARTUP_PUMPS: u32 = 500;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(10);

struct WindowHandler {
    config: WindowConfig,
    window: Option<Window>,
    create_error: Option<winit::error::OsError>,
    close_requested: bool,
}

impl ApplicationHandler for WindowHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.create_error.is_some() {
            return;
        }

        // Fixed size: the swapchain is never recreated
        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if requests_close(event.physical_key, event.state) {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }
}

fn requests_close(key: PhysicalKey, state: ElementState) -> bool {
    state.is_pressed() && key == PhysicalKey::Code(KeyCode::Escape)
}

pub struct WinitPlatform {
    window: Window,
    handler: WindowHandler,
    event_loop: EventLoop<()>,
}

impl WinitPlatform {
    /// Open the window, pumping events until the platform lets us create it
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;
        let mut handler = WindowHandler {
            config: config.clone(),
            window: None,
            create_error: None,
            close_requested: false,
        };

        for _ in 0..MAX_STARTUP_PUMPS {
            let status = event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut handler);

            if let Some(e) = handler.create_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let Some(window) = handler.window.take() {
                log::info!("Window: {}x{} ({})", config.width, config.height, config.title);
                return Ok(Self {
                    window,
                    handler,
                    event_loop,
                });
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("Event loop exited with status {} before the window opened", code);
            }
        }

        anyhow::bail!("Window was not created after {} event pumps", MAX_STARTUP_PUMPS)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl PlatformEvents for WinitPlatform {
    fn poll_close_requested(&mut self) -> bool {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.handler);
        matches!(status, PumpStatus::Exit(_)) || self.handler.close_requested
    }
}
