// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use crate::frame::LoopSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub sync: SyncConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkaTest2".to_string(),
            width: 900,
            height: 900,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Requested swapchain length; one frame slot is created per image
    pub swapchain_images: u32,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            swapchain_images: 3,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Frame loop synchronization. Absent timeouts mean "wait forever".
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub acquire_timeout_ms: Option<u64>,
    pub fence_timeout_ms: Option<u64>,
    pub present: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: None,
            fence_timeout_ms: None,
            present: true,
        }
    }
}

/// Compiled SPIR-V locations (built from shaders/*.vert|frag by build.rs)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/shader.vert.spv"),
            fragment: PathBuf::from("shaders/shader.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Reject combinations the frame loop cannot run with
    pub fn validate(&self) -> Result<()> {
        // Without presentation no image is ever handed back, so once every
        // image is held an unbounded acquire could never return.
        anyhow::ensure!(
            self.sync.present || self.sync.acquire_timeout_ms.is_some(),
            "sync.present = false requires sync.acquire_timeout_ms"
        );
        Ok(())
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Validation layers only in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn fence_timeout(&self) -> Option<Duration> {
        self.sync.fence_timeout_ms.map(Duration::from_millis)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            acquire_timeout: self.sync.acquire_timeout_ms.map(Duration::from_millis),
            fence_timeout: self.fence_timeout(),
            present: self.sync.present,
        }
    }
}
