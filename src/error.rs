// Error kinds for the frame core
//
// Setup code in the backend reports through anyhow context chains. Anything
// the frame loop or upload stage can hit is a `RenderError`, so the caller
// can tell a fatal API failure from a hung GPU and pick an exit status.

use ash::vk;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A Vulkan call returned an error code
    #[error("{what} failed: {result}")]
    Vulkan { what: &'static str, result: vk::Result },

    #[error("GPU memory allocation for {label} failed: {reason}")]
    Allocation { label: String, reason: String },

    /// Allocation landed in memory the host cannot map
    #[error("{label} is not host visible")]
    NotMapped { label: String },

    #[error("{label} has no data to upload")]
    EmptyUpload { label: String },

    /// True error status from image acquisition in the steady-state loop
    #[error("swapchain image acquisition failed: {0}")]
    Acquire(vk::Result),

    /// A bounded fence wait expired
    #[error("GPU did not signal {what} within {timeout:?}")]
    Hung { what: &'static str, timeout: Duration },

    #[error("device lost")]
    DeviceLost,

    #[error("image index {index} has no frame slot ({count} slots)")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("no frame slots were created")]
    NoFrameSlots,
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Wrap a failed call, folding device loss into its own kind
    pub fn vulkan(what: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            result => Self::Vulkan { what, result },
        }
    }

    /// Process exit status: the API error code when there is one, else 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Vulkan { result, .. } | Self::Acquire(result) => result.as_raw(),
            Self::DeviceLost => vk::Result::ERROR_DEVICE_LOST.as_raw(),
            _ => 1,
        }
    }
}

/// Find the exit status for a setup or runtime failure.
///
/// Walks the context chain and uses the first error that carries an API code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(render) = cause.downcast_ref::<RenderError>() {
            return render.exit_code();
        }
        if let Some(result) = cause.downcast_ref::<vk::Result>() {
            return result.as_raw();
        }
    }
    1
}
