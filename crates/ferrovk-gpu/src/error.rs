//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A specific Vulkan entry point returned a failure code.
    #[error("{call} failed: {result}")]
    VulkanCall {
        /// Name of the failing entry point.
        call: &'static str,
        /// Result code returned by the driver.
        result: vk::Result,
    },

    /// The Vulkan loader could not be loaded.
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No adapter satisfied any of the supplied capability descriptors.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Required layer not supported.
    #[error("Required layer not supported: {0}")]
    LayerNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Tag a raw result code with the entry point that produced it.
    pub fn call(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::VulkanCall { call, result }
    }

    /// The driver result code carried by this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::VulkanCall { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
