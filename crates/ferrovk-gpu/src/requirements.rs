//! Caller-side description of an acceptable device configuration.

use crate::capabilities::{DeviceFeatures, QueueCapabilities};
use ash::vk;
use std::ffi::CStr;

/// One queue role a caller needs, and where it was resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSetup {
    /// Capabilities the queue family must offer. Any overlap is enough.
    pub capabilities: QueueCapabilities,
    /// Number of queues needed from the family.
    pub required_count: u32,
    /// Number of queues the resolved family actually has.
    pub present_count: u32,
    /// Resolved queue family index. `None` until a ranking pass selects this
    /// setup's descriptor.
    pub cached_index: Option<u32>,
}

impl QueueSetup {
    /// Request `required_count` queues from a family offering `capabilities`.
    ///
    /// # Panics
    /// If `required_count` is zero.
    pub const fn new(capabilities: QueueCapabilities, required_count: u32) -> Self {
        assert!(required_count > 0, "a queue setup must request at least one queue");
        Self {
            capabilities,
            required_count,
            present_count: 0,
            cached_index: None,
        }
    }

    /// Whether a family has been assigned.
    pub const fn is_resolved(&self) -> bool {
        self.cached_index.is_some()
    }
}

/// One device configuration the caller is willing to accept.
///
/// The result fields (`physical_device`, `first_supported_surface_format`
/// and each queue setup's `cached_index`/`present_count`) are only written
/// for the descriptor that wins a ranking pass, and must not be read before.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    /// Lowest acceptable adapter API version (`vk::make_api_version`).
    pub api_version_minimum: u32,
    /// Required features; unset fields are "don't care".
    pub features: DeviceFeatures,
    /// Required device extensions, matched by exact name.
    pub extensions: Vec<&'static CStr>,
    /// Requested queue roles, in priority order.
    pub queue_setups: Vec<QueueSetup>,
    /// Acceptable surface formats, most preferred first.
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub rank_baseline: i32,
    /// Adds 10 to the rank on discrete GPUs.
    pub prefer_discrete: bool,
    /// Adds 10 to the rank on integrated GPUs.
    pub prefer_integrated: bool,

    // Results
    pub physical_device: vk::PhysicalDevice,
    /// Index into `surface_formats` of the first format the adapter supports.
    pub first_supported_surface_format: Option<usize>,
}

impl Default for CapabilityDescriptor {
    fn default() -> Self {
        Self {
            api_version_minimum: vk::API_VERSION_1_0,
            features: DeviceFeatures::default(),
            extensions: Vec::new(),
            queue_setups: Vec::new(),
            surface_formats: Vec::new(),
            rank_baseline: 0,
            prefer_discrete: false,
            prefer_integrated: false,
            physical_device: vk::PhysicalDevice::null(),
            first_supported_surface_format: None,
        }
    }
}

impl CapabilityDescriptor {
    /// Create an empty descriptor that any adapter satisfies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum adapter API version.
    pub fn api_version_minimum(mut self, version: u32) -> Self {
        self.api_version_minimum = version;
        self
    }

    /// Replace the required feature set.
    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Require a device extension.
    pub fn require_extension(mut self, name: &'static CStr) -> Self {
        self.extensions.push(name);
        self
    }

    /// Request a queue role.
    pub fn queue(mut self, capabilities: QueueCapabilities, count: u32) -> Self {
        self.queue_setups.push(QueueSetup::new(capabilities, count));
        self
    }

    /// Accept a surface format. Earlier calls are preferred.
    pub fn surface_format(mut self, format: vk::Format, color_space: vk::ColorSpaceKHR) -> Self {
        self.surface_formats.push(
            vk::SurfaceFormatKHR::default()
                .format(format)
                .color_space(color_space),
        );
        self
    }

    /// Set the base rank.
    pub fn rank_baseline(mut self, rank: i32) -> Self {
        self.rank_baseline = rank;
        self
    }

    /// Prefer discrete GPUs.
    pub fn prefer_discrete(mut self, prefer: bool) -> Self {
        self.prefer_discrete = prefer;
        self
    }

    /// Prefer integrated GPUs.
    pub fn prefer_integrated(mut self, prefer: bool) -> Self {
        self.prefer_integrated = prefer;
        self
    }

    /// Whether every queue setup has a resolved family.
    pub fn is_resolved(&self) -> bool {
        self.queue_setups.iter().all(QueueSetup::is_resolved)
    }

    /// The surface format picked during ranking, if any.
    pub fn selected_surface_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.first_supported_surface_format
            .and_then(|index| self.surface_formats.get(index).copied())
    }

    /// Forget results from a previous ranking pass.
    pub fn clear_results(&mut self) {
        self.physical_device = vk::PhysicalDevice::null();
        self.first_supported_surface_format = None;
        for setup in &mut self.queue_setups {
            setup.cached_index = None;
            setup.present_count = 0;
        }
    }

    /// Index of the first queue setup offering any of `capabilities`.
    pub fn queue_setup_index(&self, capabilities: QueueCapabilities) -> Option<usize> {
        self.queue_setups
            .iter()
            .position(|setup| setup.capabilities.intersects(capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_requests_in_order() {
        let descriptor = CapabilityDescriptor::new()
            .queue(QueueCapabilities::GRAPHICS | QueueCapabilities::PRESENT, 1)
            .queue(QueueCapabilities::TRANSFER, 2)
            .require_extension(ash::khr::swapchain::NAME)
            .rank_baseline(3);

        assert_eq!(descriptor.queue_setups.len(), 2);
        assert_eq!(descriptor.queue_setups[1].required_count, 2);
        assert_eq!(descriptor.extensions, [ash::khr::swapchain::NAME]);
        assert_eq!(descriptor.queue_setup_index(QueueCapabilities::TRANSFER), Some(1));
        assert!(!descriptor.is_resolved());
    }

    #[test]
    #[should_panic(expected = "at least one queue")]
    fn zero_queue_request_is_refused() {
        let _ = CapabilityDescriptor::new().queue(QueueCapabilities::GRAPHICS, 0);
    }

    #[test]
    fn clear_results_unresolves_queues() {
        let mut descriptor = CapabilityDescriptor::new()
            .queue(QueueCapabilities::COMPUTE, 1)
            .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        descriptor.queue_setups[0].cached_index = Some(2);
        descriptor.first_supported_surface_format = Some(0);
        assert!(descriptor.is_resolved());
        assert_eq!(
            descriptor.selected_surface_format().map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );

        descriptor.clear_results();
        assert!(!descriptor.is_resolved());
        assert!(descriptor.selected_surface_format().is_none());
    }
}
