//! GPU context management.
//!
//! [`GpuContextBuilder`] runs the whole negotiation: instance, optional
//! surface, adapter ranking against the caller's capability descriptors, and
//! logical device creation. [`GpuContext`] owns the result and tears it down
//! in reverse order.

use crate::capabilities::QueueCapabilities;
use crate::device::{create_logical_device, LogicalDevice};
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, DebugMessenger, InstanceConfig};
use crate::requirements::CapabilityDescriptor;
use crate::selection::{select_physical_device, Selection};
use crate::snapshot::{no_presentation, PresentationQuery, VulkanAdapters};
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Instance-level objects, destroyed in reverse creation order on drop.
struct InstanceParts {
    entry: ash::Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
    surface: Option<SurfaceContext>,
}

impl Drop for InstanceParts {
    fn drop(&mut self) {
        unsafe {
            if let Some(surface) = &self.surface {
                surface.destroy();
            }
            if let Some(messenger) = &self.messenger {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    device: LogicalDevice,
    descriptors: Vec<CapabilityDescriptor>,
    selection: Selection,
    parts: InstanceParts,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub const fn device(&self) -> &ash::Device {
        &self.device.device
    }

    /// Get the logical device with its queue groups.
    pub const fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.device.physical_device
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.parts.instance
    }

    /// The window surface, if the context was built with one.
    pub const fn surface(&self) -> Option<&SurfaceContext> {
        self.parts.surface.as_ref()
    }

    /// Outcome of the ranking pass.
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The descriptor that won the ranking pass, with its results filled in.
    pub fn selected_descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptors[self.selection.descriptor_index]
    }

    /// All descriptors the context was ranked with.
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// First queue (and its family) of a group offering any of
    /// `capabilities`.
    pub fn queue(&self, capabilities: QueueCapabilities) -> Option<(u32, vk::Queue)> {
        self.device.queue(capabilities)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device.device_wait_idle() }
            .map_err(GpuError::call("vkDeviceWaitIdle"))
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.device.destroy();
        }
        // `parts` drops after this, destroying surface, messenger and instance.
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    instance: InstanceConfig,
    descriptors: Vec<CapabilityDescriptor>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            descriptors: Vec::new(),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.instance = self.instance.app_name(name);
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.instance = self.instance.validation(enable);
        self
    }

    /// Log required and available instance extensions at debug level.
    pub fn log_extensions(mut self, log: bool) -> Self {
        self.instance = self.instance.log_extensions(log);
        self
    }

    /// Replace the instance configuration.
    pub fn instance_config(mut self, config: InstanceConfig) -> Self {
        self.instance = config;
        self
    }

    /// Add a capability descriptor. Descriptors are tried in insertion order.
    pub fn descriptor(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Add several capability descriptors.
    pub fn descriptors(mut self, descriptors: impl IntoIterator<Item = CapabilityDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Build a headless context. Nothing can present.
    pub fn build(self) -> Result<GpuContext> {
        let parts = unsafe { self.create_parts() }?;
        self.finish(parts)
    }

    /// Build a context that can present to `window`.
    ///
    /// # Safety
    /// The window must outlive the returned context.
    pub unsafe fn build_with_window<W>(mut self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        self.instance = self.instance.with_surface_extensions();
        let mut parts = unsafe { self.create_parts() }?;
        // On failure `parts` drops and releases the instance.
        parts.surface =
            Some(unsafe { SurfaceContext::from_window(&parts.entry, &parts.instance, window) }?);
        self.finish(parts)
    }

    unsafe fn create_parts(&self) -> Result<InstanceParts> {
        let entry = unsafe { ash::Entry::load() }?;
        let (instance, messenger) = unsafe { create_instance(&entry, &self.instance) }?;
        Ok(InstanceParts {
            entry,
            instance,
            messenger,
            surface: None,
        })
    }

    fn finish(self, parts: InstanceParts) -> Result<GpuContext> {
        let mut descriptors = if self.descriptors.is_empty() {
            vec![default_descriptor(parts.surface.is_some())]
        } else {
            self.descriptors
        };

        let selection = {
            let surface = parts.surface.as_ref();
            let source = VulkanAdapters::new(&parts.instance, surface.map(|s| &s.surface_loader));
            let surface_present = |query: &PresentationQuery| {
                surface.is_some_and(|s| s.supports_presentation(query))
            };
            let presentation: &dyn Fn(&PresentationQuery) -> bool = if surface.is_some() {
                &surface_present
            } else {
                &no_presentation
            };
            select_physical_device(
                &source,
                &mut descriptors,
                presentation,
                surface.map(|s| s.surface),
            )?
        };
        let Some(selection) = selection else {
            return Err(GpuError::NoSuitableDevice);
        };

        let device = unsafe {
            create_logical_device(&parts.instance, &descriptors[selection.descriptor_index])
        }?;

        Ok(GpuContext {
            device,
            descriptors,
            selection,
            parts,
        })
    }
}

/// Descriptor used when the caller supplies none: one graphics+compute
/// queue, plus presentation and the swapchain extension when windowed.
///
/// The windowed setup asks for `GRAPHICS | PRESENT` as one queue, and queue
/// matching accepts any overlap. On an adapter whose first graphics family
/// cannot present, that family is still chosen. Check the resolved family
/// with [`SurfaceContext::supports_presentation`] before building a
/// swapchain on it, or pass descriptors with a separate `PRESENT` setup.
pub fn default_descriptor(windowed: bool) -> CapabilityDescriptor {
    let descriptor = CapabilityDescriptor::new()
        .api_version_minimum(vk::API_VERSION_1_2)
        .prefer_discrete(true);
    if windowed {
        descriptor
            .queue(QueueCapabilities::GRAPHICS | QueueCapabilities::PRESENT, 1)
            .require_extension(ash::khr::swapchain::NAME)
            .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)
    } else {
        descriptor.queue(QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE, 1)
    }
}
