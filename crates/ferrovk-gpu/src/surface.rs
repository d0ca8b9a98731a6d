//! Surface management for windowed rendering.
//!
//! Turns a caller's window handle into a `VkSurfaceKHR` and answers
//! presentation queries against it. Creating the window is up to the caller.

use crate::error::{GpuError, Result};
use crate::snapshot::PresentationQuery;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A surface and its extension loader.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The instance must have been created with the platform's surface
    /// extensions, and the window must outlive the surface.
    pub unsafe fn from_window<W>(
        entry: &ash::Entry,
        instance: &ash::Instance,
        window: &W,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Whether a queue family can present to this surface. Query failures
    /// count as "cannot present".
    pub fn supports_presentation(&self, query: &PresentationQuery) -> bool {
        // SAFETY: the query comes from adapters of the instance this surface
        // was created on.
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                query.physical_device,
                query.queue_family_index,
                self.surface,
            )
        }
        .unwrap_or_else(|err| {
            tracing::debug!(
                "Surface support query failed for family {}: {err}",
                query.queue_family_index
            );
            false
        })
    }

    /// Query surface capabilities for an adapter.
    ///
    /// # Safety
    /// The adapter must belong to the surface's instance.
    pub unsafe fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SurfaceCapabilities> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .map_err(GpuError::call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;

        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .map_err(GpuError::call("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;

        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .map_err(GpuError::call("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

        Ok(SurfaceCapabilities {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain may still use the surface.
    pub unsafe fn destroy(&self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
