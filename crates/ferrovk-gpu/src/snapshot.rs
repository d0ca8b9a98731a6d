//! Per-adapter capability snapshots.
//!
//! A snapshot holds what one adapter actually offers. The ranking engine
//! keeps a single [`AdapterSnapshot`] alive for a whole pass and clears it
//! between adapters, so the scratch buffers are reused and peak memory is one
//! adapter's worth of data.

use crate::capabilities::{DeviceFeatures, GpuVendor, QueueCapabilities, VkFeatureChain};
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::CString;

/// Arguments handed to a presentation-support predicate.
#[derive(Debug, Clone, Copy)]
pub struct PresentationQuery {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
}

/// Platform-specific answer to "can this queue family present?".
pub type PresentationSupport<'a> = dyn Fn(&PresentationQuery) -> bool + 'a;

/// Static adapter properties.
#[derive(Debug, Clone)]
pub struct AdapterProperties {
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub vendor: GpuVendor,
    pub api_version: u32,
}

impl Default for AdapterProperties {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            device_type: vk::PhysicalDeviceType::OTHER,
            vendor: GpuVendor::Other(0),
            api_version: 0,
        }
    }
}

/// Capabilities of one queue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySnapshot {
    pub capabilities: QueueCapabilities,
    pub queue_count: u32,
}

/// The graphics-API queries a ranking pass needs.
///
/// [`VulkanAdapters`] answers them from a live instance.
pub trait AdapterSource {
    /// Raw instance handle passed on to presentation predicates.
    fn instance_handle(&self) -> vk::Instance;

    /// Enumerate all adapters, in driver order.
    fn enumerate_adapters(&self) -> Result<Vec<vk::PhysicalDevice>>;

    fn properties(&self, adapter: vk::PhysicalDevice) -> AdapterProperties;

    /// Base features plus the 1.2 and 1.3 feature structs.
    fn features(&self, adapter: vk::PhysicalDevice, api_version: u32) -> DeviceFeatures;

    /// Append every device extension name to `out`.
    fn extensions(&self, adapter: vk::PhysicalDevice, out: &mut Vec<CString>) -> Result<()>;

    /// Append native queue family properties to `out`.
    fn queue_families(&self, adapter: vk::PhysicalDevice, out: &mut Vec<vk::QueueFamilyProperties>);

    /// Append the (format, color space) pairs `surface` supports to `out`.
    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        out: &mut Vec<vk::SurfaceFormatKHR>,
    ) -> Result<()>;
}

/// Everything one adapter offers, extracted fresh for one ranking iteration.
#[derive(Debug, Default)]
pub struct AdapterSnapshot {
    pub physical_device: vk::PhysicalDevice,
    pub properties: AdapterProperties,
    pub features: DeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: Vec<QueueFamilySnapshot>,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    raw_families: Vec<vk::QueueFamilyProperties>,
}

impl AdapterSnapshot {
    /// Fill the snapshot for `adapter`, reusing existing buffer capacity.
    ///
    /// Surface formats are only queried when `surface` is given.
    pub fn capture<S: AdapterSource + ?Sized>(
        &mut self,
        source: &S,
        adapter: vk::PhysicalDevice,
        presentation: &PresentationSupport<'_>,
        surface: Option<vk::SurfaceKHR>,
    ) -> Result<()> {
        self.clear();
        self.physical_device = adapter;
        self.properties = source.properties(adapter);
        self.features = source.features(adapter, self.properties.api_version);
        source.extensions(adapter, &mut self.extensions)?;

        source.queue_families(adapter, &mut self.raw_families);
        let instance = source.instance_handle();
        for (index, family) in (0u32..).zip(&self.raw_families) {
            let mut capabilities = QueueCapabilities::from_queue_flags(family.queue_flags);
            let query = PresentationQuery {
                instance,
                physical_device: adapter,
                queue_family_index: index,
            };
            if presentation(&query) {
                capabilities |= QueueCapabilities::PRESENT;
            }
            self.queue_families.push(QueueFamilySnapshot {
                capabilities,
                queue_count: family.queue_count,
            });
        }

        if let Some(surface) = surface {
            source.surface_formats(adapter, surface, &mut self.surface_formats)?;
        }
        Ok(())
    }

    /// Drop all captured data but keep the allocations.
    pub fn clear(&mut self) {
        self.physical_device = vk::PhysicalDevice::null();
        self.properties = AdapterProperties::default();
        self.features = DeviceFeatures::default();
        self.extensions.clear();
        self.queue_families.clear();
        self.surface_formats.clear();
        self.raw_families.clear();
    }

    /// Exact-name extension lookup.
    pub fn has_extension(&self, name: &std::ffi::CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    /// Exact (format, color space) lookup.
    pub fn supports_surface_format(&self, wanted: vk::SurfaceFormatKHR) -> bool {
        self.surface_formats
            .iter()
            .any(|f| f.format == wanted.format && f.color_space == wanted.color_space)
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} queue families, {} extensions",
            self.properties.device_name,
            self.properties.vendor,
            self.properties.device_type,
            vk::api_version_major(self.properties.api_version),
            vk::api_version_minor(self.properties.api_version),
            vk::api_version_patch(self.properties.api_version),
            self.queue_families.len(),
            self.extensions.len(),
        )
    }
}

/// [`AdapterSource`] backed by a live Vulkan instance.
pub struct VulkanAdapters<'a> {
    instance: &'a ash::Instance,
    surface_loader: Option<&'a ash::khr::surface::Instance>,
}

impl<'a> VulkanAdapters<'a> {
    /// Wrap an instance. Surface format queries need `surface_loader`.
    pub const fn new(
        instance: &'a ash::Instance,
        surface_loader: Option<&'a ash::khr::surface::Instance>,
    ) -> Self {
        Self {
            instance,
            surface_loader,
        }
    }
}

impl AdapterSource for VulkanAdapters<'_> {
    fn instance_handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    fn enumerate_adapters(&self) -> Result<Vec<vk::PhysicalDevice>> {
        // SAFETY: the wrapped instance outlives `self`.
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(GpuError::call("vkEnumeratePhysicalDevices"))
    }

    fn properties(&self, adapter: vk::PhysicalDevice) -> AdapterProperties {
        // SAFETY: `adapter` was enumerated from this instance.
        let properties = unsafe { self.instance.get_physical_device_properties(adapter) };
        AdapterProperties {
            device_name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: properties.device_type,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            api_version: properties.api_version,
        }
    }

    fn features(&self, adapter: vk::PhysicalDevice, api_version: u32) -> DeviceFeatures {
        let mut chain = VkFeatureChain::default();
        let core = {
            let mut features2 = vk::PhysicalDeviceFeatures2::default();
            // Only chain structs the adapter understands.
            if api_version >= vk::API_VERSION_1_2 {
                features2 = features2.push_next(&mut chain.vulkan12);
            }
            if api_version >= vk::API_VERSION_1_3 {
                features2 = features2.push_next(&mut chain.vulkan13);
            }
            // SAFETY: `adapter` was enumerated from this instance.
            unsafe {
                self.instance
                    .get_physical_device_features2(adapter, &mut features2);
            }
            features2.features
        };
        chain.core = core;
        chain.vulkan12.p_next = std::ptr::null_mut();
        chain.vulkan13.p_next = std::ptr::null_mut();
        DeviceFeatures::from_vk(chain)
    }

    fn extensions(&self, adapter: vk::PhysicalDevice, out: &mut Vec<CString>) -> Result<()> {
        // SAFETY: `adapter` was enumerated from this instance.
        let properties = unsafe { self.instance.enumerate_device_extension_properties(adapter) }
            .map_err(GpuError::call("vkEnumerateDeviceExtensionProperties"))?;
        out.extend(
            properties
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok())
                .map(CString::from),
        );
        Ok(())
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice, out: &mut Vec<vk::QueueFamilyProperties>) {
        // SAFETY: `adapter` was enumerated from this instance.
        let families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(adapter)
        };
        out.extend(families);
    }

    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        out: &mut Vec<vk::SurfaceFormatKHR>,
    ) -> Result<()> {
        let loader = self.surface_loader.ok_or_else(|| {
            GpuError::InvalidState("surface formats queried without a surface loader".into())
        })?;
        // SAFETY: `adapter` and `surface` belong to this instance.
        let formats = unsafe { loader.get_physical_device_surface_formats(adapter, surface) }
            .map_err(GpuError::call("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        out.extend(formats);
        Ok(())
    }
}

/// A predicate that never reports presentation support.
pub fn no_presentation(_: &PresentationQuery) -> bool {
    false
}
