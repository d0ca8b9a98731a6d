//! In-memory stand-ins for the Vulkan queries used in unit tests.

use crate::capabilities::{DeviceFeatures, GpuVendor};
use crate::descriptors::DescriptorPoolBackend;
use crate::error::{GpuError, Result};
use crate::snapshot::{AdapterProperties, AdapterSource};
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, CString};

/// One fake adapter.
#[derive(Debug, Clone)]
pub struct FakeAdapter {
    pub properties: AdapterProperties,
    pub features: DeviceFeatures,
    pub extensions: Vec<CString>,
    pub families: Vec<vk::QueueFamilyProperties>,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
}

impl FakeAdapter {
    pub fn new(name: &str, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            properties: AdapterProperties {
                device_name: name.to_owned(),
                device_type,
                vendor: GpuVendor::Other(0),
                api_version: vk::API_VERSION_1_3,
            },
            features: DeviceFeatures::default(),
            extensions: Vec::new(),
            families: Vec::new(),
            surface_formats: Vec::new(),
        }
    }

    pub fn discrete(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::DISCRETE_GPU)
    }

    pub fn integrated(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::INTEGRATED_GPU)
    }

    pub fn family(mut self, flags: vk::QueueFlags, queue_count: u32) -> Self {
        self.families.push(
            vk::QueueFamilyProperties::default()
                .queue_flags(flags)
                .queue_count(queue_count),
        );
        self
    }

    pub fn extension(mut self, name: &CStr) -> Self {
        self.extensions.push(name.to_owned());
        self
    }

    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn api_version(mut self, version: u32) -> Self {
        self.properties.api_version = version;
        self
    }

    pub fn surface_format(mut self, format: vk::Format, color_space: vk::ColorSpaceKHR) -> Self {
        self.surface_formats.push(
            vk::SurfaceFormatKHR::default()
                .format(format)
                .color_space(color_space),
        );
        self
    }
}

/// Adapter list with handles `1..=n` in list order.
pub struct FakeAdapters {
    adapters: Vec<FakeAdapter>,
    pub enumerations: Cell<usize>,
}

impl FakeAdapters {
    pub fn new(adapters: Vec<FakeAdapter>) -> Self {
        Self {
            adapters,
            enumerations: Cell::new(0),
        }
    }

    pub fn handle(index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(index as u64 + 1)
    }

    pub fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5eaf)
    }

    fn get(&self, adapter: vk::PhysicalDevice) -> &FakeAdapter {
        &self.adapters[adapter.as_raw() as usize - 1]
    }
}

impl AdapterSource for FakeAdapters {
    fn instance_handle(&self) -> vk::Instance {
        vk::Instance::from_raw(0x1a5)
    }

    fn enumerate_adapters(&self) -> Result<Vec<vk::PhysicalDevice>> {
        self.enumerations.set(self.enumerations.get() + 1);
        Ok((0..self.adapters.len()).map(Self::handle).collect())
    }

    fn properties(&self, adapter: vk::PhysicalDevice) -> AdapterProperties {
        self.get(adapter).properties.clone()
    }

    fn features(&self, adapter: vk::PhysicalDevice, _api_version: u32) -> DeviceFeatures {
        self.get(adapter).features
    }

    fn extensions(&self, adapter: vk::PhysicalDevice, out: &mut Vec<CString>) -> Result<()> {
        out.extend(self.get(adapter).extensions.iter().cloned());
        Ok(())
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice, out: &mut Vec<vk::QueueFamilyProperties>) {
        out.extend_from_slice(&self.get(adapter).families);
    }

    fn surface_formats(
        &self,
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        out: &mut Vec<vk::SurfaceFormatKHR>,
    ) -> Result<()> {
        assert_eq!(surface, Self::surface());
        out.extend_from_slice(&self.get(adapter).surface_formats);
        Ok(())
    }
}

#[derive(Debug)]
struct FakePool {
    max_sets: u32,
    allocated: u32,
    alive: bool,
}

/// Descriptor pool backend that hands out sets until a pool's `max_sets`
/// budget is used up, then reports `ERROR_OUT_OF_POOL_MEMORY`.
#[derive(Default)]
pub struct FakePoolDevice {
    pools: RefCell<HashMap<u64, FakePool>>,
    next_handle: Cell<u64>,
    pub created: Cell<usize>,
    pub destroyed: Cell<usize>,
    pub resets: Cell<usize>,
    pub allocation_attempts: Cell<usize>,
    pub last_pool_sizes: RefCell<Vec<vk::DescriptorPoolSize>>,
    /// Results returned instead of allocating, consumed front to back.
    pub injected: RefCell<Vec<vk::Result>>,
}

impl FakePoolDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, results: &[vk::Result]) {
        self.injected.borrow_mut().extend_from_slice(results);
    }

    pub fn live_pools(&self) -> usize {
        self.pools.borrow().values().filter(|p| p.alive).count()
    }

    pub fn allocated_in(&self, pool: vk::DescriptorPool) -> u32 {
        self.pools.borrow()[&pool.as_raw()].allocated
    }
}

impl DescriptorPoolBackend for FakePoolDevice {
    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let _ = flags;
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        self.created.set(self.created.get() + 1);
        *self.last_pool_sizes.borrow_mut() = pool_sizes.to_vec();
        self.pools.borrow_mut().insert(
            raw,
            FakePool {
                max_sets,
                allocated: 0,
                alive: true,
            },
        );
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
        let mut pools = self.pools.borrow_mut();
        let record = pools
            .get_mut(&pool.as_raw())
            .ok_or_else(|| GpuError::InvalidState("reset of unknown pool".into()))?;
        assert!(record.alive, "reset of destroyed pool");
        record.allocated = 0;
        self.resets.set(self.resets.get() + 1);
        Ok(())
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut pools = self.pools.borrow_mut();
        let record = pools.get_mut(&pool.as_raw()).expect("unknown pool");
        assert!(record.alive, "pool destroyed twice");
        record.alive = false;
        self.destroyed.set(self.destroyed.get() + 1);
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let _ = layout;
        self.allocation_attempts
            .set(self.allocation_attempts.get() + 1);
        {
            let mut injected = self.injected.borrow_mut();
            if !injected.is_empty() {
                return Err(injected.remove(0));
            }
        }
        let mut pools = self.pools.borrow_mut();
        let record = pools.get_mut(&pool.as_raw()).expect("unknown pool");
        assert!(record.alive, "allocation from destroyed pool");
        if record.allocated >= record.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        record.allocated += 1;
        Ok(vk::DescriptorSet::from_raw(
            (pool.as_raw() << 32) | u64::from(record.allocated),
        ))
    }
}
