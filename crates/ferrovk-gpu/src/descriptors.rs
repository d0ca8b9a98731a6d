//! Descriptor set management.
//!
//! [`DescriptorAllocator`] hands out short-lived descriptor sets from a
//! growing set of pools. Each pool is always in exactly one state:
//!
//! - current: sets are being allocated from it,
//! - used: exhausted or retired, waiting for [`DescriptorAllocator::reset`],
//! - free: reset and empty, ready to become current again.
//!
//! Pools are only created when no free pool exists and only destroyed by
//! [`DescriptorAllocator::destroy`].

use crate::error::{GpuError, Result};
use crate::tracker::ResourceTracker;
use ash::vk;
use std::sync::Arc;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a storage image binding.
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Descriptor types this layout consumes, for sizing pool ratios.
    pub fn descriptor_counts(&self) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += binding.descriptor_count,
                None => sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(binding.descriptor_count),
                ),
            }
        }
        sizes
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(GpuError::call("vkCreateDescriptorSetLayout"))?;
        Ok(layout)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool operations the allocator needs from a device.
pub trait DescriptorPoolBackend {
    /// # Safety
    /// The backing device must be valid.
    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool>;

    /// # Safety
    /// No set from `pool` may still be in use.
    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()>;

    /// # Safety
    /// No set from `pool` may still be in use.
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one set. The raw result is returned so the caller can tell
    /// pool exhaustion from other failures.
    ///
    /// # Safety
    /// `pool` and `layout` must belong to this device.
    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result>;
}

impl DescriptorPoolBackend for ash::Device {
    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        unsafe { Self::create_descriptor_pool(self, &create_info, None) }
            .map_err(GpuError::call("vkCreateDescriptorPool"))
    }

    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
        unsafe { Self::reset_descriptor_pool(self, pool, vk::DescriptorPoolResetFlags::empty()) }
            .map_err(GpuError::call("vkResetDescriptorPool"))
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { Self::destroy_descriptor_pool(self, pool, None) };
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { self.allocate_descriptor_sets(&alloc_info) }.map(|sets| sets[0])
    }
}

/// Share of a pool's set budget given to one descriptor type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    /// Descriptors of `ty` per set.
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Configuration for a [`DescriptorAllocator`].
#[derive(Debug, Clone)]
pub struct DescriptorAllocatorConfig {
    /// `max_sets` of every pool.
    pub sets_per_pool: u32,
    pub ratios: Vec<PoolSizeRatio>,
    pub flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorAllocatorConfig {
    fn default() -> Self {
        Self {
            sets_per_pool: 1000,
            ratios: vec![
                PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 0.5),
                PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
                PoolSizeRatio::new(vk::DescriptorType::SAMPLED_IMAGE, 4.0),
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 2.0),
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 2.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::INPUT_ATTACHMENT, 0.5),
            ],
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorAllocatorConfig {
    /// Set the per-pool set budget.
    pub fn sets_per_pool(mut self, sets: u32) -> Self {
        self.sets_per_pool = sets;
        self
    }

    /// Replace the ratio table.
    pub fn ratios(mut self, ratios: impl Into<Vec<PoolSizeRatio>>) -> Self {
        self.ratios = ratios.into();
        self
    }

    /// Pool sizes derived from the ratio table; every listed type gets at
    /// least one descriptor.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        self.ratios
            .iter()
            .map(|ratio| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = (ratio.ratio * self.sets_per_pool as f32).ceil() as u32;
                vk::DescriptorPoolSize::default()
                    .ty(ratio.ty)
                    .descriptor_count(count.max(1))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Current,
    Used,
    Free,
}

#[derive(Debug)]
struct PoolRecord {
    pool: vk::DescriptorPool,
    state: PoolState,
}

/// Pool counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub current: usize,
    pub used: usize,
    pub free: usize,
}

impl PoolCounts {
    pub const fn total(&self) -> usize {
        self.current + self.used + self.free
    }
}

/// Growable pool-of-pools descriptor set allocator.
///
/// Not internally synchronized; use one allocator per thread or lock around
/// it.
pub struct DescriptorAllocator {
    config: DescriptorAllocatorConfig,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    pools: Vec<PoolRecord>,
    current: Option<usize>,
    tracker: Option<Arc<ResourceTracker>>,
    destroyed: bool,
}

impl DescriptorAllocator {
    /// Create an allocator. No pool is created until the first allocation.
    pub fn new(config: DescriptorAllocatorConfig) -> Self {
        assert!(config.sets_per_pool > 0, "descriptor pools need a set budget");
        let pool_sizes = config.pool_sizes();
        Self {
            config,
            pool_sizes,
            pools: Vec::new(),
            current: None,
            tracker: None,
            destroyed: false,
        }
    }

    /// Report pool creation and destruction to `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub const fn config(&self) -> &DescriptorAllocatorConfig {
        &self.config
    }

    /// Number of pools in each state.
    pub fn pool_counts(&self) -> PoolCounts {
        let mut counts = PoolCounts::default();
        for record in &self.pools {
            match record.state {
                PoolState::Current => counts.current += 1,
                PoolState::Used => counts.used += 1,
                PoolState::Free => counts.free += 1,
            }
        }
        counts
    }

    /// Allocate one descriptor set with `layout`.
    ///
    /// If the current pool is exhausted or fragmented it is retired, a fresh
    /// pool becomes current, and the allocation is retried exactly once.
    /// Whatever the retry returns is final.
    ///
    /// # Safety
    /// `backend` must be the device every previous call used, and `layout`
    /// must belong to it.
    pub unsafe fn allocate<B: DescriptorPoolBackend + ?Sized>(
        &mut self,
        backend: &B,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        assert!(!self.destroyed, "descriptor allocator used after destroy");

        let current = match self.current {
            Some(index) => index,
            None => unsafe { self.grab_pool(backend) }?,
        };

        match unsafe { backend.allocate_descriptor_set(self.pools[current].pool, layout) } {
            Ok(set) => Ok(set),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.pools[current].state = PoolState::Used;
                self.current = None;
                let fresh = unsafe { self.grab_pool(backend) }?;
                tracing::trace!(
                    "Descriptor pool exhausted, retrying on pool {} of {}",
                    fresh + 1,
                    self.pools.len()
                );
                unsafe { backend.allocate_descriptor_set(self.pools[fresh].pool, layout) }
                    .map_err(GpuError::call("vkAllocateDescriptorSets"))
            }
            Err(result) => Err(GpuError::call("vkAllocateDescriptorSets")(result)),
        }
    }

    /// Reset every current and used pool and mark them free. All sets handed
    /// out so far become invalid. No pool is created or destroyed.
    ///
    /// # Safety
    /// No set allocated since the last reset may still be in use by the GPU.
    pub unsafe fn reset<B: DescriptorPoolBackend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        assert!(!self.destroyed, "descriptor allocator used after destroy");
        self.current = None;
        for record in &mut self.pools {
            if record.state != PoolState::Free {
                unsafe { backend.reset_descriptor_pool(record.pool) }?;
                record.state = PoolState::Free;
            }
        }
        Ok(())
    }

    /// Destroy every pool. The allocator cannot be used afterwards.
    ///
    /// # Safety
    /// No set from any pool may still be in use.
    pub unsafe fn destroy<B: DescriptorPoolBackend + ?Sized>(&mut self, backend: &B) {
        for record in self.pools.drain(..) {
            unsafe { backend.destroy_descriptor_pool(record.pool) };
            if let Some(tracker) = &self.tracker {
                tracker.destroyed(record.pool);
            }
        }
        self.current = None;
        self.destroyed = true;
    }

    // Make a free pool (or a new one) current and return its index.
    unsafe fn grab_pool<B: DescriptorPoolBackend + ?Sized>(&mut self, backend: &B) -> Result<usize> {
        assert!(
            self.pools.iter().all(|p| p.state != PoolState::Current),
            "grabbing a pool while another is current"
        );

        let index = if let Some(index) = self.pools.iter().position(|p| p.state == PoolState::Free)
        {
            index
        } else {
            let pool = unsafe {
                backend.create_descriptor_pool(
                    self.config.flags,
                    self.config.sets_per_pool,
                    &self.pool_sizes,
                )
            }?;
            if let Some(tracker) = &self.tracker {
                tracker.created(pool, "descriptor pool");
            }
            tracing::trace!("Created descriptor pool #{}", self.pools.len() + 1);
            self.pools.push(PoolRecord {
                pool,
                state: PoolState::Free,
            });
            self.pools.len() - 1
        };

        self.pools[index].state = PoolState::Current;
        self.current = Some(index);
        Ok(index)
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        if !self.pools.is_empty() {
            tracing::error!(
                "DescriptorAllocator dropped with {} live pools; call destroy first",
                self.pools.len()
            );
        }
    }
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    unsafe {
        write_buffer(
            device,
            dst_set,
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            buffer,
            offset,
            range,
        );
    }
}

/// Write a storage buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_storage_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    unsafe {
        write_buffer(
            device,
            dst_set,
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            buffer,
            offset,
            range,
        );
    }
}

unsafe fn write_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write a storage image descriptor.
///
/// # Safety
/// Device and image view must be valid.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(layout);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}
