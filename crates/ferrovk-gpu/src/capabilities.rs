//! Device capability vocabulary.
//!
//! [`DeviceFeatures`] doubles as a requirement set (a `true` field means the
//! feature is required) and as a support set (a `true` field means the adapter
//! exposes it). Every comparison and every conversion to or from the Vulkan
//! feature structs is driven by [`FEATURE_TABLE`], so adding a feature means
//! adding one field and one table entry.

use ash::vk;
use bitflags::bitflags;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

bitflags! {
    /// Capabilities of a queue family, or the capabilities a queue request needs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

impl QueueCapabilities {
    /// Translate native queue flags. Presentation is never implied by queue
    /// flags and has to be added from a presentation-support query.
    pub fn from_queue_flags(flags: vk::QueueFlags) -> Self {
        let mut caps = Self::empty();
        if flags.contains(vk::QueueFlags::GRAPHICS) {
            caps |= Self::GRAPHICS;
        }
        if flags.contains(vk::QueueFlags::COMPUTE) {
            caps |= Self::COMPUTE;
        }
        if flags.contains(vk::QueueFlags::TRANSFER) {
            caps |= Self::TRANSFER;
        }
        caps
    }
}

/// Vulkan structure a feature is reported through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLevel {
    /// `VkPhysicalDeviceFeatures`
    Core,
    /// `VkPhysicalDeviceVulkan12Features`
    Vulkan12,
    /// `VkPhysicalDeviceVulkan13Features`
    Vulkan13,
}

/// Named boolean device features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    // Vulkan 1.0 core features
    pub robust_buffer_access: bool,
    pub full_draw_index_uint32: bool,
    pub image_cube_array: bool,
    pub independent_blend: bool,
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub sample_rate_shading: bool,
    pub dual_src_blend: bool,
    pub logic_op: bool,
    pub multi_draw_indirect: bool,
    pub draw_indirect_first_instance: bool,
    pub depth_clamp: bool,
    pub depth_bias_clamp: bool,
    pub fill_mode_non_solid: bool,
    pub depth_bounds: bool,
    pub wide_lines: bool,
    pub large_points: bool,
    pub multi_viewport: bool,
    pub sampler_anisotropy: bool,
    pub texture_compression_bc: bool,
    pub occlusion_query_precise: bool,
    pub pipeline_statistics_query: bool,
    pub vertex_pipeline_stores_and_atomics: bool,
    pub fragment_stores_and_atomics: bool,
    pub shader_image_gather_extended: bool,
    pub shader_storage_image_extended_formats: bool,
    pub shader_clip_distance: bool,
    pub shader_cull_distance: bool,
    pub shader_float64: bool,
    pub shader_int64: bool,
    pub shader_int16: bool,
    pub sparse_binding: bool,

    // Vulkan 1.2 features
    pub sampler_mirror_clamp_to_edge: bool,
    pub draw_indirect_count: bool,
    pub storage_buffer8_bit_access: bool,
    pub shader_float16: bool,
    pub shader_int8: bool,
    pub descriptor_indexing: bool,
    pub shader_sampled_image_array_non_uniform_indexing: bool,
    pub descriptor_binding_partially_bound: bool,
    pub descriptor_binding_variable_descriptor_count: bool,
    pub runtime_descriptor_array: bool,
    pub sampler_filter_minmax: bool,
    pub scalar_block_layout: bool,
    pub imageless_framebuffer: bool,
    pub host_query_reset: bool,
    pub timeline_semaphore: bool,
    pub buffer_device_address: bool,
    pub vulkan_memory_model: bool,

    // Vulkan 1.3 features
    pub robust_image_access: bool,
    pub inline_uniform_block: bool,
    pub pipeline_creation_cache_control: bool,
    pub subgroup_size_control: bool,
    pub synchronization2: bool,
    pub shader_zero_initialize_workgroup_memory: bool,
    pub dynamic_rendering: bool,
    pub shader_integer_dot_product: bool,
    pub maintenance4: bool,
}

impl DeviceFeatures {
    /// Read a feature set out of the Vulkan feature structs.
    pub fn from_vk(mut chain: VkFeatureChain) -> Self {
        let mut features = Self::default();
        for entry in &FEATURE_TABLE {
            *(entry.get_mut)(&mut features) = *(entry.vk)(&mut chain) == vk::TRUE;
        }
        features
    }

    /// Mirror this feature set into Vulkan feature structs.
    pub fn to_vk(&self) -> VkFeatureChain {
        let mut chain = VkFeatureChain::default();
        for entry in &FEATURE_TABLE {
            *(entry.vk)(&mut chain) = vk::Bool32::from((entry.get)(self));
        }
        chain
    }

    /// Name of the first feature that is set in `self` but missing from
    /// `supported`, in table order.
    pub fn first_unsupported(&self, supported: &Self) -> Option<&'static str> {
        FEATURE_TABLE
            .iter()
            .find(|entry| (entry.get)(self) && !(entry.get)(supported))
            .map(|entry| entry.name)
    }

    /// Whether every feature set in `self` is also set in `supported`.
    pub fn is_satisfied_by(&self, supported: &Self) -> bool {
        self.first_unsupported(supported).is_none()
    }

    /// Whether any feature reported through `level` is set.
    pub fn uses_level(&self, level: FeatureLevel) -> bool {
        FEATURE_TABLE
            .iter()
            .any(|entry| entry.level == level && (entry.get)(self))
    }

    /// Names of all set features.
    pub fn enabled_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        FEATURE_TABLE
            .iter()
            .filter(|entry| (entry.get)(self))
            .map(|entry| entry.name)
    }

    /// Set a feature by its table name. Returns `false` for unknown names.
    pub fn set_by_name(&mut self, name: &str, value: bool) -> bool {
        match FeatureEntry::find(name) {
            Some(entry) => {
                *(entry.get_mut)(self) = value;
                true
            }
            None => false,
        }
    }
}

/// Owned Vulkan feature structs with unlinked `p_next` chains.
#[derive(Default)]
pub struct VkFeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    pub vulkan12: vk::PhysicalDeviceVulkan12Features<'static>,
    pub vulkan13: vk::PhysicalDeviceVulkan13Features<'static>,
}

/// One row of [`FEATURE_TABLE`].
pub struct FeatureEntry {
    /// Field name, as used in logs.
    pub name: &'static str,
    /// Structure the feature lives in.
    pub level: FeatureLevel,
    pub get: fn(&DeviceFeatures) -> bool,
    pub get_mut: fn(&mut DeviceFeatures) -> &mut bool,
    pub vk: fn(&mut VkFeatureChain) -> &mut vk::Bool32,
}

impl FeatureEntry {
    /// Look up a table row by field name.
    pub fn find(name: &str) -> Option<&'static Self> {
        FEATURE_TABLE.iter().find(|entry| entry.name == name)
    }
}

/// Every feature the ranking engine compares, in comparison order.
pub static FEATURE_TABLE: [FeatureEntry; 58] = [
    FeatureEntry {
        name: "robust_buffer_access",
        level: FeatureLevel::Core,
        get: |f| f.robust_buffer_access,
        get_mut: |f| &mut f.robust_buffer_access,
        vk: |c| &mut c.core.robust_buffer_access,
    },
    FeatureEntry {
        name: "full_draw_index_uint32",
        level: FeatureLevel::Core,
        get: |f| f.full_draw_index_uint32,
        get_mut: |f| &mut f.full_draw_index_uint32,
        vk: |c| &mut c.core.full_draw_index_uint32,
    },
    FeatureEntry {
        name: "image_cube_array",
        level: FeatureLevel::Core,
        get: |f| f.image_cube_array,
        get_mut: |f| &mut f.image_cube_array,
        vk: |c| &mut c.core.image_cube_array,
    },
    FeatureEntry {
        name: "independent_blend",
        level: FeatureLevel::Core,
        get: |f| f.independent_blend,
        get_mut: |f| &mut f.independent_blend,
        vk: |c| &mut c.core.independent_blend,
    },
    FeatureEntry {
        name: "geometry_shader",
        level: FeatureLevel::Core,
        get: |f| f.geometry_shader,
        get_mut: |f| &mut f.geometry_shader,
        vk: |c| &mut c.core.geometry_shader,
    },
    FeatureEntry {
        name: "tessellation_shader",
        level: FeatureLevel::Core,
        get: |f| f.tessellation_shader,
        get_mut: |f| &mut f.tessellation_shader,
        vk: |c| &mut c.core.tessellation_shader,
    },
    FeatureEntry {
        name: "sample_rate_shading",
        level: FeatureLevel::Core,
        get: |f| f.sample_rate_shading,
        get_mut: |f| &mut f.sample_rate_shading,
        vk: |c| &mut c.core.sample_rate_shading,
    },
    FeatureEntry {
        name: "dual_src_blend",
        level: FeatureLevel::Core,
        get: |f| f.dual_src_blend,
        get_mut: |f| &mut f.dual_src_blend,
        vk: |c| &mut c.core.dual_src_blend,
    },
    FeatureEntry {
        name: "logic_op",
        level: FeatureLevel::Core,
        get: |f| f.logic_op,
        get_mut: |f| &mut f.logic_op,
        vk: |c| &mut c.core.logic_op,
    },
    FeatureEntry {
        name: "multi_draw_indirect",
        level: FeatureLevel::Core,
        get: |f| f.multi_draw_indirect,
        get_mut: |f| &mut f.multi_draw_indirect,
        vk: |c| &mut c.core.multi_draw_indirect,
    },
    FeatureEntry {
        name: "draw_indirect_first_instance",
        level: FeatureLevel::Core,
        get: |f| f.draw_indirect_first_instance,
        get_mut: |f| &mut f.draw_indirect_first_instance,
        vk: |c| &mut c.core.draw_indirect_first_instance,
    },
    FeatureEntry {
        name: "depth_clamp",
        level: FeatureLevel::Core,
        get: |f| f.depth_clamp,
        get_mut: |f| &mut f.depth_clamp,
        vk: |c| &mut c.core.depth_clamp,
    },
    FeatureEntry {
        name: "depth_bias_clamp",
        level: FeatureLevel::Core,
        get: |f| f.depth_bias_clamp,
        get_mut: |f| &mut f.depth_bias_clamp,
        vk: |c| &mut c.core.depth_bias_clamp,
    },
    FeatureEntry {
        name: "fill_mode_non_solid",
        level: FeatureLevel::Core,
        get: |f| f.fill_mode_non_solid,
        get_mut: |f| &mut f.fill_mode_non_solid,
        vk: |c| &mut c.core.fill_mode_non_solid,
    },
    FeatureEntry {
        name: "depth_bounds",
        level: FeatureLevel::Core,
        get: |f| f.depth_bounds,
        get_mut: |f| &mut f.depth_bounds,
        vk: |c| &mut c.core.depth_bounds,
    },
    FeatureEntry {
        name: "wide_lines",
        level: FeatureLevel::Core,
        get: |f| f.wide_lines,
        get_mut: |f| &mut f.wide_lines,
        vk: |c| &mut c.core.wide_lines,
    },
    FeatureEntry {
        name: "large_points",
        level: FeatureLevel::Core,
        get: |f| f.large_points,
        get_mut: |f| &mut f.large_points,
        vk: |c| &mut c.core.large_points,
    },
    FeatureEntry {
        name: "multi_viewport",
        level: FeatureLevel::Core,
        get: |f| f.multi_viewport,
        get_mut: |f| &mut f.multi_viewport,
        vk: |c| &mut c.core.multi_viewport,
    },
    FeatureEntry {
        name: "sampler_anisotropy",
        level: FeatureLevel::Core,
        get: |f| f.sampler_anisotropy,
        get_mut: |f| &mut f.sampler_anisotropy,
        vk: |c| &mut c.core.sampler_anisotropy,
    },
    FeatureEntry {
        name: "texture_compression_bc",
        level: FeatureLevel::Core,
        get: |f| f.texture_compression_bc,
        get_mut: |f| &mut f.texture_compression_bc,
        vk: |c| &mut c.core.texture_compression_bc,
    },
    FeatureEntry {
        name: "occlusion_query_precise",
        level: FeatureLevel::Core,
        get: |f| f.occlusion_query_precise,
        get_mut: |f| &mut f.occlusion_query_precise,
        vk: |c| &mut c.core.occlusion_query_precise,
    },
    FeatureEntry {
        name: "pipeline_statistics_query",
        level: FeatureLevel::Core,
        get: |f| f.pipeline_statistics_query,
        get_mut: |f| &mut f.pipeline_statistics_query,
        vk: |c| &mut c.core.pipeline_statistics_query,
    },
    FeatureEntry {
        name: "vertex_pipeline_stores_and_atomics",
        level: FeatureLevel::Core,
        get: |f| f.vertex_pipeline_stores_and_atomics,
        get_mut: |f| &mut f.vertex_pipeline_stores_and_atomics,
        vk: |c| &mut c.core.vertex_pipeline_stores_and_atomics,
    },
    FeatureEntry {
        name: "fragment_stores_and_atomics",
        level: FeatureLevel::Core,
        get: |f| f.fragment_stores_and_atomics,
        get_mut: |f| &mut f.fragment_stores_and_atomics,
        vk: |c| &mut c.core.fragment_stores_and_atomics,
    },
    FeatureEntry {
        name: "shader_image_gather_extended",
        level: FeatureLevel::Core,
        get: |f| f.shader_image_gather_extended,
        get_mut: |f| &mut f.shader_image_gather_extended,
        vk: |c| &mut c.core.shader_image_gather_extended,
    },
    FeatureEntry {
        name: "shader_storage_image_extended_formats",
        level: FeatureLevel::Core,
        get: |f| f.shader_storage_image_extended_formats,
        get_mut: |f| &mut f.shader_storage_image_extended_formats,
        vk: |c| &mut c.core.shader_storage_image_extended_formats,
    },
    FeatureEntry {
        name: "shader_clip_distance",
        level: FeatureLevel::Core,
        get: |f| f.shader_clip_distance,
        get_mut: |f| &mut f.shader_clip_distance,
        vk: |c| &mut c.core.shader_clip_distance,
    },
    FeatureEntry {
        name: "shader_cull_distance",
        level: FeatureLevel::Core,
        get: |f| f.shader_cull_distance,
        get_mut: |f| &mut f.shader_cull_distance,
        vk: |c| &mut c.core.shader_cull_distance,
    },
    FeatureEntry {
        name: "shader_float64",
        level: FeatureLevel::Core,
        get: |f| f.shader_float64,
        get_mut: |f| &mut f.shader_float64,
        vk: |c| &mut c.core.shader_float64,
    },
    FeatureEntry {
        name: "shader_int64",
        level: FeatureLevel::Core,
        get: |f| f.shader_int64,
        get_mut: |f| &mut f.shader_int64,
        vk: |c| &mut c.core.shader_int64,
    },
    FeatureEntry {
        name: "shader_int16",
        level: FeatureLevel::Core,
        get: |f| f.shader_int16,
        get_mut: |f| &mut f.shader_int16,
        vk: |c| &mut c.core.shader_int16,
    },
    FeatureEntry {
        name: "sparse_binding",
        level: FeatureLevel::Core,
        get: |f| f.sparse_binding,
        get_mut: |f| &mut f.sparse_binding,
        vk: |c| &mut c.core.sparse_binding,
    },
    FeatureEntry {
        name: "sampler_mirror_clamp_to_edge",
        level: FeatureLevel::Vulkan12,
        get: |f| f.sampler_mirror_clamp_to_edge,
        get_mut: |f| &mut f.sampler_mirror_clamp_to_edge,
        vk: |c| &mut c.vulkan12.sampler_mirror_clamp_to_edge,
    },
    FeatureEntry {
        name: "draw_indirect_count",
        level: FeatureLevel::Vulkan12,
        get: |f| f.draw_indirect_count,
        get_mut: |f| &mut f.draw_indirect_count,
        vk: |c| &mut c.vulkan12.draw_indirect_count,
    },
    FeatureEntry {
        name: "storage_buffer8_bit_access",
        level: FeatureLevel::Vulkan12,
        get: |f| f.storage_buffer8_bit_access,
        get_mut: |f| &mut f.storage_buffer8_bit_access,
        vk: |c| &mut c.vulkan12.storage_buffer8_bit_access,
    },
    FeatureEntry {
        name: "shader_float16",
        level: FeatureLevel::Vulkan12,
        get: |f| f.shader_float16,
        get_mut: |f| &mut f.shader_float16,
        vk: |c| &mut c.vulkan12.shader_float16,
    },
    FeatureEntry {
        name: "shader_int8",
        level: FeatureLevel::Vulkan12,
        get: |f| f.shader_int8,
        get_mut: |f| &mut f.shader_int8,
        vk: |c| &mut c.vulkan12.shader_int8,
    },
    FeatureEntry {
        name: "descriptor_indexing",
        level: FeatureLevel::Vulkan12,
        get: |f| f.descriptor_indexing,
        get_mut: |f| &mut f.descriptor_indexing,
        vk: |c| &mut c.vulkan12.descriptor_indexing,
    },
    FeatureEntry {
        name: "shader_sampled_image_array_non_uniform_indexing",
        level: FeatureLevel::Vulkan12,
        get: |f| f.shader_sampled_image_array_non_uniform_indexing,
        get_mut: |f| &mut f.shader_sampled_image_array_non_uniform_indexing,
        vk: |c| &mut c.vulkan12.shader_sampled_image_array_non_uniform_indexing,
    },
    FeatureEntry {
        name: "descriptor_binding_partially_bound",
        level: FeatureLevel::Vulkan12,
        get: |f| f.descriptor_binding_partially_bound,
        get_mut: |f| &mut f.descriptor_binding_partially_bound,
        vk: |c| &mut c.vulkan12.descriptor_binding_partially_bound,
    },
    FeatureEntry {
        name: "descriptor_binding_variable_descriptor_count",
        level: FeatureLevel::Vulkan12,
        get: |f| f.descriptor_binding_variable_descriptor_count,
        get_mut: |f| &mut f.descriptor_binding_variable_descriptor_count,
        vk: |c| &mut c.vulkan12.descriptor_binding_variable_descriptor_count,
    },
    FeatureEntry {
        name: "runtime_descriptor_array",
        level: FeatureLevel::Vulkan12,
        get: |f| f.runtime_descriptor_array,
        get_mut: |f| &mut f.runtime_descriptor_array,
        vk: |c| &mut c.vulkan12.runtime_descriptor_array,
    },
    FeatureEntry {
        name: "sampler_filter_minmax",
        level: FeatureLevel::Vulkan12,
        get: |f| f.sampler_filter_minmax,
        get_mut: |f| &mut f.sampler_filter_minmax,
        vk: |c| &mut c.vulkan12.sampler_filter_minmax,
    },
    FeatureEntry {
        name: "scalar_block_layout",
        level: FeatureLevel::Vulkan12,
        get: |f| f.scalar_block_layout,
        get_mut: |f| &mut f.scalar_block_layout,
        vk: |c| &mut c.vulkan12.scalar_block_layout,
    },
    FeatureEntry {
        name: "imageless_framebuffer",
        level: FeatureLevel::Vulkan12,
        get: |f| f.imageless_framebuffer,
        get_mut: |f| &mut f.imageless_framebuffer,
        vk: |c| &mut c.vulkan12.imageless_framebuffer,
    },
    FeatureEntry {
        name: "host_query_reset",
        level: FeatureLevel::Vulkan12,
        get: |f| f.host_query_reset,
        get_mut: |f| &mut f.host_query_reset,
        vk: |c| &mut c.vulkan12.host_query_reset,
    },
    FeatureEntry {
        name: "timeline_semaphore",
        level: FeatureLevel::Vulkan12,
        get: |f| f.timeline_semaphore,
        get_mut: |f| &mut f.timeline_semaphore,
        vk: |c| &mut c.vulkan12.timeline_semaphore,
    },
    FeatureEntry {
        name: "buffer_device_address",
        level: FeatureLevel::Vulkan12,
        get: |f| f.buffer_device_address,
        get_mut: |f| &mut f.buffer_device_address,
        vk: |c| &mut c.vulkan12.buffer_device_address,
    },
    FeatureEntry {
        name: "vulkan_memory_model",
        level: FeatureLevel::Vulkan12,
        get: |f| f.vulkan_memory_model,
        get_mut: |f| &mut f.vulkan_memory_model,
        vk: |c| &mut c.vulkan12.vulkan_memory_model,
    },
    FeatureEntry {
        name: "robust_image_access",
        level: FeatureLevel::Vulkan13,
        get: |f| f.robust_image_access,
        get_mut: |f| &mut f.robust_image_access,
        vk: |c| &mut c.vulkan13.robust_image_access,
    },
    FeatureEntry {
        name: "inline_uniform_block",
        level: FeatureLevel::Vulkan13,
        get: |f| f.inline_uniform_block,
        get_mut: |f| &mut f.inline_uniform_block,
        vk: |c| &mut c.vulkan13.inline_uniform_block,
    },
    FeatureEntry {
        name: "pipeline_creation_cache_control",
        level: FeatureLevel::Vulkan13,
        get: |f| f.pipeline_creation_cache_control,
        get_mut: |f| &mut f.pipeline_creation_cache_control,
        vk: |c| &mut c.vulkan13.pipeline_creation_cache_control,
    },
    FeatureEntry {
        name: "subgroup_size_control",
        level: FeatureLevel::Vulkan13,
        get: |f| f.subgroup_size_control,
        get_mut: |f| &mut f.subgroup_size_control,
        vk: |c| &mut c.vulkan13.subgroup_size_control,
    },
    FeatureEntry {
        name: "synchronization2",
        level: FeatureLevel::Vulkan13,
        get: |f| f.synchronization2,
        get_mut: |f| &mut f.synchronization2,
        vk: |c| &mut c.vulkan13.synchronization2,
    },
    FeatureEntry {
        name: "shader_zero_initialize_workgroup_memory",
        level: FeatureLevel::Vulkan13,
        get: |f| f.shader_zero_initialize_workgroup_memory,
        get_mut: |f| &mut f.shader_zero_initialize_workgroup_memory,
        vk: |c| &mut c.vulkan13.shader_zero_initialize_workgroup_memory,
    },
    FeatureEntry {
        name: "dynamic_rendering",
        level: FeatureLevel::Vulkan13,
        get: |f| f.dynamic_rendering,
        get_mut: |f| &mut f.dynamic_rendering,
        vk: |c| &mut c.vulkan13.dynamic_rendering,
    },
    FeatureEntry {
        name: "shader_integer_dot_product",
        level: FeatureLevel::Vulkan13,
        get: |f| f.shader_integer_dot_product,
        get_mut: |f| &mut f.shader_integer_dot_product,
        vk: |c| &mut c.vulkan13.shader_integer_dot_product,
    },
    FeatureEntry {
        name: "maintenance4",
        level: FeatureLevel::Vulkan13,
        get: |f| f.maintenance4,
        get_mut: |f| &mut f.maintenance4,
        vk: |c| &mut c.vulkan13.maintenance4,
    },
];
