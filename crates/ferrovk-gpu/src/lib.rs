//! Vulkan device negotiation and descriptor pooling.
//!
//! This crate provides:
//! - Instance creation with extension/layer checks and a tracing-backed
//!   debug messenger
//! - Adapter ranking against caller-supplied capability descriptors
//! - Queue family matching and logical device creation
//! - A growable descriptor set allocator
//! - Surface and swapchain helpers

pub mod capabilities;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod extensions;
pub mod instance;
pub mod queue_match;
pub mod requirements;
pub mod selection;
pub mod snapshot;
pub mod surface;
pub mod swapchain;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use capabilities::{DeviceFeatures, FeatureLevel, GpuVendor, QueueCapabilities, FEATURE_TABLE};
pub use context::{default_descriptor, GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_storage_buffer, write_storage_image, write_uniform_buffer, DescriptorAllocator,
    DescriptorAllocatorConfig, DescriptorPoolBackend, DescriptorSetLayoutBuilder, PoolCounts,
    PoolSizeRatio,
};
pub use device::{create_logical_device, LogicalDevice, QueueGroup};
pub use error::{GpuError, Result};
pub use extensions::{require_instance_extensions, require_instance_layers, select_layers};
pub use instance::{create_instance, DebugMessenger, InstanceConfig};
pub use requirements::{CapabilityDescriptor, QueueSetup};
pub use selection::{select_physical_device, Selection};
pub use snapshot::{
    AdapterSnapshot, AdapterSource, PresentationQuery, PresentationSupport, VulkanAdapters,
};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{Swapchain, SwapchainConfig};
pub use tracker::{ResourceTracker, TrackerStats};
