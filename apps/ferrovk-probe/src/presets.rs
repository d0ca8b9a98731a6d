//! Built-in capability descriptor presets.

use ash::vk;
use ferrovk_gpu::{CapabilityDescriptor, DeviceFeatures, QueueCapabilities as Q};

/// Named descriptor presets, most demanding first.
pub fn presets() -> Vec<(&'static str, CapabilityDescriptor)> {
    vec![
        ("bindless-compute", bindless_compute()),
        ("async-transfer", async_transfer()),
        ("baseline", baseline()),
    ]
}

/// Vulkan 1.3 with descriptor indexing and separate compute and transfer
/// queues, preferring a discrete GPU.
fn bindless_compute() -> CapabilityDescriptor {
    let features = DeviceFeatures {
        shader_int64: true,
        descriptor_indexing: true,
        runtime_descriptor_array: true,
        shader_sampled_image_array_non_uniform_indexing: true,
        buffer_device_address: true,
        synchronization2: true,
        dynamic_rendering: true,
        ..DeviceFeatures::default()
    };
    CapabilityDescriptor::new()
        .api_version_minimum(vk::API_VERSION_1_3)
        .features(features)
        .queue(Q::GRAPHICS | Q::COMPUTE, 1)
        .queue(Q::TRANSFER, 1)
        .prefer_discrete(true)
        .rank_baseline(20)
}

/// A graphics queue plus any other family able to transfer.
fn async_transfer() -> CapabilityDescriptor {
    CapabilityDescriptor::new()
        .api_version_minimum(vk::API_VERSION_1_2)
        .queue(Q::GRAPHICS, 1)
        .queue(Q::TRANSFER, 1)
        .prefer_discrete(true)
        .rank_baseline(10)
}

fn baseline() -> CapabilityDescriptor {
    CapabilityDescriptor::new().queue(Q::GRAPHICS | Q::COMPUTE, 1)
}
