//! Logical device and queue construction from a resolved descriptor.

use crate::capabilities::{FeatureLevel, QueueCapabilities};
use crate::error::{GpuError, Result};
use crate::requirements::CapabilityDescriptor;
use ash::vk;
use std::ffi::c_char;

/// Uniform priority used for every created queue.
pub const QUEUE_PRIORITY: f32 = 1.0;

/// One `VkDeviceQueueCreateInfo` worth of queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRequest {
    pub family_index: u32,
    pub count: u32,
}

/// Queues created for one queue setup.
#[derive(Debug, Clone)]
pub struct QueueGroup {
    pub capabilities: QueueCapabilities,
    pub family_index: u32,
    pub queues: Vec<vk::Queue>,
}

/// Derive the queue creation requests for a resolved descriptor, one per
/// queue setup and in setup order.
///
/// # Panics
/// If any queue setup is unresolved, asks for zero queues or more than its
/// family has, or shares a family with another setup. Any of these means
/// the descriptor did not come out of a successful ranking pass.
pub fn plan_queue_requests(descriptor: &CapabilityDescriptor) -> Vec<QueueRequest> {
    let mut requests: Vec<QueueRequest> = Vec::with_capacity(descriptor.queue_setups.len());
    for (i, setup) in descriptor.queue_setups.iter().enumerate() {
        let Some(family_index) = setup.cached_index else {
            panic!("queue setup {i} has no resolved queue family");
        };
        assert!(setup.required_count > 0, "queue setup {i} requests no queues");
        assert!(
            setup.required_count <= setup.present_count,
            "queue setup {i} needs {} queues but family {family_index} has {}",
            setup.required_count,
            setup.present_count
        );
        assert!(
            requests.iter().all(|r| r.family_index != family_index),
            "queue family {family_index} assigned to more than one queue setup"
        );
        requests.push(QueueRequest {
            family_index,
            count: setup.required_count,
        });
    }
    requests
}

/// Check that `lens` (one per output slot) mirrors the descriptor's queue
/// setups and their required counts.
///
/// # Panics
/// On any size mismatch.
pub fn assert_result_storage(
    descriptor: &CapabilityDescriptor,
    lens: impl ExactSizeIterator<Item = usize>,
) {
    assert_eq!(
        lens.len(),
        descriptor.queue_setups.len(),
        "queue result storage does not match the number of queue setups"
    );
    for (i, (len, setup)) in lens.zip(&descriptor.queue_setups).enumerate() {
        assert_eq!(
            len, setup.required_count as usize,
            "queue result storage for setup {i} has the wrong length"
        );
    }
}

/// A created device with its queues.
pub struct LogicalDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    /// One group per queue setup, in setup order.
    pub queue_groups: Vec<QueueGroup>,
}

impl LogicalDevice {
    /// First queue of the first group sharing any of `capabilities`.
    pub fn queue(&self, capabilities: QueueCapabilities) -> Option<(u32, vk::Queue)> {
        self.queue_groups
            .iter()
            .find(|group| group.capabilities.intersects(capabilities))
            .and_then(|group| group.queues.first().map(|&q| (group.family_index, q)))
    }

    /// Destroy the device.
    ///
    /// # Safety
    /// No object created from the device may still be in use.
    pub unsafe fn destroy(&self) {
        unsafe { self.device.destroy_device(None) };
    }
}

/// Create the logical device for a descriptor that won a ranking pass.
///
/// Enables exactly the descriptor's features and extensions, and creates
/// `required_count` queues per queue setup at priority 1.0.
///
/// # Safety
/// The instance must be valid and must be the one the descriptor's physical
/// device was enumerated from.
///
/// # Panics
/// If the descriptor is not resolved (see [`plan_queue_requests`]).
pub unsafe fn create_logical_device(
    instance: &ash::Instance,
    descriptor: &CapabilityDescriptor,
) -> Result<LogicalDevice> {
    assert!(
        descriptor.physical_device != vk::PhysicalDevice::null(),
        "descriptor has no selected physical device"
    );
    let requests = plan_queue_requests(descriptor);

    let max_count = requests.iter().map(|r| r.count as usize).max().unwrap_or(0);
    let priorities = vec![QUEUE_PRIORITY; max_count];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = requests
        .iter()
        .map(|request| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(request.family_index)
                .queue_priorities(&priorities[..request.count as usize])
        })
        .collect();

    let extension_names: Vec<*const c_char> =
        descriptor.extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut chain = descriptor.features.to_vk();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().features(chain.core);
    // Version structs are only chained when something in them is enabled.
    if descriptor.features.uses_level(FeatureLevel::Vulkan12) {
        features2 = features2.push_next(&mut chain.vulkan12);
    }
    if descriptor.features.uses_level(FeatureLevel::Vulkan13) {
        features2 = features2.push_next(&mut chain.vulkan13);
    }

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(descriptor.physical_device, &create_info, None) }
        .map_err(GpuError::call("vkCreateDevice"))?;

    let mut queue_groups: Vec<QueueGroup> = descriptor
        .queue_setups
        .iter()
        .zip(&requests)
        .map(|(setup, request)| QueueGroup {
            capabilities: setup.capabilities,
            family_index: request.family_index,
            queues: vec![vk::Queue::null(); request.count as usize],
        })
        .collect();
    {
        let mut slots: Vec<&mut [vk::Queue]> = queue_groups
            .iter_mut()
            .map(|group| group.queues.as_mut_slice())
            .collect();
        unsafe { get_queues_into(&device, descriptor, &mut slots) };
    }

    tracing::info!(
        "Logical device created: {} queue groups, {} extensions",
        queue_groups.len(),
        extension_names.len()
    );

    Ok(LogicalDevice {
        device,
        physical_device: descriptor.physical_device,
        queue_groups,
    })
}

/// Fetch every queue of every setup into caller-provided storage.
///
/// # Safety
/// `device` must have been created from `descriptor`.
///
/// # Panics
/// If the descriptor is unresolved or `out` is not shaped like its queue
/// setups.
pub unsafe fn get_queues_into(
    device: &ash::Device,
    descriptor: &CapabilityDescriptor,
    out: &mut [&mut [vk::Queue]],
) {
    assert_result_storage(descriptor, out.iter().map(|slot| slot.len()));
    for (setup, slot) in descriptor.queue_setups.iter().zip(out.iter_mut()) {
        let Some(family_index) = setup.cached_index else {
            panic!("queue setup has no resolved queue family");
        };
        for (queue_index, queue) in (0u32..).zip(slot.iter_mut()) {
            *queue = unsafe { device.get_device_queue(family_index, queue_index) };
        }
    }
}
