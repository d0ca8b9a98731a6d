//! ferrovk adapter probe
//!
//! Lists every Vulkan adapter, ranks them against the built-in descriptor
//! presets and reports the winner. No window is created.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ferrovk-probe -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--create-device`: Create the logical device for the winner and
//!   exercise a descriptor allocator on it
//! - `--log-extensions`: Log required and available instance extensions
//! - `--no-validation`: Do not enable the validation layer
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod presets;

use anyhow::Context;
use ash::vk;
use ferrovk_gpu::snapshot::no_presentation;
use ferrovk_gpu::{
    create_instance, create_logical_device, select_physical_device, AdapterSnapshot,
    AdapterSource, CapabilityDescriptor, DescriptorAllocator, DescriptorAllocatorConfig,
    DescriptorSetLayoutBuilder, InstanceConfig, LogicalDevice, ResourceTracker, VulkanAdapters,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sets requested from the allocator in `--create-device` mode.
const PROBE_SETS: u32 = 64;

struct Options {
    create_device: bool,
    log_extensions: bool,
    validation: bool,
}

impl Options {
    fn from_args() -> Option<Self> {
        let mut options = Self {
            create_device: false,
            log_extensions: false,
            validation: cfg!(debug_assertions),
        };
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "-h" | "--help" => return None,
                "--create-device" => options.create_device = true,
                "--log-extensions" => options.log_extensions = true,
                "--no-validation" => options.validation = false,
                other => eprintln!("Ignoring unknown argument: {other}"),
            }
        }
        Some(options)
    }
}

fn main() -> anyhow::Result<()> {
    let Some(options) = Options::from_args() else {
        print_help();
        return Ok(());
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let entry = unsafe { ash::Entry::load() }.context("Vulkan loader not found")?;
    let config = InstanceConfig::new()
        .app_name("ferrovk-probe")
        .validation(options.validation)
        .log_extensions(options.log_extensions);
    let (instance, messenger) =
        unsafe { create_instance(&entry, &config) }.context("Failed to create instance")?;

    let result = probe(&instance, &options);

    unsafe {
        if let Some(messenger) = &messenger {
            messenger.destroy();
        }
        instance.destroy_instance(None);
    }
    result
}

fn probe(instance: &ash::Instance, options: &Options) -> anyhow::Result<()> {
    let source = VulkanAdapters::new(instance, None);

    let mut snapshot = AdapterSnapshot::default();
    for (i, adapter) in source.enumerate_adapters()?.into_iter().enumerate() {
        snapshot.capture(&source, adapter, &no_presentation, None)?;
        info!("Adapter {i}: {}", snapshot.summary());
        for (index, family) in snapshot.queue_families.iter().enumerate() {
            info!(
                "  queue family {index}: {:?} x{}",
                family.capabilities, family.queue_count
            );
        }
    }

    let (names, mut descriptors): (Vec<&str>, Vec<CapabilityDescriptor>) =
        presets::presets().into_iter().unzip();
    let Some(selection) = select_physical_device(&source, &mut descriptors, &no_presentation, None)?
    else {
        anyhow::bail!("No adapter satisfies any preset ({})", names.join(", "));
    };
    info!(
        "Preset '{}' selected on {} (rank {})",
        names[selection.descriptor_index], selection.device_name, selection.rank
    );

    if options.create_device {
        let descriptor = &descriptors[selection.descriptor_index];
        let device = unsafe { create_logical_device(instance, descriptor) }
            .context("Failed to create logical device")?;
        let result = exercise_allocator(&device);
        unsafe { device.destroy() };
        result?;
    }
    Ok(())
}

fn exercise_allocator(device: &LogicalDevice) -> anyhow::Result<()> {
    let tracker = Arc::new(ResourceTracker::new());
    let config = DescriptorAllocatorConfig::default().sets_per_pool(PROBE_SETS / 4);
    let mut allocator = DescriptorAllocator::new(config).with_tracker(tracker.clone());

    let layout = unsafe {
        DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .build(&device.device)
    }?;

    let result = allocate_twice(&mut allocator, device, layout);

    unsafe {
        allocator.destroy(&device.device);
        device.device.destroy_descriptor_set_layout(layout, None);
    }
    let leaked = tracker.report_leaks();
    anyhow::ensure!(leaked == 0, "{leaked} descriptor pools leaked");
    result
}

fn allocate_twice(
    allocator: &mut DescriptorAllocator,
    device: &LogicalDevice,
    layout: vk::DescriptorSetLayout,
) -> anyhow::Result<()> {
    for _ in 0..PROBE_SETS {
        unsafe { allocator.allocate(&device.device, layout) }?;
    }
    let grown = allocator.pool_counts();
    unsafe { allocator.reset(&device.device) }?;
    for _ in 0..PROBE_SETS {
        unsafe { allocator.allocate(&device.device, layout) }?;
    }
    info!(
        "Descriptor allocator: {} sets twice, {} pools ({} after reset)",
        PROBE_SETS,
        grown.total(),
        allocator.pool_counts().total()
    );
    Ok(())
}

fn print_help() {
    eprintln!(
        "ferrovk adapter probe

Lists Vulkan adapters and ranks them against built-in capability presets.

USAGE:
    ferrovk-probe [OPTIONS]

OPTIONS:
        --create-device     Create the selected device and exercise a descriptor allocator
        --log-extensions    Log required and available instance extensions
        --no-validation     Do not enable the validation layer
    -h, --help              Print this help message

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)"
    );
}
