//! Physical device ranking.
//!
//! Every adapter is checked against every [`CapabilityDescriptor`]. A
//! descriptor is accepted for an adapter when the API version, features,
//! extensions, surface formats and queue families all fit; accepted pairings
//! are ranked and the highest rank wins. On equal rank the pairing found
//! first (adapter order outer, descriptor order inner) is kept.

use crate::error::Result;
use crate::queue_match::{commit_assignment, match_queue_families, QueueAssignment};
use crate::requirements::CapabilityDescriptor;
use crate::snapshot::{AdapterSnapshot, AdapterSource, PresentationSupport};
use ash::vk;
use thiserror::Error;

/// Rank added for a matching device-type preference.
pub const PREFERENCE_BONUS: i32 = 10;

/// Outcome of a successful ranking pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub physical_device: vk::PhysicalDevice,
    /// Index of the winning descriptor in the slice passed to
    /// [`select_physical_device`].
    pub descriptor_index: usize,
    pub rank: i32,
    pub device_name: String,
}

/// Why a descriptor was turned down for an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("API version {available:#x} below required {required:#x}")]
    ApiVersion { required: u32, available: u32 },
    #[error("missing feature {0}")]
    MissingFeature(&'static str),
    #[error("missing extension {0}")]
    MissingExtension(String),
    #[error("no acceptable surface format")]
    NoSurfaceFormat,
    #[error("queue setup {0} could not be matched")]
    QueueUnmatched(usize),
}

/// A descriptor accepted for one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptance {
    pub rank: i32,
    pub surface_format: Option<usize>,
}

/// Rank of an accepted descriptor on an adapter of `device_type`.
///
/// Saturates at the `i32` bounds.
pub fn compute_rank(descriptor: &CapabilityDescriptor, device_type: vk::PhysicalDeviceType) -> i32 {
    let mut rank = descriptor.rank_baseline;
    if descriptor.prefer_discrete && device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        rank = rank.saturating_add(PREFERENCE_BONUS);
    }
    if descriptor.prefer_integrated && device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
        rank = rank.saturating_add(PREFERENCE_BONUS);
    }
    rank
}

/// Check one descriptor against one adapter snapshot.
///
/// Surface formats are only checked when `with_surface` is set; a descriptor
/// listing none is then rejected. On success `assignment` holds one queue
/// family per queue setup.
pub fn evaluate(
    descriptor: &CapabilityDescriptor,
    snapshot: &AdapterSnapshot,
    with_surface: bool,
    assignment: &mut Vec<QueueAssignment>,
) -> std::result::Result<Acceptance, Rejection> {
    let available = snapshot.properties.api_version;
    if descriptor.api_version_minimum > available {
        return Err(Rejection::ApiVersion {
            required: descriptor.api_version_minimum,
            available,
        });
    }

    if let Some(name) = descriptor.features.first_unsupported(&snapshot.features) {
        return Err(Rejection::MissingFeature(name));
    }

    if let Some(missing) = descriptor
        .extensions
        .iter()
        .find(|name| !snapshot.has_extension(name))
    {
        return Err(Rejection::MissingExtension(missing.to_string_lossy().into_owned()));
    }

    let mut surface_format = None;
    if with_surface {
        surface_format = descriptor
            .surface_formats
            .iter()
            .position(|format| snapshot.supports_surface_format(*format));
        if surface_format.is_none() {
            return Err(Rejection::NoSurfaceFormat);
        }
    }

    if !match_queue_families(&descriptor.queue_setups, &snapshot.queue_families, assignment) {
        let unmatched = first_unmatched(descriptor, snapshot);
        return Err(Rejection::QueueUnmatched(unmatched));
    }

    Ok(Acceptance {
        rank: compute_rank(descriptor, snapshot.properties.device_type),
        surface_format,
    })
}

// Re-run the matcher on growing prefixes to name the setup that failed.
fn first_unmatched(descriptor: &CapabilityDescriptor, snapshot: &AdapterSnapshot) -> usize {
    let mut scratch = Vec::new();
    (1..=descriptor.queue_setups.len())
        .find(|&len| {
            !match_queue_families(
                &descriptor.queue_setups[..len],
                &snapshot.queue_families,
                &mut scratch,
            )
        })
        .map_or(0, |len| len - 1)
}

struct Best {
    physical_device: vk::PhysicalDevice,
    descriptor_index: usize,
    rank: i32,
    surface_format: Option<usize>,
    device_name: String,
}

/// Pick the best (adapter, descriptor) pairing.
///
/// Returns `Ok(None)` when no adapter satisfies any descriptor; that is an
/// expected outcome the caller has to branch on. On success the winning
/// descriptor's result fields are written; other descriptors are untouched.
/// `presentation` decides which queue families can present, and `surface`
/// enables the surface-format check.
pub fn select_physical_device<S: AdapterSource + ?Sized>(
    source: &S,
    descriptors: &mut [CapabilityDescriptor],
    presentation: &PresentationSupport<'_>,
    surface: Option<vk::SurfaceKHR>,
) -> Result<Option<Selection>> {
    let adapters = source.enumerate_adapters()?;
    tracing::debug!(
        "Ranking {} adapters against {} descriptors",
        adapters.len(),
        descriptors.len()
    );

    let mut snapshot = AdapterSnapshot::default();
    let mut assignment = Vec::new();
    let mut best: Option<Best> = None;
    let mut best_assignment = Vec::new();

    for adapter in adapters {
        snapshot.capture(source, adapter, presentation, surface)?;
        tracing::debug!("Adapter: {}", snapshot.summary());

        for (index, descriptor) in descriptors.iter().enumerate() {
            match evaluate(descriptor, &snapshot, surface.is_some(), &mut assignment) {
                Ok(accepted) => {
                    tracing::debug!(
                        "  descriptor {index} accepted with rank {}",
                        accepted.rank
                    );
                    if best.as_ref().map_or(true, |b| accepted.rank > b.rank) {
                        best = Some(Best {
                            physical_device: adapter,
                            descriptor_index: index,
                            rank: accepted.rank,
                            surface_format: accepted.surface_format,
                            device_name: snapshot.properties.device_name.clone(),
                        });
                        best_assignment.clone_from(&assignment);
                    }
                }
                Err(reason) => tracing::debug!("  descriptor {index} rejected: {reason}"),
            }
        }

        snapshot.clear();
    }

    let Some(best) = best else {
        tracing::warn!("No adapter satisfies any capability descriptor");
        return Ok(None);
    };

    let winner = &mut descriptors[best.descriptor_index];
    winner.physical_device = best.physical_device;
    winner.first_supported_surface_format = best.surface_format;
    commit_assignment(&mut winner.queue_setups, &best_assignment);

    tracing::info!(
        "Selected GPU: {} (descriptor {}, rank {})",
        best.device_name,
        best.descriptor_index,
        best.rank
    );

    Ok(Some(Selection {
        physical_device: best.physical_device,
        descriptor_index: best.descriptor_index,
        rank: best.rank,
        device_name: best.device_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{DeviceFeatures, QueueCapabilities as Q, FEATURE_TABLE};
    use crate::snapshot::{no_presentation, PresentationQuery};
    use crate::testing::{FakeAdapter, FakeAdapters};

    fn all_queues() -> vk::QueueFlags {
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
    }

    fn select(
        adapters: &FakeAdapters,
        descriptors: &mut [CapabilityDescriptor],
    ) -> Option<Selection> {
        select_physical_device(adapters, descriptors, &no_presentation, None).unwrap()
    }

    #[test]
    fn discrete_compute_beats_higher_baseline_transfer() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("discrete").family(all_queues(), 1),
            FakeAdapter::integrated("integrated")
                .family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 2),
        ]);
        let mut descriptors = vec![
            CapabilityDescriptor::new()
                .queue(Q::COMPUTE, 1)
                .prefer_discrete(true),
            CapabilityDescriptor::new()
                .queue(Q::TRANSFER, 1)
                .rank_baseline(5),
        ];

        let selection = select(&adapters, &mut descriptors).unwrap();
        assert_eq!(selection.physical_device, FakeAdapters::handle(0));
        assert_eq!(selection.descriptor_index, 0);
        assert_eq!(selection.rank, 10);
        assert_eq!(descriptors[0].physical_device, FakeAdapters::handle(0));
        assert_eq!(descriptors[0].queue_setups[0].cached_index, Some(0));
        assert_eq!(descriptors[0].queue_setups[0].present_count, 1);
        assert!(!descriptors[1].is_resolved());
        assert_eq!(adapters.enumerations.get(), 1);
    }

    #[test]
    fn compute_descriptor_is_rejected_on_integrated_adapter() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::integrated("integrated")
            .family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 2)]);
        let mut snapshot = AdapterSnapshot::default();
        snapshot
            .capture(&adapters, FakeAdapters::handle(0), &no_presentation, None)
            .unwrap();
        let mut scratch = Vec::new();

        let d1 = CapabilityDescriptor::new().queue(Q::COMPUTE, 1).prefer_discrete(true);
        assert_eq!(
            evaluate(&d1, &snapshot, false, &mut scratch),
            Err(Rejection::QueueUnmatched(0))
        );
        let d2 = CapabilityDescriptor::new().queue(Q::TRANSFER, 1).rank_baseline(5);
        assert_eq!(
            evaluate(&d2, &snapshot, false, &mut scratch).map(|a| a.rank),
            Ok(5)
        );
    }

    #[test]
    fn repeated_runs_pick_the_same_pairing() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::integrated("a").family(all_queues(), 1),
            FakeAdapter::discrete("b").family(all_queues(), 1),
            FakeAdapter::discrete("c").family(vk::QueueFlags::TRANSFER, 1),
        ]);
        let template = vec![
            CapabilityDescriptor::new().queue(Q::GRAPHICS, 1).rank_baseline(1),
            CapabilityDescriptor::new()
                .queue(Q::GRAPHICS, 1)
                .prefer_discrete(true),
        ];

        let first = select(&adapters, &mut template.clone()).unwrap();
        for _ in 0..8 {
            assert_eq!(select(&adapters, &mut template.clone()).unwrap(), first);
        }
        assert_eq!(first.physical_device, FakeAdapters::handle(1));
        assert_eq!(first.descriptor_index, 1);
    }

    #[test]
    fn equal_rank_keeps_earlier_adapter() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("first").family(all_queues(), 1),
            FakeAdapter::discrete("second").family(all_queues(), 1),
        ]);
        let mut descriptors = vec![CapabilityDescriptor::new().queue(Q::GRAPHICS, 1)];
        let selection = select(&adapters, &mut descriptors).unwrap();
        assert_eq!(selection.physical_device, FakeAdapters::handle(0));
        assert_eq!(selection.device_name, "first");
    }

    #[test]
    fn equal_rank_keeps_earlier_descriptor() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu").family(all_queues(), 1)]);
        let mut descriptors = vec![
            CapabilityDescriptor::new().queue(Q::COMPUTE, 1).rank_baseline(2),
            CapabilityDescriptor::new().queue(Q::GRAPHICS, 1).rank_baseline(2),
        ];
        assert_eq!(select(&adapters, &mut descriptors).unwrap().descriptor_index, 0);
        assert!(!descriptors[1].is_resolved());
    }

    #[test]
    fn winner_keeps_results_from_its_own_adapter() {
        // The descriptor also matches the second adapter at a lower rank,
        // on a different family; that must not overwrite the winning match.
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("discrete")
                .family(vk::QueueFlags::GRAPHICS, 1)
                .family(vk::QueueFlags::COMPUTE, 8),
            FakeAdapter::integrated("integrated").family(vk::QueueFlags::COMPUTE, 2),
        ]);
        let mut descriptors = vec![CapabilityDescriptor::new()
            .queue(Q::COMPUTE, 1)
            .prefer_discrete(true)];

        let selection = select(&adapters, &mut descriptors).unwrap();
        assert_eq!(selection.physical_device, FakeAdapters::handle(0));
        assert_eq!(descriptors[0].queue_setups[0].cached_index, Some(1));
        assert_eq!(descriptors[0].queue_setups[0].present_count, 8);
    }

    #[test]
    fn no_match_is_reported_without_touching_descriptors() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")
            .family(vk::QueueFlags::TRANSFER, 1)]);
        let mut descriptors = vec![CapabilityDescriptor::new().queue(Q::GRAPHICS, 1)];
        assert!(select(&adapters, &mut descriptors).is_none());
        assert!(!descriptors[0].is_resolved());
        assert_eq!(descriptors[0].physical_device, vk::PhysicalDevice::null());

        let empty = FakeAdapters::new(Vec::new());
        assert!(select(&empty, &mut descriptors).is_none());
    }

    #[test]
    fn api_version_minimum_is_enforced() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("old")
                .api_version(vk::API_VERSION_1_1)
                .family(all_queues(), 1),
            FakeAdapter::integrated("new").family(all_queues(), 1),
        ]);
        let mut descriptors = vec![CapabilityDescriptor::new()
            .api_version_minimum(vk::API_VERSION_1_3)
            .prefer_discrete(true)];
        let selection = select(&adapters, &mut descriptors).unwrap();
        assert_eq!(selection.device_name, "new");
        assert_eq!(selection.rank, 0);
    }

    #[test]
    fn extensions_must_match_exactly() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("prefix-only").extension(c"VK_KHR_swapchain_mutable_format"),
            FakeAdapter::integrated("exact").extension(c"VK_KHR_swapchain"),
        ]);
        let mut descriptors =
            vec![CapabilityDescriptor::new().require_extension(ash::khr::swapchain::NAME)];
        assert_eq!(select(&adapters, &mut descriptors).unwrap().device_name, "exact");
    }

    #[test]
    fn surface_format_index_is_recorded() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")
            .family(all_queues(), 1)
            .surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)]);
        let mut descriptors = vec![
            CapabilityDescriptor::new()
                .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)
                .rank_baseline(100),
            CapabilityDescriptor::new()
                .surface_format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT)
                .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selection = select_physical_device(
            &adapters,
            &mut descriptors,
            &no_presentation,
            Some(FakeAdapters::surface()),
        )
        .unwrap()
        .unwrap();

        // The first descriptor's format exists, but not with that color space.
        assert_eq!(selection.descriptor_index, 1);
        assert_eq!(descriptors[1].first_supported_surface_format, Some(1));
        assert_eq!(
            descriptors[1].selected_surface_format().map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn descriptor_without_formats_is_rejected_with_surface() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")
            .family(all_queues(), 1)
            .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)]);
        let mut snapshot = AdapterSnapshot::default();
        snapshot
            .capture(&adapters, FakeAdapters::handle(0), &no_presentation, Some(FakeAdapters::surface()))
            .unwrap();
        let mut scratch = Vec::new();

        let descriptor = CapabilityDescriptor::new().queue(Q::GRAPHICS, 1);
        assert_eq!(
            evaluate(&descriptor, &snapshot, true, &mut scratch),
            Err(Rejection::NoSurfaceFormat)
        );
        assert!(evaluate(&descriptor, &snapshot, false, &mut scratch).is_ok());
    }

    #[test]
    fn preference_bonus_saturates() {
        let near_max = CapabilityDescriptor::new()
            .rank_baseline(i32::MAX)
            .prefer_discrete(true);
        assert_eq!(compute_rank(&near_max, vk::PhysicalDeviceType::DISCRETE_GPU), i32::MAX);

        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("discrete").family(all_queues(), 1)]);
        let mut descriptors = vec![near_max, CapabilityDescriptor::new()];
        let selection = select(&adapters, &mut descriptors).unwrap();
        assert_eq!(selection.descriptor_index, 0);
        assert_eq!(selection.rank, i32::MAX);
    }

    #[test]
    fn surface_formats_ignored_without_surface() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")]);
        let mut descriptors = vec![CapabilityDescriptor::new()
            .surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert!(select(&adapters, &mut descriptors).is_some());
        assert_eq!(descriptors[0].first_supported_surface_format, None);
    }

    #[test]
    fn presentation_comes_from_the_predicate() {
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("headless").family(all_queues(), 1),
            FakeAdapter::integrated("display").family(all_queues(), 1),
        ]);
        let mut descriptors = vec![CapabilityDescriptor::new().queue(Q::PRESENT, 1)];
        let presentation =
            |q: &PresentationQuery| q.physical_device == FakeAdapters::handle(1);

        let selection = select_physical_device(&adapters, &mut descriptors, &presentation, None)
            .unwrap()
            .unwrap();
        assert_eq!(selection.device_name, "display");
    }

    #[test]
    fn resolved_queue_indices_are_distinct() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")
            .family(all_queues(), 16)
            .family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8)
            .family(vk::QueueFlags::TRANSFER, 2)]);
        let mut descriptors = vec![CapabilityDescriptor::new()
            .queue(Q::GRAPHICS, 1)
            .queue(Q::COMPUTE, 1)
            .queue(Q::TRANSFER, 1)];
        select(&adapters, &mut descriptors).unwrap();

        let indices: Vec<_> = descriptors[0]
            .queue_setups
            .iter()
            .map(|s| s.cached_index.unwrap())
            .collect();
        for (i, a) in indices.iter().enumerate() {
            assert!(indices[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn adding_a_feature_never_admits_more_adapters() {
        let supported = |names: &[&str]| {
            let mut features = DeviceFeatures::default();
            for name in names {
                assert!(features.set_by_name(name, true));
            }
            features
        };
        let adapters = FakeAdapters::new(vec![
            FakeAdapter::discrete("none"),
            FakeAdapter::discrete("some")
                .features(supported(&["geometry_shader", "buffer_device_address"])),
            FakeAdapter::discrete("more").features(supported(&[
                "geometry_shader",
                "buffer_device_address",
                "dynamic_rendering",
                "synchronization2",
                "shader_int64",
            ])),
            FakeAdapter::discrete("all").features({
                let mut all = DeviceFeatures::default();
                for entry in &FEATURE_TABLE {
                    *(entry.get_mut)(&mut all) = true;
                }
                all
            }),
        ]);
        let handles = adapters.enumerate_adapters().unwrap();

        let accepted = |required: &DeviceFeatures| -> Vec<usize> {
            let descriptor = CapabilityDescriptor::new().features(*required);
            let mut snapshot = AdapterSnapshot::default();
            let mut scratch = Vec::new();
            (0..handles.len())
                .filter(|&i| {
                    snapshot
                        .capture(&adapters, handles[i], &no_presentation, None)
                        .unwrap();
                    evaluate(&descriptor, &snapshot, false, &mut scratch).is_ok()
                })
                .collect()
        };

        let base = supported(&["geometry_shader"]);
        let before = accepted(&base);
        assert_eq!(before, [1, 2, 3]);
        for entry in &FEATURE_TABLE {
            let mut stricter = base;
            *(entry.get_mut)(&mut stricter) = true;
            let after = accepted(&stricter);
            assert!(
                after.iter().all(|i| before.contains(i)),
                "requiring {} admitted a new adapter",
                entry.name
            );
        }
    }

    #[test]
    fn missing_feature_is_named() {
        let adapters = FakeAdapters::new(vec![FakeAdapter::discrete("gpu")]);
        let mut snapshot = AdapterSnapshot::default();
        snapshot
            .capture(&adapters, FakeAdapters::handle(0), &no_presentation, None)
            .unwrap();
        let descriptor = CapabilityDescriptor::new().features(DeviceFeatures {
            multi_draw_indirect: true,
            ..Default::default()
        });
        assert_eq!(
            evaluate(&descriptor, &snapshot, false, &mut Vec::new()),
            Err(Rejection::MissingFeature("multi_draw_indirect"))
        );
    }

    #[test]
    fn rank_applies_matching_preference_only() {
        let descriptor = CapabilityDescriptor::new()
            .rank_baseline(-3)
            .prefer_integrated(true);
        assert_eq!(compute_rank(&descriptor, vk::PhysicalDeviceType::INTEGRATED_GPU), 7);
        assert_eq!(compute_rank(&descriptor, vk::PhysicalDeviceType::DISCRETE_GPU), -3);
        assert_eq!(compute_rank(&descriptor, vk::PhysicalDeviceType::CPU), -3);
    }
}
