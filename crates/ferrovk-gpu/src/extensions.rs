//! Extension and layer availability checks.

use crate::error::{GpuError, Result};
use std::ffi::CStr;

/// Return the first required name that is absent from `available`.
///
/// Names are compared by exact match; a prefix or substring never counts.
pub fn first_missing<'a, 'b>(
    required: &[&'a CStr],
    available: &[&'b CStr],
) -> Option<&'a CStr> {
    required
        .iter()
        .find(|name| !available.iter().any(|candidate| candidate == *name))
        .copied()
}

/// Whether every required name is present in `available`.
pub fn all_present(required: &[&CStr], available: &[&CStr]) -> bool {
    first_missing(required, available).is_none()
}

/// Check that the loader exposes every required instance extension.
///
/// The first missing name is returned as
/// [`GpuError::ExtensionNotSupported`]. With `log` set, both lists are
/// written at debug level.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn require_instance_extensions(
    entry: &ash::Entry,
    required: &[&CStr],
    log: bool,
) -> Result<()> {
    let properties = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(GpuError::call("vkEnumerateInstanceExtensionProperties"))?;
    let available: Vec<&CStr> = properties
        .iter()
        .filter_map(|props| props.extension_name_as_c_str().ok())
        .collect();

    if log {
        for (i, name) in required.iter().enumerate() {
            tracing::debug!("Required extension       [{i:2}] = {}", name.to_string_lossy());
        }
        for (i, name) in available.iter().enumerate() {
            tracing::debug!("Vulkan instance extension[{i:2}] = {}", name.to_string_lossy());
        }
    }

    match first_missing(required, &available) {
        Some(missing) => Err(GpuError::ExtensionNotSupported(
            missing.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

/// Keep the required layers present in `available`, in order.
///
/// A missing layer is skipped with a warning, or returned as
/// [`GpuError::LayerNotSupported`] when `strict` is set.
pub fn select_layers<'a>(
    required: &[&'a CStr],
    available: &[&CStr],
    strict: bool,
) -> Result<Vec<&'a CStr>> {
    let mut layers = Vec::with_capacity(required.len());
    for &layer in required {
        if available.iter().any(|candidate| *candidate == layer) {
            layers.push(layer);
        } else if strict {
            return Err(GpuError::LayerNotSupported(layer.to_string_lossy().into_owned()));
        } else {
            tracing::warn!("Layer {} not available", layer.to_string_lossy());
        }
    }
    Ok(layers)
}

/// Query the loader's instance layers and run [`select_layers`] on them.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn require_instance_layers<'a>(
    entry: &ash::Entry,
    required: &[&'a CStr],
    strict: bool,
) -> Result<Vec<&'a CStr>> {
    let properties = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(GpuError::call("vkEnumerateInstanceLayerProperties"))?;
    let available: Vec<&CStr> = properties
        .iter()
        .filter_map(|props| props.layer_name_as_c_str().ok())
        .collect();
    select_layers(required, &available, strict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_required_name_must_be_present() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xlib_surface", c"VK_EXT_debug_utils"];
        assert!(all_present(&[c"VK_KHR_surface", c"VK_EXT_debug_utils"], &available));
        assert_eq!(
            first_missing(&[c"VK_KHR_surface", c"VK_KHR_win32_surface"], &available),
            Some(c"VK_KHR_win32_surface")
        );
    }

    #[test]
    fn partial_names_do_not_match() {
        let available = [c"VK_KHR_surface_protected_capabilities"];
        assert!(!all_present(&[c"VK_KHR_surface"], &available));

        let available = [c"VK_KHR_surface"];
        assert!(!all_present(&[c"VK_KHR_surface_protected_capabilities"], &available));
    }

    #[test]
    fn empty_requirements_are_satisfied() {
        assert!(all_present(&[], &[]));
        assert!(!all_present(&[c"VK_LAYER_KHRONOS_validation"], &[]));
    }

    #[test]
    fn missing_layers_are_skipped_unless_strict() {
        let available = [c"VK_LAYER_KHRONOS_validation"];
        let required = [c"VK_LAYER_LUNARG_api_dump", c"VK_LAYER_KHRONOS_validation"];

        let layers = select_layers(&required, &available, false).unwrap();
        assert_eq!(layers, [c"VK_LAYER_KHRONOS_validation"]);

        match select_layers(&required, &available, true) {
            Err(GpuError::LayerNotSupported(name)) => assert_eq!(name, "VK_LAYER_LUNARG_api_dump"),
            other => panic!("expected a missing layer, got {other:?}"),
        }
    }
}
