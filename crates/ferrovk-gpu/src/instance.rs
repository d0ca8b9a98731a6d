//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use crate::extensions::{require_instance_extensions, require_instance_layers};
use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Standard validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Surface extensions for the current platform.
pub fn platform_surface_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ]
}

/// Instance creation parameters.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: u32,
    pub extensions: Vec<&'static CStr>,
    pub layers: Vec<&'static CStr>,
    pub flags: vk::InstanceCreateFlags,
    /// Create a debug-utils messenger that forwards into `tracing`.
    pub debug_utils: bool,
    /// Write the required and available extension lists at debug level.
    pub log_extensions: bool,
    /// Fail instead of warning when a requested layer is missing.
    pub strict_layers: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        let flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let flags = vk::InstanceCreateFlags::empty();

        Self {
            app_name: "ferrovk".to_string(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "ferrovk".to_string(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_3,
            extensions: Vec::new(),
            layers: Vec::new(),
            flags,
            debug_utils: false,
            log_extensions: false,
            strict_layers: false,
        }
        .validation(cfg!(debug_assertions))
    }
}

impl InstanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Add an instance extension, ignoring duplicates.
    pub fn extension(mut self, name: &'static CStr) -> Self {
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
        self
    }

    /// Add the platform's surface extensions.
    pub fn with_surface_extensions(mut self) -> Self {
        for name in platform_surface_extensions() {
            self = self.extension(name);
        }
        self
    }

    /// Enable the validation layer and debug-utils messenger.
    pub fn validation(mut self, enable: bool) -> Self {
        if enable {
            if !self.layers.contains(&VALIDATION_LAYER) {
                self.layers.push(VALIDATION_LAYER);
            }
            self = self.extension(ash::ext::debug_utils::NAME);
        } else {
            self.layers.retain(|layer| *layer != VALIDATION_LAYER);
            self.extensions.retain(|ext| *ext != ash::ext::debug_utils::NAME);
        }
        self.debug_utils = enable;
        self
    }

    pub fn log_extensions(mut self, log: bool) -> Self {
        self.log_extensions = log;
        self
    }

    /// Treat a missing layer as an error.
    pub fn strict_layers(mut self, strict: bool) -> Self {
        self.strict_layers = strict;
        self
    }
}

/// A debug-utils messenger and the loader needed to destroy it.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// # Safety
    /// The instance must have been created with `VK_EXT_debug_utils`.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = messenger_create_info();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(GpuError::call("vkCreateDebugUtilsMessengerEXT"))?;
        Ok(Self { loader, messenger })
    }

    /// # Safety
    /// Must be called before the owning instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() {
        Cow::Borrowed("")
    } else {
        // SAFETY: the loader passes a valid callback data pointer for the
        // duration of the call.
        unsafe { (*p_callback_data).message_as_c_str() }
            .map_or(Cow::Borrowed(""), CStr::to_string_lossy)
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", "[{message_type:?}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", "[{message_type:?}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::debug!(target: "vulkan", "[{message_type:?}] {message}");
        }
        _ => tracing::trace!(target: "vulkan", "[{message_type:?}] {message}"),
    }

    vk::FALSE
}

/// Create a Vulkan instance, plus a debug messenger when
/// `config.debug_utils` is set.
///
/// Missing layers are dropped with a warning unless `config.strict_layers`
/// is set. A missing extension is an error.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    config: &InstanceConfig,
) -> Result<(ash::Instance, Option<DebugMessenger>)> {
    let app_name = CString::new(config.app_name.as_str())
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;
    let engine_name = CString::new(config.engine_name.as_str())
        .map_err(|e| GpuError::Other(format!("Invalid engine name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(config.app_version)
        .engine_name(&engine_name)
        .engine_version(config.engine_version)
        .api_version(config.api_version);

    unsafe { require_instance_extensions(entry, &config.extensions, config.log_extensions) }?;
    let layers = unsafe { require_instance_layers(entry, &config.layers, config.strict_layers) }?;

    let extension_names: Vec<*const c_char> =
        config.extensions.iter().map(|ext| ext.as_ptr()).collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(config.flags);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(GpuError::call("vkCreateInstance"))?;

    tracing::debug!(
        "Vulkan instance created: {} extensions, {} layers",
        extension_names.len(),
        layer_names.len()
    );

    if !config.debug_utils {
        return Ok((instance, None));
    }
    match unsafe { DebugMessenger::new(entry, &instance) } {
        Ok(messenger) => Ok((instance, Some(messenger))),
        Err(err) => {
            unsafe { instance.destroy_instance(None) };
            Err(err)
        }
    }
}
