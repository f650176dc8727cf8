//! Vulkan instance construction
//!
//! Required layers and extensions are checked up front against what the
//! loader reports; a missing one fails startup with a
//! `MissingRequiredCapability` naming it, before any instance or device is
//! created. Validation is a runtime option so the same binary can run with
//! or without it.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use ash::extensions::ext::DebugUtils;
use ash::vk;
use ash::{Entry, Instance};

use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::window::WindowHandle;

/// The Khronos validation layer enabled when validation is requested
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan entry, instance and optional debug messenger
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    utils: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl VulkanInstance {
    /// Create the instance for a window, optionally with validation layers
    pub fn new(window: &WindowHandle, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to load Vulkan: {:?}", e))
        })?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("invalid app name".to_string()))?;
        let engine_name_cstr = CString::new("render_engine").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Check layers before anything is created so a missing one fails
        // with the layer's name rather than a generic instance error
        let required_layers = required_layers(enable_validation);
        let available_layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?;
        let layers = gather_layers(&available_layers, &required_layers)?;
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let mut required_extensions = window.required_instance_extensions();
        if enable_validation {
            required_extensions.push(
                DebugUtils::name()
                    .to_str()
                    .expect("extension name is valid UTF-8")
                    .to_string(),
            );
        }
        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?;
        let extensions = gather_extensions(&available_extensions, &required_extensions)?;
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug = if enable_validation {
            let utils = DebugUtils::new(&entry, &instance);
            let messenger = create_debug_messenger(&utils)?;
            log::debug!("Validation layer and debug messenger enabled");
            Some(DebugMessenger { utils, messenger })
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// The Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The instance handle
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Whether validation was enabled at construction
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .utils
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn required_layers(enable_validation: bool) -> Vec<String> {
    if enable_validation {
        vec![VALIDATION_LAYER.to_string()]
    } else {
        Vec::new()
    }
}

fn create_debug_messenger(utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe {
        utils
            .create_debug_utils_messenger(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Routes validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Convert a fixed-size C name array into a `str`
pub(crate) fn name_from_raw(raw: &[c_char]) -> std::borrow::Cow<'_, str> {
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy()
}

/// Verify every required layer is available, returning their C names
///
/// Fails with the first missing layer's name so startup diagnostics point at
/// the exact capability to install.
pub fn gather_layers(
    available: &[vk::LayerProperties],
    required: &[String],
) -> VulkanResult<Vec<CString>> {
    let mut layers = Vec::with_capacity(required.len());

    for layer in required {
        let found = available
            .iter()
            .any(|properties| name_from_raw(&properties.layer_name).as_ref() == layer.as_str());
        if !found {
            return Err(VulkanError::MissingRequiredCapability(format!(
                "layer {}",
                layer
            )));
        }
        layers.push(CString::new(layer.as_str()).expect("layer names contain no NUL"));
    }

    Ok(layers)
}

/// Verify every required extension is available, returning their C names
pub fn gather_extensions(
    available: &[vk::ExtensionProperties],
    required: &[String],
) -> VulkanResult<Vec<CString>> {
    let mut extensions = Vec::with_capacity(required.len());

    for extension in required {
        let found = available
            .iter()
            .any(|properties| name_from_raw(&properties.extension_name).as_ref() == extension.as_str());
        if !found {
            return Err(VulkanError::MissingRequiredCapability(format!(
                "extension {}",
                extension
            )));
        }
        extensions.push(CString::new(extension.as_str()).expect("extension names contain no NUL"));
    }

    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_named(name: &str) -> vk::LayerProperties {
        let mut properties = vk::LayerProperties::default();
        for (slot, byte) in properties.layer_name.iter_mut().zip(name.bytes()) {
            *slot = byte as c_char;
        }
        properties
    }

    fn extension_named(name: &str) -> vk::ExtensionProperties {
        let mut properties = vk::ExtensionProperties::default();
        for (slot, byte) in properties.extension_name.iter_mut().zip(name.bytes()) {
            *slot = byte as c_char;
        }
        properties
    }

    #[test]
    fn gather_layers_accepts_available_set() {
        let available = vec![layer_named(VALIDATION_LAYER), layer_named("VK_LAYER_other")];
        let required = vec![VALIDATION_LAYER.to_string()];

        let gathered = gather_layers(&available, &required).expect("layer is available");
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0].to_str().unwrap(), VALIDATION_LAYER);
    }

    #[test]
    fn missing_layer_fails_fast_with_its_name() {
        let available = vec![layer_named("VK_LAYER_other")];
        let required = vec![VALIDATION_LAYER.to_string()];

        match gather_layers(&available, &required) {
            Err(VulkanError::MissingRequiredCapability(message)) => {
                assert!(
                    message.contains(VALIDATION_LAYER),
                    "diagnostic should name the missing layer, got: {}",
                    message
                );
            }
            other => panic!("expected MissingRequiredCapability, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn gather_extensions_reports_missing_extension() {
        let available = vec![extension_named("VK_KHR_surface")];
        let required = vec!["VK_KHR_swapchain".to_string()];

        match gather_extensions(&available, &required) {
            Err(VulkanError::MissingRequiredCapability(message)) => {
                assert!(message.contains("VK_KHR_swapchain"));
            }
            other => panic!("expected MissingRequiredCapability, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_requirements_always_gather() {
        assert!(gather_layers(&[], &[]).unwrap().is_empty());
        assert!(gather_extensions(&[], &[]).unwrap().is_empty());
    }
}
