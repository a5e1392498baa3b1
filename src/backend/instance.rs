// Vulkan Instance - Library loading and instance-level state
//
// Responsibilities:
// - Load the Vulkan loader
// - Verify and enable the window-system surface extensions
// - Optional validation layer + debug messenger routed into `log`

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

const ENGINE_NAME: &CStr = c"Vulkan Tutorial by Intel";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create an instance able to present to windows on `display_handle`
    pub fn new(
        app_name: &str,
        display_handle: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .context("Could not get the number of instance extensions!")?;

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .context("Failed to query surface extensions for this display")?
                .to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        for &name in &extensions {
            let name = unsafe { CStr::from_ptr(name) };
            if !has_extension(&available, name) {
                anyhow::bail!(
                    "Could not find instance extension named \"{}\"!",
                    name.to_string_lossy()
                );
            }
        }

        let app_name = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let layers = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Could not create Vulkan instance!")?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        Ok(Arc::new(Self {
            entry,
            instance,
            debug_utils,
        }))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
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

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Whether `name` is among the enumerated extension properties
pub fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|props| props.extension_name_as_c_str().is_ok_and(|n| n == name))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn finds_listed_extension() {
        let available = [extension("VK_KHR_surface"), extension("VK_KHR_xcb_surface")];
        assert!(has_extension(&available, c"VK_KHR_xcb_surface"));
    }

    #[test]
    fn rejects_prefix_of_listed_extension() {
        let available = [extension("VK_KHR_surface_protected_capabilities")];
        assert!(!has_extension(&available, c"VK_KHR_surface"));
        assert!(!has_extension(&[], c"VK_KHR_surface"));
    }
}
