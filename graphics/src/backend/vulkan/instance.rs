//! Headless Vulkan instance creation.

use std::ffi::CStr;

use ash::vk;

use crate::error::{GraphicsError, GraphicsResult};

use super::debug;

/// Vulkan 1.1 covers everything texture uploads and blits need and is
/// available through MoltenVK.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 1, 0);

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance together with its optional validation messenger.
pub struct InstanceParts {
    pub instance: ash::Instance,
    pub debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

/// Create a Vulkan instance without surface extensions.
pub fn create_instance(
    entry: &ash::Entry,
    validation_enabled: bool,
) -> GraphicsResult<InstanceParts> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);
    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(c"texvault")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"texvault")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions = Vec::new();
    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const std::ffi::c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();
    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    if !validation_available {
        return Ok(InstanceParts {
            instance,
            debug_utils: None,
            debug_messenger: None,
        });
    }

    let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
    match debug::create_debug_messenger(&debug_utils) {
        Ok(messenger) => Ok(InstanceParts {
            instance,
            debug_utils: Some(debug_utils),
            debug_messenger: Some(messenger),
        }),
        Err(e) => {
            unsafe { instance.destroy_instance(None) };
            Err(e)
        }
    }
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    available_layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
    })
}
