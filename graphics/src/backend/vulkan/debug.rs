//! Validation layer messages forwarded to `log`.

use std::ffi::CStr;

use ash::vk;

use crate::error::{GraphicsError, GraphicsResult};

/// Create a messenger for validation warnings and errors.
pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> GraphicsResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
    })
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or a valid callback data pointer
    // whose message, if present, is nul-terminated.
    let message = unsafe {
        callback_data
            .as_ref()
            .filter(|data| !data.p_message.is_null())
            .map(|data| CStr::from_ptr(data.p_message).to_string_lossy().into_owned())
    }
    .unwrap_or_else(|| String::from("(no message)"));

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan {:?}] {}", message_type, message);
    } else {
        log::warn!("[Vulkan {:?}] {}", message_type, message);
    }

    vk::FALSE
}
