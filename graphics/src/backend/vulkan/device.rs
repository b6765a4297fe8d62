//! Vulkan physical and logical device selection.

use ash::vk;

use crate::error::{GraphicsError, GraphicsResult};

/// Select the physical device, preferring discrete GPUs.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> GraphicsResult<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    let mut best: Option<(u32, vk::PhysicalDevice)> = None;
    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if find_graphics_queue_family(instance, device).is_err() {
            continue;
        }

        let mut score = match properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
            score
        );

        if best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, device));
        }
    }

    best.map(|(_, device)| device).ok_or_else(|| {
        GraphicsError::InitializationFailed("No Vulkan-capable GPU found".to_string())
    })
}

/// Find a queue family that supports graphics operations.
///
/// Blits require a graphics-capable queue.
pub fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> GraphicsResult<u32> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("No graphics queue family found".to_string())
        })
}

/// Create a logical device, enabling anisotropic sampling when available.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> GraphicsResult<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priorities)];

    let supported = unsafe { instance.get_physical_device_features(physical_device) };
    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

    #[allow(unused_mut)]
    let mut device_extensions: Vec<*const std::ffi::c_char> = Vec::new();
    #[cfg(target_os = "macos")]
    {
        device_extensions.push(ash::khr::portability_subset::NAME.as_ptr());
    }

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}
