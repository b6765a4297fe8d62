//! Vulkan command pool and one-shot submission.

use std::sync::Arc;

use ash::vk;

use crate::backend::CommandStream;
use crate::error::{GraphicsError, GraphicsResult};

use super::VulkanDevice;

/// Create a command pool for graphics operations.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> GraphicsResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::TRANSIENT);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
    })
}

/// Record a primary command buffer with `record`, submit it and wait for it.
///
/// The caller must hold exclusive access to `pool` and `queue`.
pub fn submit_one_shot(
    device: &Arc<VulkanDevice>,
    pool: vk::CommandPool,
    queue: vk::Queue,
    record: impl FnOnce(&mut CommandStream) -> GraphicsResult<()>,
) -> GraphicsResult<()> {
    let raw = device.raw();
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffers = unsafe { raw.allocate_command_buffers(&alloc_info) }
        .map_err(|e| map_vk_error("allocate command buffer", e))?;
    let command_buffer = command_buffers[0];

    let result = (|| {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { raw.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| map_vk_error("begin command buffer", e))?;

        let mut stream = CommandStream::Vulkan {
            device: Arc::clone(device),
            command_buffer,
        };
        record(&mut stream)?;

        unsafe { raw.end_command_buffer(command_buffer) }
            .map_err(|e| map_vk_error("end command buffer", e))?;

        let fence = unsafe { raw.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| map_vk_error("create fence", e))?;
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submitted = unsafe { raw.queue_submit(queue, &[submit_info], fence) }
            .and_then(|()| unsafe { raw.wait_for_fences(&[fence], true, u64::MAX) });
        unsafe { raw.destroy_fence(fence, None) };
        submitted.map_err(|e| map_vk_error("submit commands", e))
    })();

    unsafe { raw.free_command_buffers(pool, &command_buffers) };
    result
}

/// Map a Vulkan error, keeping memory exhaustion and device loss distinguishable.
pub fn map_vk_error(what: &str, error: vk::Result) -> GraphicsError {
    match error {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        other => GraphicsError::ResourceCreationFailed(format!("Failed to {}: {:?}", what, other)),
    }
}
