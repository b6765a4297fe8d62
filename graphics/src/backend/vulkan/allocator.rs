//! GPU memory allocation using gpu-allocator.

use ash::vk;
use gpu_allocator::AllocationError;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::backend::MemoryLocation;
use crate::error::{GraphicsError, GraphicsResult};

/// Create the memory allocator for the device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> GraphicsResult<Allocator> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })
}

/// Map a memory location to gpu-allocator's.
pub fn convert_location(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}

/// Map an allocation failure, keeping exhaustion distinguishable.
pub fn convert_allocation_error(error: AllocationError) -> GraphicsError {
    match error {
        AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
        other => {
            GraphicsError::ResourceCreationFailed(format!("Failed to allocate memory: {}", other))
        }
    }
}
