//! Vulkan backend implementation using ash.
//!
//! Headless: no surface or swapchain. The backend creates images, memory,
//! views, buffers and samplers for the texture lifecycle code; drawing is the
//! host renderer's business.
//!
//! Owned handles keep an `Arc<VulkanDevice>`, so the logical device and the
//! allocator outlive every object created from them.

mod allocator;
mod command;
pub(crate) mod conversion;
mod debug;
mod device;
mod instance;

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use parking_lot::Mutex;
use texvault_core::sampler::SamplerDescriptor;
use texvault_core::texture::{Extent2d, TextureFormat};

use crate::error::{GraphicsError, GraphicsResult};

use super::{
    BufferUsage, CommandStream, DeviceCapabilities, FormatSupport, GpuBackend, GpuBuffer,
    GpuImage, GpuImageView, GpuMemory, GpuSampler, ImageDescriptor, ImageViewDescriptor,
    MemoryLocation,
};

pub use command::map_vk_error;

use self::conversion::{
    convert_address_mode, convert_aspect, convert_border_color, convert_buffer_usage,
    convert_filter_mode, convert_image_layout, convert_image_usage, convert_mipmap_filter_mode,
    convert_texture_format, convert_tiling,
};

/// Logical device, its instance and the memory allocator.
///
/// Shared by the backend and every handle created from it.
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    /// Taken on drop so it is released before the device.
    allocator: Mutex<Option<Allocator>>,
}

impl VulkanDevice {
    /// The logical device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// The Vulkan instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// The selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> GraphicsResult<Allocation> {
        let mut allocator = self.allocator.lock();
        let allocator = allocator
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("allocator already released".to_string()))?;
        allocator
            .allocate(desc)
            .map_err(allocator::convert_allocation_error)
    }

    pub(crate) fn free(&self, allocation: Allocation) {
        match self.allocator.lock().as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    log::error!("Failed to free allocation: {}", e);
                }
            }
            None => log::warn!("Allocation freed after the allocator was released"),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // The allocator frees its memory blocks through the device.
            drop(self.allocator.lock().take());

            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
        log::info!("Vulkan device destroyed");
    }
}

/// Vulkan-based GPU backend using ash.
///
/// - Validation layers enabled in debug builds
/// - gpu-allocator for memory management
/// - Transient command pool for one-shot submissions
pub struct VulkanBackend {
    device: Arc<VulkanDevice>,
    queue_family: u32,
    /// Queue and command pool, externally synchronized together.
    submission: Mutex<(vk::Queue, vk::CommandPool)>,
    capabilities: DeviceCapabilities,
    validation_enabled: bool,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("queue_family", &self.queue_family)
            .field("capabilities", &self.capabilities)
            .field("validation_enabled", &self.validation_enabled)
            .finish()
    }
}

impl VulkanBackend {
    /// Create a Vulkan backend.
    ///
    /// Initializes the instance, selects a physical device, creates a logical
    /// device with one graphics queue and sets up the memory allocator.
    pub fn new(validation_enabled: bool) -> GraphicsResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let parts = instance::create_instance(&entry, validation_enabled)?;
        let destroy_instance = |parts: &instance::InstanceParts| unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&parts.debug_utils, parts.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            parts.instance.destroy_instance(None);
        };

        let selected = device::select_physical_device(&parts.instance).and_then(|physical| {
            let family = device::find_graphics_queue_family(&parts.instance, physical)?;
            let logical = device::create_logical_device(&parts.instance, physical, family)?;
            Ok((physical, family, logical))
        });
        let (physical_device, queue_family, logical) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(&parts);
                return Err(e);
            }
        };

        let allocator =
            match allocator::create_allocator(&parts.instance, physical_device, logical.clone()) {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe { logical.destroy_device(None) };
                    destroy_instance(&parts);
                    return Err(e);
                }
            };

        let capabilities = query_capabilities(&parts.instance, physical_device);
        let device = Arc::new(VulkanDevice {
            _entry: entry,
            instance: parts.instance,
            debug_utils: parts.debug_utils,
            debug_messenger: parts.debug_messenger,
            physical_device,
            device: logical,
            allocator: Mutex::new(Some(allocator)),
        });

        let queue = unsafe { device.raw().get_device_queue(queue_family, 0) };
        let command_pool = command::create_command_pool(device.raw(), queue_family)?;

        log::info!(
            "Vulkan backend initialized (validation: {}, anisotropy: {}, max {})",
            validation_enabled,
            capabilities.sampler_anisotropy,
            capabilities.max_sampler_anisotropy
        );

        Ok(Self {
            device,
            queue_family,
            submission: Mutex::new((queue, command_pool)),
            capabilities,
            validation_enabled,
        })
    }

    /// The shared device.
    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Graphics queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Record commands with `record`, submit them and wait for completion.
    pub fn submit_and_wait(
        &self,
        record: impl FnOnce(&mut CommandStream) -> GraphicsResult<()>,
    ) -> GraphicsResult<()> {
        let submission = self.submission.lock();
        let (queue, pool) = *submission;
        command::submit_one_shot(&self.device, pool, queue, record)
    }

    fn vulkan_image(image: &GpuImage) -> GraphicsResult<vk::Image> {
        match image {
            GpuImage::Vulkan { image, .. } => Ok(*image),
            _ => Err(GraphicsError::InvalidParameter(
                "image belongs to another backend".to_string(),
            )),
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let (_, pool) = *self.submission.lock();
        unsafe {
            let _ = self.device.raw().device_wait_idle();
            self.device.raw().destroy_command_pool(pool, None);
        }
    }
}

fn query_capabilities(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> DeviceCapabilities {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };
    DeviceCapabilities {
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
        // MoltenVK ignores sampler LOD bias.
        mip_lod_bias: !cfg!(any(target_os = "macos", target_os = "ios")),
        max_image_dimension: properties.limits.max_image_dimension2_d,
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan (ash)"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn format_support(&self, format: TextureFormat) -> FormatSupport {
        let vk_format = convert_texture_format(format);
        if vk_format == vk::Format::UNDEFINED {
            return FormatSupport::default();
        }
        let properties = unsafe {
            self.device
                .instance()
                .get_physical_device_format_properties(self.device.physical_device(), vk_format)
        };
        let optimal = properties.optimal_tiling_features;
        FormatSupport {
            optimal_sampled: optimal.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE),
            linear_sampled: properties
                .linear_tiling_features
                .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE),
            blit_src: optimal.contains(vk::FormatFeatureFlags::BLIT_SRC),
            blit_dst: optimal.contains(vk::FormatFeatureFlags::BLIT_DST),
            linear_filter: optimal.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR),
            attachment: optimal.intersects(
                vk::FormatFeatureFlags::COLOR_ATTACHMENT
                    | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
        }
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> GraphicsResult<GpuImage> {
        let format = convert_texture_format(descriptor.format);
        if format == vk::Format::UNDEFINED || descriptor.extent.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "cannot create {}x{} image of format {:?}",
                descriptor.extent.width, descriptor.extent.height, descriptor.format
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.extent.width,
                height: descriptor.extent.height,
                depth: 1,
            })
            .mip_levels(descriptor.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(convert_tiling(descriptor.tiling))
            .usage(convert_image_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(convert_image_layout(descriptor.initial_layout));

        let image = unsafe { self.device.raw().create_image(&image_info, None) }
            .map_err(|e| map_vk_error("create image", e))?;

        log::trace!(
            "VulkanBackend: created image {:?} {:?} ({}x{}, {} levels)",
            descriptor.label,
            image,
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.mip_levels
        );

        Ok(GpuImage::Vulkan {
            device: Arc::clone(&self.device),
            image,
        })
    }

    fn allocate_image_memory(
        &self,
        image: &GpuImage,
        location: MemoryLocation,
        linear: bool,
    ) -> GraphicsResult<GpuMemory> {
        let image = Self::vulkan_image(image)?;
        let requirements = unsafe { self.device.raw().get_image_memory_requirements(image) };

        let allocation = self.device.allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: allocator::convert_location(location),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let bound = unsafe {
            self.device
                .raw()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.device.free(allocation);
            return Err(map_vk_error("bind image memory", e));
        }

        Ok(GpuMemory::Vulkan {
            device: Arc::clone(&self.device),
            allocation: Some(allocation),
        })
    }

    fn create_image_view(
        &self,
        image: &GpuImage,
        descriptor: &ImageViewDescriptor,
    ) -> GraphicsResult<GpuImageView> {
        let image = Self::vulkan_image(image)?;
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert_texture_format(descriptor.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: convert_aspect(descriptor.aspect),
                base_mip_level: descriptor.base_mip_level,
                level_count: descriptor.level_count,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { self.device.raw().create_image_view(&view_info, None) }
            .map_err(|e| map_vk_error("create image view", e))?;

        Ok(GpuImageView::Vulkan {
            device: Arc::clone(&self.device),
            view,
        })
    }

    fn create_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> GraphicsResult<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(convert_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.raw().create_buffer(&buffer_info, None) }
            .map_err(|e| map_vk_error("create buffer", e))?;
        let requirements = unsafe { self.device.raw().get_buffer_memory_requirements(buffer) };

        let allocation = match self.device.allocate(&AllocationCreateDesc {
            name: "staging",
            requirements,
            location: allocator::convert_location(location),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.raw().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on the handle owns both halves and releases them on drop.
        let handle = GpuBuffer::Vulkan {
            device: Arc::clone(&self.device),
            buffer,
            allocation: Some(allocation),
            size,
        };
        let GpuBuffer::Vulkan {
            allocation: Some(allocation),
            ..
        } = &handle
        else {
            return Err(GraphicsError::Internal("buffer lost its allocation".to_string()));
        };
        unsafe {
            self.device
                .raw()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .map_err(|e| map_vk_error("bind buffer memory", e))?;

        Ok(handle)
    }

    fn write_linear_image(
        &self,
        image: &GpuImage,
        memory: &mut GpuMemory,
        extent: Extent2d,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> GraphicsResult<()> {
        let image = Self::vulkan_image(image)?;
        let row_bytes = extent.width as usize * bytes_per_pixel as usize;
        if data.len() < row_bytes * extent.height as usize {
            return Err(GraphicsError::InvalidParameter(format!(
                "linear write of {} bytes into {}x{} image",
                data.len(),
                extent.width,
                extent.height
            )));
        }

        let layout = unsafe {
            self.device.raw().get_image_subresource_layout(
                image,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };

        let GpuMemory::Vulkan {
            allocation: Some(allocation),
            ..
        } = memory
        else {
            return Err(GraphicsError::InvalidParameter(
                "memory belongs to another backend".to_string(),
            ));
        };
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| GraphicsError::Internal("linear image is not mapped".to_string()))?;

        for (row, src) in data.chunks_exact(row_bytes).take(extent.height as usize).enumerate() {
            let start = layout.offset as usize + row * layout.row_pitch as usize;
            let dst = mapped.get_mut(start..start + row_bytes).ok_or_else(|| {
                GraphicsError::Internal("linear image row outside its mapping".to_string())
            })?;
            dst.copy_from_slice(src);
        }
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<GpuSampler> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.mag_filter))
            .min_filter(convert_filter_mode(descriptor.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(descriptor.mipmap_filter))
            .address_mode_u(convert_address_mode(descriptor.address_mode_u))
            .address_mode_v(convert_address_mode(descriptor.address_mode_v))
            .address_mode_w(convert_address_mode(descriptor.address_mode_w))
            .mip_lod_bias(descriptor.mip_lod_bias)
            .anisotropy_enable(descriptor.anisotropy_enable)
            .max_anisotropy(descriptor.max_anisotropy)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(descriptor.lod_min_clamp)
            .max_lod(descriptor.lod_max_clamp)
            .border_color(convert_border_color(descriptor.border_color))
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.device.raw().create_sampler(&sampler_info, None) }
            .map_err(|e| map_vk_error("create sampler", e))?;

        log::trace!(
            "VulkanBackend: created sampler {:?} {:?}",
            descriptor.label,
            sampler
        );

        Ok(GpuSampler::Vulkan {
            device: Arc::clone(&self.device),
            sampler,
        })
    }
}

static_assertions::assert_impl_all!(VulkanDevice: Send, Sync);
