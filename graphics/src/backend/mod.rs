//! GPU backend abstraction layer.
//!
//! The texture lifecycle code never talks to a graphics API directly. It
//! consumes a [`GpuBackend`] capability object for hardware object creation
//! and a [`CommandStream`] for recording uploads, and it holds hardware
//! objects through exclusive-ownership handles that destroy themselves on
//! drop.
//!
//! # Available Backends
//!
//! - `dummy` (always): no hardware, keeps a [`DummyLedger`] of every creation,
//!   destruction and recorded command. Used by the tests.
//! - `vulkan-backend`: native Vulkan using ash and gpu-allocator.
//!
//! # Handles
//!
//! | Owned handle     | Raw identity    | Destroyed on drop        |
//! |------------------|-----------------|--------------------------|
//! | [`GpuImage`]     | [`RawImage`]    | image                    |
//! | [`GpuImageView`] | [`RawImageView`]| image view               |
//! | [`GpuMemory`]    | -               | device memory allocation |
//! | [`GpuBuffer`]    | [`RawBuffer`]   | buffer and its memory    |
//! | [`GpuSampler`]   | [`RawSampler`]  | sampler                  |
//!
//! Owned handles are move-only; `Option<Handle>` with `None` is the
//! moved-from state. Raw identities are plain `Copy` values and never destroy
//! anything.

pub mod command;
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;

use bitflags::bitflags;
use texvault_core::sampler::SamplerDescriptor;
use texvault_core::texture::{Extent2d, TextureFormat};

use crate::error::{GraphicsError, GraphicsResult};

pub use command::{BufferImageCopy, CommandStream, ImageLayout};
pub use dummy::{DummyBackend, DummyLedger, DummyOptions, RecordedCommand, ResourceKind};

#[cfg(feature = "vulkan-backend")]
use ash::vk;
#[cfg(feature = "vulkan-backend")]
use vulkan::VulkanDevice;

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be copied or blitted from.
        const COPY_SRC = 1 << 0;
        /// Image can be copied or blitted to.
        const COPY_DST = 1 << 1;
        /// Image can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Image can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 3;
        /// Image can be used as a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 4;
        /// Image can be read as an input attachment.
        const INPUT_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer is a copy source.
        const COPY_SRC = 1 << 0;
        /// Buffer is a copy destination.
        const COPY_DST = 1 << 1;
    }
}

bitflags! {
    /// Image aspects addressed by a view or barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl ImageAspect {
    /// Aspects covered by a full view of `format`.
    pub fn for_format(format: TextureFormat) -> Self {
        if format.has_stencil() {
            Self::DEPTH | Self::STENCIL
        } else if format.is_depth_stencil() {
            Self::DEPTH
        } else {
            Self::COLOR
        }
    }
}

/// Image memory arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageTiling {
    /// Implementation-defined layout, only reachable through copies.
    #[default]
    Optimal,
    /// Row-major layout the host can write directly.
    Linear,
}

/// Where an allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device-local, not host visible.
    GpuOnly,
    /// Host visible, used for uploads.
    CpuToGpu,
    /// Host visible and cached, used for readback.
    GpuToCpu,
}

/// Descriptor for creating a 2D image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Debug label.
    pub label: Option<String>,
    pub extent: Extent2d,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub tiling: ImageTiling,
    pub usage: ImageUsage,
    /// `Undefined` or `Preinitialized`.
    pub initial_layout: ImageLayout,
}

impl ImageDescriptor {
    /// Create a single-level optimal-tiling descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: ImageUsage) -> Self {
        Self {
            label: None,
            extent: Extent2d::new(width, height),
            format,
            mip_levels: 1,
            tiling: ImageTiling::Optimal,
            usage,
            initial_layout: ImageLayout::Undefined,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    /// Use host-writable linear tiling with a preinitialized layout.
    pub fn with_linear_tiling(mut self) -> Self {
        self.tiling = ImageTiling::Linear;
        self.initial_layout = ImageLayout::Preinitialized;
        self
    }
}

/// Descriptor for creating a 2D image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageViewDescriptor {
    pub format: TextureFormat,
    pub aspect: ImageAspect,
    pub base_mip_level: u32,
    pub level_count: u32,
}

impl ImageViewDescriptor {
    /// View over every mip level of `format` with its natural aspects.
    pub fn full(format: TextureFormat, level_count: u32) -> Self {
        Self {
            format,
            aspect: ImageAspect::for_format(format),
            base_mip_level: 0,
            level_count,
        }
    }

    /// Restrict the view to `aspect`.
    pub fn with_aspect(mut self, aspect: ImageAspect) -> Self {
        self.aspect = aspect;
        self
    }
}

/// What the device can do with one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatSupport {
    /// Optimal-tiling images can be sampled.
    pub optimal_sampled: bool,
    /// Linear-tiling images can be sampled.
    pub linear_sampled: bool,
    /// Optimal-tiling images can be blit sources.
    pub blit_src: bool,
    /// Optimal-tiling images can be blit destinations.
    pub blit_dst: bool,
    /// Optimal-tiling images support linear filtering.
    pub linear_filter: bool,
    /// Optimal-tiling images can be color or depth/stencil attachments.
    pub attachment: bool,
}

impl FormatSupport {
    /// Support for every feature.
    pub const fn all() -> Self {
        Self {
            optimal_sampled: true,
            linear_sampled: true,
            blit_src: true,
            blit_dst: true,
            linear_filter: true,
            attachment: true,
        }
    }

    /// The format can be sampled through some tiling.
    pub fn supports_sampling(&self) -> bool {
        self.optimal_sampled || self.linear_sampled
    }

    /// Mip levels can be produced by linear blits on the device.
    pub fn supports_mip_blit(&self) -> bool {
        self.blit_src && self.blit_dst && self.linear_filter
    }
}

/// Device-wide capabilities relevant to texture handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
    /// Anisotropic sampling is available.
    pub sampler_anisotropy: bool,
    /// Maximum sampler anisotropy.
    pub max_sampler_anisotropy: f32,
    /// Sampler LOD bias is honored.
    pub mip_lod_bias: bool,
    /// Maximum 2D image dimension.
    pub max_image_dimension: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            sampler_anisotropy: true,
            max_sampler_anisotropy: 16.0,
            mip_lod_bias: true,
            max_image_dimension: 16384,
        }
    }
}

// ============================================================================
// Raw identities
// ============================================================================

/// Copyable identity of a hardware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawImage {
    Dummy(u64),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Image),
}

/// Copyable identity of a hardware image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawImageView {
    Dummy(u64),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::ImageView),
}

/// Copyable identity of a hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawBuffer {
    Dummy(u64),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Buffer),
}

/// Copyable identity of a hardware sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawSampler {
    Dummy(u64),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Sampler),
}

// ============================================================================
// Owned handles
// ============================================================================

/// Exclusively owned hardware image.
pub enum GpuImage {
    /// Dummy backend image.
    Dummy { id: u64, ledger: Arc<DummyLedger> },
    /// Vulkan backend image.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        image: vk::Image,
    },
}

impl GpuImage {
    /// Copyable identity of this image.
    pub fn raw(&self) -> RawImage {
        match self {
            Self::Dummy { id, .. } => RawImage::Dummy(*id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { image, .. } => RawImage::Vulkan(*image),
        }
    }
}

/// Exclusively owned hardware image view.
pub enum GpuImageView {
    /// Dummy backend view.
    Dummy { id: u64, ledger: Arc<DummyLedger> },
    /// Vulkan backend view.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        view: vk::ImageView,
    },
}

impl GpuImageView {
    /// Copyable identity of this view.
    pub fn raw(&self) -> RawImageView {
        match self {
            Self::Dummy { id, .. } => RawImageView::Dummy(*id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { view, .. } => RawImageView::Vulkan(*view),
        }
    }
}

/// Exclusively owned device memory allocation backing an image.
pub enum GpuMemory {
    /// Dummy backend allocation.
    Dummy {
        id: u64,
        size: u64,
        ledger: Arc<DummyLedger>,
    },
    /// Vulkan backend allocation from gpu-allocator.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        allocation: Option<gpu_allocator::vulkan::Allocation>,
    },
}

impl GpuMemory {
    /// Size of the allocation in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { size, .. } => *size,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { allocation, .. } => allocation.as_ref().map_or(0, |a| a.size()),
        }
    }
}

/// Exclusively owned buffer together with its memory.
///
/// Used as the staging hop for uploads and as the readback target of
/// attachments.
pub enum GpuBuffer {
    /// Dummy backend buffer. Keeps its contents so tests can inspect uploads.
    Dummy {
        id: u64,
        contents: Vec<u8>,
        ledger: Arc<DummyLedger>,
    },
    /// Vulkan backend buffer.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        buffer: vk::Buffer,
        allocation: Option<gpu_allocator::vulkan::Allocation>,
        size: u64,
    },
}

impl GpuBuffer {
    /// Copyable identity of this buffer.
    pub fn raw(&self) -> RawBuffer {
        match self {
            Self::Dummy { id, .. } => RawBuffer::Dummy(*id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, .. } => RawBuffer::Vulkan(*buffer),
        }
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { contents, .. } => contents.len() as u64,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { size, .. } => *size,
        }
    }

    /// Copy `data` into the buffer at `offset` through its host mapping.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= self.size())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "write of {} bytes at {} overflows {}-byte buffer",
                    data.len(),
                    offset,
                    self.size()
                ))
            })?;
        let range = offset as usize..end as usize;
        match self {
            Self::Dummy {
                contents, ledger, ..
            } => {
                contents[range].copy_from_slice(data);
                ledger.note_host_write(data.len());
                Ok(())
            }
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { allocation, .. } => {
                let mapped = allocation
                    .as_mut()
                    .and_then(|a| a.mapped_slice_mut())
                    .ok_or_else(|| GraphicsError::Internal("buffer is not mapped".to_string()))?;
                mapped[range].copy_from_slice(data);
                Ok(())
            }
        }
    }

    /// Read the buffer contents through its host mapping.
    pub fn read(&self) -> GraphicsResult<Vec<u8>> {
        match self {
            Self::Dummy { contents, .. } => Ok(contents.clone()),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                allocation, size, ..
            } => allocation
                .as_ref()
                .and_then(|a| a.mapped_slice())
                .map(|mapped| mapped[..*size as usize].to_vec())
                .ok_or_else(|| GraphicsError::Internal("buffer is not mapped".to_string())),
        }
    }
}

/// Exclusively owned hardware sampler.
pub enum GpuSampler {
    /// Dummy backend sampler.
    Dummy {
        id: u64,
        descriptor: SamplerDescriptor,
        ledger: Arc<DummyLedger>,
    },
    /// Vulkan backend sampler.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        sampler: vk::Sampler,
    },
}

impl GpuSampler {
    /// Copyable identity of this sampler.
    pub fn raw(&self) -> RawSampler {
        match self {
            Self::Dummy { id, .. } => RawSampler::Dummy(*id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { sampler, .. } => RawSampler::Vulkan(*sampler),
        }
    }
}

macro_rules! impl_handle_debug {
    ($ty:ident, $name:literal, $raw:ident) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple($name).field(&self.$raw()).finish()
            }
        }
    };
}

impl_handle_debug!(GpuImage, "GpuImage", raw);
impl_handle_debug!(GpuImageView, "GpuImageView", raw);
impl_handle_debug!(GpuBuffer, "GpuBuffer", raw);
impl_handle_debug!(GpuSampler, "GpuSampler", raw);
impl_handle_debug!(GpuMemory, "GpuMemory", size);

// ============================================================================
// Resource Cleanup (Drop implementations)
// ============================================================================

impl Drop for GpuImage {
    fn drop(&mut self) {
        match self {
            Self::Dummy { id, ledger } => ledger.destroy(ResourceKind::Image, *id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { device, image } => {
                log::trace!("destroying image {:?}", image);
                unsafe { device.raw().destroy_image(*image, None) };
            }
        }
    }
}

impl Drop for GpuImageView {
    fn drop(&mut self) {
        match self {
            Self::Dummy { id, ledger } => ledger.destroy(ResourceKind::ImageView, *id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { device, view } => {
                log::trace!("destroying image view {:?}", view);
                unsafe { device.raw().destroy_image_view(*view, None) };
            }
        }
    }
}

impl Drop for GpuMemory {
    fn drop(&mut self) {
        match self {
            Self::Dummy { id, size, ledger } => {
                ledger.release_memory(*size);
                ledger.destroy(ResourceKind::Memory, *id);
            }
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { device, allocation } => {
                if let Some(allocation) = allocation.take() {
                    device.free(allocation);
                }
            }
        }
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        match self {
            Self::Dummy {
                id,
                contents,
                ledger,
            } => {
                ledger.release_memory(contents.len() as u64);
                ledger.destroy(ResourceKind::Buffer, *id);
            }
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                device,
                buffer,
                allocation,
                ..
            } => {
                if let Some(allocation) = allocation.take() {
                    device.free(allocation);
                }
                log::trace!("destroying buffer {:?}", buffer);
                unsafe { device.raw().destroy_buffer(*buffer, None) };
            }
        }
    }
}

impl Drop for GpuSampler {
    fn drop(&mut self) {
        match self {
            Self::Dummy { id, ledger, .. } => ledger.destroy(ResourceKind::Sampler, *id),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { device, sampler } => {
                unsafe { device.raw().destroy_sampler(*sampler, None) };
            }
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Hardware object creation consumed by the texture lifecycle code.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Device-wide capabilities.
    fn capabilities(&self) -> DeviceCapabilities;

    /// What the device supports for `format`.
    fn format_support(&self, format: TextureFormat) -> FormatSupport;

    /// Create an image without memory bound to it.
    fn create_image(&self, descriptor: &ImageDescriptor) -> GraphicsResult<GpuImage>;

    /// Allocate memory for `image` at `location` and bind it.
    fn allocate_image_memory(
        &self,
        image: &GpuImage,
        location: MemoryLocation,
        linear: bool,
    ) -> GraphicsResult<GpuMemory>;

    /// Create a 2D view of `image`.
    fn create_image_view(
        &self,
        image: &GpuImage,
        descriptor: &ImageViewDescriptor,
    ) -> GraphicsResult<GpuImageView>;

    /// Create a host-mapped buffer with its own memory.
    fn create_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> GraphicsResult<GpuBuffer>;

    /// Write tightly packed pixels into level 0 of a host-visible linear image,
    /// honoring the image's row pitch.
    fn write_linear_image(
        &self,
        image: &GpuImage,
        memory: &mut GpuMemory,
        extent: Extent2d,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> GraphicsResult<()>;

    /// Create a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<GpuSampler>;

    /// Whether `format` can be sampled at all.
    fn is_format_supported(&self, format: TextureFormat) -> bool {
        self.format_support(format).supports_sampling()
    }
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Prefer a hardware backend, fall back to dummy.
    #[default]
    Auto,
    /// Dummy backend only.
    Dummy,
    /// Vulkan backend only.
    Vulkan,
}

/// Selects and creates a backend.
pub fn create_backend(backend: BackendType) -> GraphicsResult<Arc<dyn GpuBackend>> {
    match backend {
        BackendType::Dummy => Ok(Arc::new(DummyBackend::new())),
        BackendType::Vulkan => create_vulkan_backend(),
        BackendType::Auto => match create_vulkan_backend() {
            Ok(backend) => Ok(backend),
            Err(e) => {
                log::warn!("Falling back to dummy backend: {}", e);
                Ok(Arc::new(DummyBackend::new()))
            }
        },
    }
}

#[cfg(feature = "vulkan-backend")]
fn create_vulkan_backend() -> GraphicsResult<Arc<dyn GpuBackend>> {
    let backend = vulkan::VulkanBackend::new(cfg!(debug_assertions))?;
    log::info!("Using Vulkan backend (ash)");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "vulkan-backend"))]
fn create_vulkan_backend() -> GraphicsResult<Arc<dyn GpuBackend>> {
    Err(GraphicsError::FeatureNotSupported(
        "built without the vulkan-backend feature".to_string(),
    ))
}

static_assertions::assert_impl_all!(GpuImage: Send, Sync);
static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
