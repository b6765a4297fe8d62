//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. Every hardware object
//! it hands out is a numbered entry in a shared [`DummyLedger`], and every
//! command recorded through its [`CommandStream`] is appended to the ledger's
//! command log, so tests can check exactly what was created, destroyed and
//! recorded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use texvault_core::sampler::SamplerDescriptor;
use texvault_core::texture::{Extent2d, TextureFormat, mip_chain_size};

use crate::error::{GraphicsError, GraphicsResult};

use super::command::{BufferImageCopy, CommandStream, ImageLayout};
use super::{
    BufferUsage, DeviceCapabilities, FormatSupport, GpuBackend, GpuBuffer, GpuImage,
    GpuImageView, GpuMemory, GpuSampler, ImageAspect, ImageDescriptor, ImageTiling,
    ImageViewDescriptor, MemoryLocation,
};

/// Kinds of hardware objects tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    ImageView,
    Memory,
    Buffer,
    Sampler,
}

/// A command recorded through a dummy [`CommandStream`] or a host write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    Barrier {
        image: u64,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        base_mip: u32,
        level_count: u32,
    },
    CopyBufferToImage {
        buffer: u64,
        image: u64,
        aspect: ImageAspect,
        regions: Vec<BufferImageCopy>,
    },
    Blit {
        image: u64,
        src_level: u32,
        src_extent: Extent2d,
        dst_level: u32,
        dst_extent: Extent2d,
    },
    /// Host write into a linear image.
    LinearWrite { image: u64, bytes: usize },
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    live: HashMap<u64, ResourceKind>,
    images: HashMap<u64, ImageDescriptor>,
    created: HashMap<ResourceKind, usize>,
    destroyed: HashMap<ResourceKind, usize>,
    destroyed_ids: HashSet<u64>,
    double_frees: usize,
    commands: Vec<RecordedCommand>,
    host_bytes_written: usize,
    memory_in_use: u64,
}

/// Shared record of everything a [`DummyBackend`] did.
#[derive(Debug, Default)]
pub struct DummyLedger {
    state: Mutex<LedgerState>,
    memory_limit: Option<u64>,
}

impl DummyLedger {
    fn with_memory_limit(memory_limit: Option<u64>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            memory_limit,
        }
    }

    fn create(&self, kind: ResourceKind) -> u64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, kind);
        *state.created.entry(kind).or_default() += 1;
        id
    }

    pub(crate) fn destroy(&self, kind: ResourceKind, id: u64) {
        let mut state = self.state.lock();
        if state.live.remove(&id).is_none() {
            log::error!("DummyLedger: {:?} {} destroyed twice", kind, id);
            state.double_frees += 1;
            return;
        }
        state.images.remove(&id);
        state.destroyed_ids.insert(id);
        *state.destroyed.entry(kind).or_default() += 1;
    }

    pub(crate) fn record(&self, command: RecordedCommand) {
        self.state.lock().commands.push(command);
    }

    pub(crate) fn note_host_write(&self, bytes: usize) {
        self.state.lock().host_bytes_written += bytes;
    }

    fn reserve_memory(&self, size: u64) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        let in_use = state.memory_in_use + size;
        if self.memory_limit.is_some_and(|limit| in_use > limit) {
            log::warn!(
                "DummyLedger: allocation of {} bytes exceeds limit ({} in use)",
                size,
                state.memory_in_use
            );
            return Err(GraphicsError::OutOfMemory);
        }
        state.memory_in_use = in_use;
        Ok(())
    }

    pub(crate) fn release_memory(&self, size: u64) {
        let mut state = self.state.lock();
        state.memory_in_use = state.memory_in_use.saturating_sub(size);
    }

    fn image_descriptor(&self, id: u64) -> Option<ImageDescriptor> {
        self.state.lock().images.get(&id).cloned()
    }

    /// Number of live objects of `kind`.
    pub fn live(&self, kind: ResourceKind) -> usize {
        self.state.lock().live.values().filter(|&&k| k == kind).count()
    }

    /// Number of live objects of every kind.
    pub fn live_total(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of objects of `kind` ever created.
    pub fn created(&self, kind: ResourceKind) -> usize {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    /// Number of objects of `kind` destroyed.
    pub fn destroyed(&self, kind: ResourceKind) -> usize {
        self.state.lock().destroyed.get(&kind).copied().unwrap_or(0)
    }

    /// Whether the object with `id` is still alive.
    pub fn is_live(&self, id: u64) -> bool {
        self.state.lock().live.contains_key(&id)
    }

    /// Whether the object with `id` existed and has been destroyed.
    pub fn was_destroyed(&self, id: u64) -> bool {
        self.state.lock().destroyed_ids.contains(&id)
    }

    /// Number of destroy calls on already destroyed objects.
    pub fn double_frees(&self) -> usize {
        self.state.lock().double_frees
    }

    /// Recorded commands in order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }

    /// Take and clear the recorded commands.
    pub fn take_commands(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Bytes written through host mappings.
    pub fn host_bytes_written(&self) -> usize {
        self.state.lock().host_bytes_written
    }

    /// Bytes of memory currently allocated.
    pub fn memory_in_use(&self) -> u64 {
        self.state.lock().memory_in_use
    }
}

/// Behavior knobs for the dummy device.
#[derive(Debug, Clone)]
pub struct DummyOptions {
    /// Formats that cannot be sampled at all.
    pub unsupported_formats: Vec<TextureFormat>,
    /// Formats that can only be sampled with linear tiling.
    pub linear_only_formats: Vec<TextureFormat>,
    /// Formats whose optimal tiling can be blitted with linear filtering.
    pub blit_supported: bool,
    pub capabilities: DeviceCapabilities,
    /// Total bytes of memory before allocations fail with `OutOfMemory`.
    pub memory_limit: Option<u64>,
}

impl Default for DummyOptions {
    fn default() -> Self {
        Self {
            unsupported_formats: Vec::new(),
            linear_only_formats: Vec::new(),
            blit_supported: true,
            capabilities: DeviceCapabilities::default(),
            memory_limit: None,
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    ledger: Arc<DummyLedger>,
    options: DummyOptions,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend that supports everything.
    pub fn new() -> Self {
        Self::with_options(DummyOptions::default())
    }

    /// Create a dummy backend with the given behavior.
    pub fn with_options(options: DummyOptions) -> Self {
        Self {
            ledger: Arc::new(DummyLedger::with_memory_limit(options.memory_limit)),
            options,
        }
    }

    /// The ledger shared by every object this backend created.
    pub fn ledger(&self) -> &Arc<DummyLedger> {
        &self.ledger
    }

    /// A command stream that records into the ledger.
    pub fn command_stream(&self) -> CommandStream {
        CommandStream::Dummy {
            ledger: Arc::clone(&self.ledger),
        }
    }

    fn dummy_id(&self, image: &GpuImage) -> GraphicsResult<u64> {
        match image {
            GpuImage::Dummy { id, .. } => Ok(*id),
            #[allow(unreachable_patterns)]
            _ => Err(GraphicsError::InvalidParameter(
                "image belongs to another backend".to_string(),
            )),
        }
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.options.capabilities
    }

    fn format_support(&self, format: TextureFormat) -> FormatSupport {
        if format.is_undefined() || self.options.unsupported_formats.contains(&format) {
            return FormatSupport::default();
        }
        if self.options.linear_only_formats.contains(&format) {
            return FormatSupport {
                linear_sampled: true,
                ..Default::default()
            };
        }
        let blit = self.options.blit_supported && !format.is_depth_stencil();
        FormatSupport {
            optimal_sampled: true,
            linear_sampled: !format.is_depth_stencil(),
            blit_src: blit,
            blit_dst: blit,
            linear_filter: blit,
            attachment: true,
        }
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> GraphicsResult<GpuImage> {
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{}, {:?}, {} levels)",
            descriptor.label,
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.format,
            descriptor.mip_levels
        );
        if descriptor.extent.is_empty() || descriptor.format.is_undefined() {
            return Err(GraphicsError::InvalidParameter(format!(
                "cannot create {}x{} image of format {:?}",
                descriptor.extent.width, descriptor.extent.height, descriptor.format
            )));
        }
        let id = self.ledger.create(ResourceKind::Image);
        self.ledger
            .state
            .lock()
            .images
            .insert(id, descriptor.clone());
        Ok(GpuImage::Dummy {
            id,
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn allocate_image_memory(
        &self,
        image: &GpuImage,
        location: MemoryLocation,
        linear: bool,
    ) -> GraphicsResult<GpuMemory> {
        let image_id = self.dummy_id(image)?;
        let descriptor = self
            .ledger
            .image_descriptor(image_id)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown image {image_id}")))?;
        if linear != (descriptor.tiling == ImageTiling::Linear) {
            log::warn!(
                "DummyBackend: image {} allocated as linear={} but tiling is {:?}",
                image_id,
                linear,
                descriptor.tiling
            );
        }
        let size = mip_chain_size(
            descriptor.extent,
            descriptor.mip_levels,
            descriptor.format.block_size(),
        ) as u64;
        log::trace!(
            "DummyBackend: allocating {} bytes ({:?}) for image {}",
            size,
            location,
            image_id
        );
        self.ledger.reserve_memory(size)?;
        Ok(GpuMemory::Dummy {
            id: self.ledger.create(ResourceKind::Memory),
            size,
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn create_image_view(
        &self,
        image: &GpuImage,
        descriptor: &ImageViewDescriptor,
    ) -> GraphicsResult<GpuImageView> {
        let image_id = self.dummy_id(image)?;
        log::trace!(
            "DummyBackend: creating {:?} view of image {}",
            descriptor.aspect,
            image_id
        );
        Ok(GpuImageView::Dummy {
            id: self.ledger.create(ResourceKind::ImageView),
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn create_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> GraphicsResult<GpuBuffer> {
        log::trace!(
            "DummyBackend: creating buffer (size: {}, {:?}, {:?})",
            size,
            usage,
            location
        );
        if size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be non-zero".to_string(),
            ));
        }
        self.ledger.reserve_memory(size)?;
        Ok(GpuBuffer::Dummy {
            id: self.ledger.create(ResourceKind::Buffer),
            contents: vec![0; size as usize],
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn write_linear_image(
        &self,
        image: &GpuImage,
        memory: &mut GpuMemory,
        extent: Extent2d,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> GraphicsResult<()> {
        let image_id = self.dummy_id(image)?;
        let expected = extent.pixel_count() * bytes_per_pixel as usize;
        if data.len() < expected || expected as u64 > memory.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "linear write of {} bytes into {}x{} image",
                data.len(),
                extent.width,
                extent.height
            )));
        }
        self.ledger.note_host_write(expected);
        self.ledger.record(RecordedCommand::LinearWrite {
            image: image_id,
            bytes: expected,
        });
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<GpuSampler> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        Ok(GpuSampler::Dummy {
            id: self.ledger.create(ResourceKind::Sampler),
            descriptor: descriptor.clone(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}
