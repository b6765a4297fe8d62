//! GPU image resource backing one cached texture.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use texvault_core::sampler::SamplerParams;
use texvault_core::texture::{
    Extent2d, TextureFormat, TextureType, generate_mip_chain, mip_chain_size, mip_extent,
    mip_level_count, mip_offset,
};

use crate::backend::{
    BufferImageCopy, BufferUsage, CommandStream, GpuBackend, GpuBuffer, GpuImage, GpuImageView,
    GpuMemory, ImageAspect, ImageDescriptor, ImageLayout, ImageUsage, ImageViewDescriptor,
    MemoryLocation, RawImage, RawImageView,
};
use crate::error::{GraphicsError, GraphicsResult};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Texture`], stable across moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Hardware handles moved out of a retired texture.
///
/// Dropping this destroys them, so it is handed to the frame trash instead.
#[derive(Debug)]
pub struct RetiredTexture {
    pub id: TextureId,
    pub image_view: Option<GpuImageView>,
    pub image: Option<GpuImage>,
    pub memory: Option<GpuMemory>,
    pub staging: Option<GpuBuffer>,
}

/// A sampled GPU texture: image, primary view, memory and an optional staging
/// buffer.
///
/// The image and its primary view are either both present or both absent.
/// A texture whose format is [`TextureFormat::Undefined`] holds no hardware
/// image; that is the state after construction and after [`Texture::retire`].
///
/// Moving a `Texture` moves its handles; nothing is destroyed until the
/// handles themselves are dropped.
pub struct Texture {
    backend: Arc<dyn GpuBackend>,
    id: TextureId,
    tex_type: TextureType,
    params: SamplerParams,

    format: TextureFormat,
    extent: Extent2d,
    mip_levels: u32,
    needs_staging: bool,
    layout: ImageLayout,

    image: Option<GpuImage>,
    image_view: Option<GpuImageView>,
    read_only_view: Option<RawImageView>,
    memory: Option<GpuMemory>,
    staging: Option<GpuBuffer>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("tex_type", &self.tex_type)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("mip_levels", &self.mip_levels)
            .field("needs_staging", &self.needs_staging)
            .field("layout", &self.layout)
            .finish()
    }
}

impl Texture {
    /// Create an empty texture for pixels of `tex_type`.
    pub fn new(backend: Arc<dyn GpuBackend>, tex_type: TextureType, params: SamplerParams) -> Self {
        Self {
            backend,
            id: TextureId::next(),
            tex_type,
            params,
            format: TextureFormat::Undefined,
            extent: Extent2d::default(),
            mip_levels: 1,
            needs_staging: false,
            layout: ImageLayout::Undefined,
            image: None,
            image_view: None,
            read_only_view: None,
            memory: None,
            staging: None,
        }
    }

    /// Create the hardware image, its memory, its primary view and, when the
    /// image is not host-writable, a staging buffer of `data_size` bytes.
    ///
    /// Any handles already held are destroyed immediately; callers that may
    /// still have GPU work referencing them retire the texture first. On
    /// failure the texture is left empty.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        data_size: usize,
        mipmapped: bool,
        mipmaps_included: bool,
    ) -> GraphicsResult<()> {
        texvault_core::profile_scope!("Texture::initialize");

        self.release_now();

        let support = self.backend.format_support(format);
        if !support.supports_sampling() {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{:?} cannot be sampled",
                format
            )));
        }
        let max_dimension = self.backend.capabilities().max_image_dimension;
        if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture extent {}x{} outside 1..={}",
                width, height, max_dimension
            )));
        }

        let extent = Extent2d::new(width, height);
        let needs_staging = support.optimal_sampled;
        let mip_levels = if mipmapped && needs_staging {
            mip_level_count(width, height)
        } else {
            1
        };

        let mut descriptor = ImageDescriptor::new_2d(
            width,
            height,
            format,
            ImageUsage::SAMPLED | ImageUsage::COPY_DST,
        )
        .with_mip_levels(mip_levels)
        .with_label(format!("texture#{}", self.id.get()));
        if !needs_staging {
            descriptor = descriptor.with_linear_tiling();
        } else if mip_levels > 1 && !mipmaps_included {
            descriptor.usage |= ImageUsage::COPY_SRC;
        }

        // Locals drop, releasing everything created so far, if a later step fails.
        let image = self.backend.create_image(&descriptor)?;
        let location = if needs_staging {
            MemoryLocation::GpuOnly
        } else {
            MemoryLocation::CpuToGpu
        };
        let memory = self
            .backend
            .allocate_image_memory(&image, location, !needs_staging)?;
        let view = self
            .backend
            .create_image_view(&image, &ImageViewDescriptor::full(format, mip_levels))?;
        let staging = if needs_staging {
            Some(self.backend.create_buffer(
                data_size as u64,
                BufferUsage::COPY_SRC,
                MemoryLocation::CpuToGpu,
            )?)
        } else {
            None
        };

        log::trace!(
            "Texture {:?}: initialized {}x{} {:?}, {} levels, staging: {}",
            self.id,
            width,
            height,
            format,
            mip_levels,
            needs_staging
        );

        self.format = format;
        self.extent = extent;
        self.mip_levels = mip_levels;
        self.needs_staging = needs_staging;
        self.layout = descriptor.initial_layout;
        self.image = Some(image);
        self.image_view = Some(view);
        self.memory = Some(memory);
        self.staging = staging;
        Ok(())
    }

    /// Upload pixels of this texture's [`TextureType`], recording the
    /// transfer into `cmd`.
    ///
    /// With `mipmaps_included`, `data` holds the full mip chain packed from
    /// the smallest level to the base level. Otherwise it holds the base
    /// level and, when `mipmapped`, the remaining levels are generated.
    pub fn upload(
        &mut self,
        cmd: &mut CommandStream,
        width: u32,
        height: u32,
        data: &[u8],
        mipmapped: bool,
        mipmaps_included: bool,
    ) -> GraphicsResult<()> {
        texvault_core::profile_scope!("Texture::upload");

        let format = self.tex_type.format();
        let bpp = self.tex_type.bytes_per_pixel();
        let extent = Extent2d::new(width, height);
        let support = self.backend.format_support(format);
        let full_levels = mip_level_count(width, height);

        // Without blit support the chain is built on the CPU and uploaded as if included.
        let software_chain;
        let (data, mipmaps_included) = if mipmapped
            && !mipmaps_included
            && support.optimal_sampled
            && !support.supports_mip_blit()
        {
            software_chain = generate_mip_chain(self.tex_type, extent, data).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "{} bytes is too short for a {}x{} {:?} base level",
                    data.len(),
                    width,
                    height,
                    self.tex_type
                ))
            })?;
            log::debug!(
                "Texture {:?}: {:?} lacks blit support, generated {} levels on the CPU",
                self.id,
                format,
                full_levels
            );
            (software_chain.as_slice(), true)
        } else {
            (data, mipmaps_included)
        };

        let included_levels = if mipmapped && mipmaps_included {
            full_levels
        } else {
            1
        };
        let data_size = mip_chain_size(extent, included_levels, bpp);
        if data.len() < data_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes is too short for {}x{} {:?} with {} levels",
                data.len(),
                width,
                height,
                self.tex_type,
                included_levels
            )));
        }
        let data = &data[..data_size];

        let wanted_levels = if mipmapped && support.optimal_sampled {
            full_levels
        } else {
            1
        };
        if self.image.is_none()
            || self.format != format
            || self.extent != extent
            || self.mip_levels != wanted_levels
        {
            self.initialize(width, height, format, data_size, mipmapped, mipmaps_included)?;
        }

        if self.needs_staging {
            self.upload_staged(cmd, data, mipmapped, mipmaps_included)
        } else {
            // Linear images hold only the base level, the last one in a packed chain.
            let base = mip_offset(extent, included_levels, 0, bpp);
            self.upload_linear(cmd, &data[base..])
        }
    }

    fn upload_staged(
        &mut self,
        cmd: &mut CommandStream,
        data: &[u8],
        mipmapped: bool,
        mipmaps_included: bool,
    ) -> GraphicsResult<()> {
        let image = self.raw_image()?;
        let aspect = ImageAspect::for_format(self.format);

        if self.staging.as_ref().is_none_or(|s| s.size() < data.len() as u64) {
            self.staging = Some(self.backend.create_buffer(
                data.len() as u64,
                BufferUsage::COPY_SRC,
                MemoryLocation::CpuToGpu,
            )?);
        }
        let staging = self
            .staging
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("staging buffer missing".to_string()))?;
        staging.write(0, data)?;

        cmd.set_image_layout(
            image,
            aspect,
            self.layout,
            ImageLayout::TransferDst,
            self.mip_levels,
        );

        let bpp = self.format.block_size();
        let regions: Vec<BufferImageCopy> = if mipmaps_included && self.mip_levels > 1 {
            (0..self.mip_levels)
                .map(|level| BufferImageCopy {
                    buffer_offset: mip_offset(self.extent, self.mip_levels, level, bpp) as u64,
                    mip_level: level,
                    extent: mip_extent(self.extent, level),
                })
                .collect()
        } else {
            vec![BufferImageCopy {
                buffer_offset: 0,
                mip_level: 0,
                extent: self.extent,
            }]
        };
        cmd.copy_buffer_to_image(staging.raw(), image, aspect, &regions);

        if mipmapped && !mipmaps_included && self.mip_levels > 1 {
            self.generate_mipmaps(cmd, image);
        } else {
            cmd.set_image_layout(
                image,
                aspect,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
                self.mip_levels,
            );
        }
        self.layout = ImageLayout::ShaderReadOnly;
        Ok(())
    }

    fn upload_linear(&mut self, cmd: &mut CommandStream, data: &[u8]) -> GraphicsResult<()> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| GraphicsError::Internal("texture has no image".to_string()))?;
        let memory = self
            .memory
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("texture has no memory".to_string()))?;
        self.backend.write_linear_image(
            image,
            memory,
            self.extent,
            self.format.block_size(),
            data,
        )?;

        cmd.set_image_layout(
            image.raw(),
            ImageAspect::COLOR,
            self.layout,
            ImageLayout::General,
            1,
        );
        self.layout = ImageLayout::General;
        Ok(())
    }

    /// Fill levels 1.. from level 0 with successive linear blits.
    ///
    /// Expects every level in `TransferDst`; leaves every level in
    /// `ShaderReadOnly`.
    fn generate_mipmaps(&self, cmd: &mut CommandStream, image: RawImage) {
        for level in 1..self.mip_levels {
            cmd.image_barrier(
                image,
                ImageAspect::COLOR,
                ImageLayout::TransferDst,
                ImageLayout::TransferSrc,
                level - 1,
                1,
            );
            cmd.blit_mip(
                image,
                level - 1,
                mip_extent(self.extent, level - 1),
                level,
                mip_extent(self.extent, level),
            );
            cmd.image_barrier(
                image,
                ImageAspect::COLOR,
                ImageLayout::TransferSrc,
                ImageLayout::ShaderReadOnly,
                level - 1,
                1,
            );
        }
        cmd.image_barrier(
            image,
            ImageAspect::COLOR,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
            self.mip_levels - 1,
            1,
        );
    }

    /// Move all hardware handles out and reset the format to the empty
    /// sentinel. Returns `None` if the texture holds no image.
    pub fn retire(&mut self) -> Option<RetiredTexture> {
        let image = self.image.take()?;
        self.format = TextureFormat::Undefined;
        self.layout = ImageLayout::Undefined;
        self.read_only_view = None;
        Some(RetiredTexture {
            id: self.id,
            image_view: self.image_view.take(),
            image: Some(image),
            memory: self.memory.take(),
            staging: self.staging.take(),
        })
    }

    fn release_now(&mut self) {
        if let Some(retired) = self.retire() {
            log::trace!("Texture {:?}: releasing previous image", retired.id);
        }
        // A staging buffer can outlive the image after a failed initialize.
        self.staging = None;
    }

    fn raw_image(&self) -> GraphicsResult<RawImage> {
        self.image()
            .ok_or_else(|| GraphicsError::Internal("texture has no image".to_string()))
    }

    /// Primary shader-read view.
    pub fn image_view(&self) -> Option<RawImageView> {
        self.image_view.as_ref().map(GpuImageView::raw)
    }

    /// View to sample while the image is also written elsewhere in the frame.
    ///
    /// Falls back to the primary view when no alias view is set.
    pub fn read_only_image_view(&self) -> Option<RawImageView> {
        self.read_only_view.or_else(|| self.image_view())
    }

    /// Set the alias view. It is not owned and is cleared at the next frame
    /// advance if the texture was marked in flight.
    pub fn set_read_only_image_view(&mut self, view: RawImageView) {
        self.read_only_view = Some(view);
    }

    pub fn clear_read_only_image_view(&mut self) {
        self.read_only_view = None;
    }

    pub fn image(&self) -> Option<RawImage> {
        self.image.as_ref().map(GpuImage::raw)
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Current format; `Undefined` when the texture holds no image.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Whether uploads go through a staging buffer.
    pub fn needs_staging(&self) -> bool {
        self.needs_staging
    }

    /// Layout the image will be in once recorded commands execute.
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    pub fn tex_type(&self) -> TextureType {
        self.tex_type
    }

    pub fn set_tex_type(&mut self, tex_type: TextureType) {
        self.tex_type = tex_type;
    }

    pub fn params(&self) -> SamplerParams {
        self.params
    }

    pub fn set_params(&mut self, params: SamplerParams) {
        self.params = params;
    }

    /// Whether pixels of `tex_type` must be widened to RGBA8888 because the
    /// device cannot sample their native format.
    pub fn force_32bit_texture(&self, tex_type: TextureType) -> bool {
        !self.backend.is_format_supported(tex_type.format())
    }

    /// The staging buffer, if the texture has one.
    pub fn staging_buffer(&self) -> Option<&GpuBuffer> {
        self.staging.as_ref()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
