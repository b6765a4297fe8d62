//! Render-target attachment images.

use std::sync::Arc;

use texvault_core::texture::{Extent2d, TextureFormat};

use crate::backend::{
    BufferUsage, GpuBackend, GpuBuffer, GpuImage, GpuImageView, GpuMemory, ImageAspect,
    ImageDescriptor, ImageUsage, ImageViewDescriptor, MemoryLocation, RawImage, RawImageView,
};
use crate::error::{GraphicsError, GraphicsResult};

/// An image rendered into: image, memory, a depth or color view, a stencil
/// view for stencil formats and an optional readback buffer.
///
/// [`FramebufferAttachment::reset`] releases the hardware objects so the
/// attachment can be initialized again at a new size.
pub struct FramebufferAttachment {
    backend: Arc<dyn GpuBackend>,
    format: TextureFormat,
    extent: Extent2d,
    image: Option<GpuImage>,
    image_view: Option<GpuImageView>,
    stencil_view: Option<GpuImageView>,
    memory: Option<GpuMemory>,
    readback: Option<GpuBuffer>,
}

impl std::fmt::Debug for FramebufferAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramebufferAttachment")
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("image", &self.image())
            .finish()
    }
}

impl FramebufferAttachment {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            format: TextureFormat::Undefined,
            extent: Extent2d::default(),
            image: None,
            image_view: None,
            stencil_view: None,
            memory: None,
            readback: None,
        }
    }

    /// Create the attachment image and its views.
    ///
    /// A `COPY_SRC` usage also creates a host-visible readback buffer of
    /// `width * height * 4` bytes.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: ImageUsage,
    ) -> GraphicsResult<()> {
        texvault_core::profile_scope!("FramebufferAttachment::initialize");

        self.reset();

        let support = self.backend.format_support(format);
        if !support.attachment {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{:?} cannot be rendered to",
                format
            )));
        }
        let max_dimension = self.backend.capabilities().max_image_dimension;
        if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
            return Err(GraphicsError::InvalidParameter(format!(
                "attachment extent {}x{} outside 1..={}",
                width, height, max_dimension
            )));
        }

        let descriptor = ImageDescriptor::new_2d(width, height, format, usage)
            .with_label(format!("attachment {:?}", format));
        let image = self.backend.create_image(&descriptor)?;
        let memory = self
            .backend
            .allocate_image_memory(&image, MemoryLocation::GpuOnly, false)?;

        let view_aspect = if format.is_depth_stencil() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        };
        let image_view = self.backend.create_image_view(
            &image,
            &ImageViewDescriptor::full(format, 1).with_aspect(view_aspect),
        )?;
        let stencil_view = if format.has_stencil() {
            Some(self.backend.create_image_view(
                &image,
                &ImageViewDescriptor::full(format, 1).with_aspect(ImageAspect::STENCIL),
            )?)
        } else {
            None
        };
        let readback = if usage.contains(ImageUsage::COPY_SRC) {
            Some(self.backend.create_buffer(
                width as u64 * height as u64 * 4,
                BufferUsage::COPY_DST,
                MemoryLocation::GpuToCpu,
            )?)
        } else {
            None
        };

        log::trace!(
            "Attachment: initialized {}x{} {:?} (stencil view: {}, readback: {})",
            width,
            height,
            format,
            stencil_view.is_some(),
            readback.is_some()
        );

        self.format = format;
        self.extent = Extent2d::new(width, height);
        self.image = Some(image);
        self.image_view = Some(image_view);
        self.stencil_view = stencil_view;
        self.memory = Some(memory);
        self.readback = readback;
        Ok(())
    }

    /// Destroy the image, views, memory and readback buffer.
    pub fn reset(&mut self) {
        self.readback = None;
        self.stencil_view = None;
        self.image_view = None;
        self.image = None;
        self.memory = None;
        self.format = TextureFormat::Undefined;
        self.extent = Extent2d::default();
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn image(&self) -> Option<RawImage> {
        self.image.as_ref().map(GpuImage::raw)
    }

    pub fn image_view(&self) -> Option<RawImageView> {
        self.image_view.as_ref().map(GpuImageView::raw)
    }

    /// Stencil-only view, present for formats with a stencil component.
    pub fn stencil_view(&self) -> Option<RawImageView> {
        self.stencil_view.as_ref().map(GpuImageView::raw)
    }

    /// Host-visible buffer for reading the attachment back, if requested.
    pub fn readback_buffer(&self) -> Option<&GpuBuffer> {
        self.readback.as_ref()
    }
}
