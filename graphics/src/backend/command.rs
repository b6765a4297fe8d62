//! Command recording for texture uploads and mip generation.
//!
//! A [`CommandStream`] is supplied by the caller (usually the frame's
//! command buffer) and is only recorded into here, never submitted.

use std::sync::Arc;

use texvault_core::texture::Extent2d;

#[cfg(feature = "vulkan-backend")]
use ash::vk;

use super::dummy::{DummyLedger, RecordedCommand};
use super::{ImageAspect, RawBuffer, RawImage};

#[cfg(feature = "vulkan-backend")]
use super::vulkan::{VulkanDevice, conversion};

/// Image layouts tracked by the lifecycle code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents are undefined.
    #[default]
    Undefined,
    /// Linear image whose contents were written by the host before first use.
    Preinitialized,
    /// Any access; used by linear images that stay host-writable.
    General,
    /// Source of a copy or blit.
    TransferSrc,
    /// Destination of a copy or blit.
    TransferDst,
    /// Sampled from shaders.
    ShaderReadOnly,
    /// Rendered to as a color attachment.
    ColorAttachment,
    /// Rendered to as a depth/stencil attachment.
    DepthStencilAttachment,
}

/// One buffer-to-image copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferImageCopy {
    /// Byte offset of the region in the buffer. Rows are tightly packed.
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub extent: Extent2d,
}

/// A command buffer being recorded.
pub enum CommandStream {
    /// Records into the dummy ledger.
    Dummy { ledger: Arc<DummyLedger> },
    /// Records into a Vulkan command buffer in the recording state.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: Arc<VulkanDevice>,
        command_buffer: vk::CommandBuffer,
    },
}

impl std::fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { .. } => f.write_str("CommandStream::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { command_buffer, .. } => f
                .debug_tuple("CommandStream::Vulkan")
                .field(command_buffer)
                .finish(),
        }
    }
}

impl CommandStream {
    /// Record a layout transition of mip levels `base_mip..base_mip + level_count`.
    pub fn image_barrier(
        &mut self,
        image: RawImage,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        base_mip: u32,
        level_count: u32,
    ) {
        match (self, image) {
            (Self::Dummy { ledger }, RawImage::Dummy(id)) => {
                ledger.record(RecordedCommand::Barrier {
                    image: id,
                    aspect,
                    old_layout,
                    new_layout,
                    base_mip,
                    level_count,
                });
            }
            #[cfg(feature = "vulkan-backend")]
            (
                Self::Vulkan {
                    device,
                    command_buffer,
                },
                RawImage::Vulkan(image),
            ) => {
                let (src_access_mask, src_stage) = source_scope(old_layout);
                let (dst_access_mask, dst_stage) = destination_scope(new_layout);
                let barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(conversion::convert_image_layout(old_layout))
                    .new_layout(conversion::convert_image_layout(new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: conversion::convert_aspect(aspect),
                        base_mip_level: base_mip,
                        level_count,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .src_access_mask(src_access_mask)
                    .dst_access_mask(dst_access_mask);

                unsafe {
                    device.raw().cmd_pipeline_barrier(
                        *command_buffer,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
            }
            #[cfg(feature = "vulkan-backend")]
            (stream, image) => mismatch("image_barrier", stream, image),
        }
    }

    /// Record a layout transition of the first `level_count` mip levels.
    pub fn set_image_layout(
        &mut self,
        image: RawImage,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        level_count: u32,
    ) {
        self.image_barrier(image, aspect, old_layout, new_layout, 0, level_count);
    }

    /// Record copies from `buffer` into `image`, which must be in `TransferDst`.
    pub fn copy_buffer_to_image(
        &mut self,
        buffer: RawBuffer,
        image: RawImage,
        aspect: ImageAspect,
        regions: &[BufferImageCopy],
    ) {
        match (self, buffer, image) {
            (Self::Dummy { ledger }, RawBuffer::Dummy(buffer), RawImage::Dummy(image)) => {
                ledger.record(RecordedCommand::CopyBufferToImage {
                    buffer,
                    image,
                    aspect,
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "vulkan-backend")]
            (
                Self::Vulkan {
                    device,
                    command_buffer,
                },
                RawBuffer::Vulkan(buffer),
                RawImage::Vulkan(image),
            ) => {
                let aspect_mask = conversion::convert_aspect(aspect);
                let copies: Vec<vk::BufferImageCopy> = regions
                    .iter()
                    .map(|region| vk::BufferImageCopy {
                        buffer_offset: region.buffer_offset,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask,
                            mip_level: region.mip_level,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D::default(),
                        image_extent: vk::Extent3D {
                            width: region.extent.width,
                            height: region.extent.height,
                            depth: 1,
                        },
                    })
                    .collect();

                unsafe {
                    device.raw().cmd_copy_buffer_to_image(
                        *command_buffer,
                        buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &copies,
                    );
                }
            }
            #[cfg(feature = "vulkan-backend")]
            (stream, _, image) => mismatch("copy_buffer_to_image", stream, image),
        }
    }

    /// Record a linear-filtered blit from `src_level` (in `TransferSrc`) to
    /// `dst_level` (in `TransferDst`) of the same color image.
    pub fn blit_mip(
        &mut self,
        image: RawImage,
        src_level: u32,
        src_extent: Extent2d,
        dst_level: u32,
        dst_extent: Extent2d,
    ) {
        match (self, image) {
            (Self::Dummy { ledger }, RawImage::Dummy(id)) => {
                ledger.record(RecordedCommand::Blit {
                    image: id,
                    src_level,
                    src_extent,
                    dst_level,
                    dst_extent,
                });
            }
            #[cfg(feature = "vulkan-backend")]
            (
                Self::Vulkan {
                    device,
                    command_buffer,
                },
                RawImage::Vulkan(image),
            ) => {
                let layers = |mip_level| vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                let corner = |extent: Extent2d| vk::Offset3D {
                    x: extent.width as i32,
                    y: extent.height as i32,
                    z: 1,
                };
                let blit = vk::ImageBlit {
                    src_subresource: layers(src_level),
                    src_offsets: [vk::Offset3D::default(), corner(src_extent)],
                    dst_subresource: layers(dst_level),
                    dst_offsets: [vk::Offset3D::default(), corner(dst_extent)],
                };

                unsafe {
                    device.raw().cmd_blit_image(
                        *command_buffer,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }
            }
            #[cfg(feature = "vulkan-backend")]
            (stream, image) => mismatch("blit_mip", stream, image),
        }
    }
}

#[cfg(feature = "vulkan-backend")]
fn mismatch(command: &str, stream: &CommandStream, image: RawImage) {
    log::error!(
        "{}: {:?} cannot record commands for {:?} from another backend",
        command,
        stream,
        image
    );
}

#[cfg(feature = "vulkan-backend")]
fn source_scope(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::Undefined => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
        ImageLayout::Preinitialized | ImageLayout::General => {
            (vk::AccessFlags::HOST_WRITE, vk::PipelineStageFlags::HOST)
        }
        ImageLayout::TransferDst => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ImageLayout::TransferSrc => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ImageLayout::ColorAttachment => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::DepthStencilAttachment => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ImageLayout::ShaderReadOnly => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    }
}

#[cfg(feature = "vulkan-backend")]
fn destination_scope(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::TransferDst => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ImageLayout::TransferSrc => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ImageLayout::ColorAttachment => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::DepthStencilAttachment => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        ImageLayout::ShaderReadOnly | ImageLayout::General => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        ImageLayout::Undefined | ImageLayout::Preinitialized => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    }
}
