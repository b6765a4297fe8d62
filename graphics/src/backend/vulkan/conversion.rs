//! Type conversions between texvault types and Vulkan types.

use ash::vk;
use texvault_core::sampler::{AddressMode, BorderColor, FilterMode};
use texvault_core::texture::TextureFormat;

use crate::backend::{BufferUsage, ImageAspect, ImageLayout, ImageTiling, ImageUsage};

/// Convert a texture format to a Vulkan format.
pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        // 16-bit packed formats
        TextureFormat::Rgb565Unorm => vk::Format::R5G6B5_UNORM_PACK16,
        TextureFormat::Rgba5551Unorm => vk::Format::R5G5B5A1_UNORM_PACK16,
        TextureFormat::Rgba4444Unorm => vk::Format::R4G4B4A4_UNORM_PACK16,

        // 32-bit formats
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,

        // Depth/stencil formats
        TextureFormat::Depth16Unorm => vk::Format::D16_UNORM,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,

        _ => vk::Format::UNDEFINED,
    }
}

/// Convert image usage flags to Vulkan image usage flags.
pub fn convert_image_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(ImageUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::SAMPLED) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
        result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(ImageUsage::INPUT_ATTACHMENT) {
        result |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }

    result
}

/// Convert buffer usage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    result
}

pub fn convert_tiling(tiling: ImageTiling) -> vk::ImageTiling {
    match tiling {
        ImageTiling::Optimal => vk::ImageTiling::OPTIMAL,
        ImageTiling::Linear => vk::ImageTiling::LINEAR,
    }
}

/// Convert an image layout to a Vulkan image layout.
pub fn convert_image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
}

/// Convert image aspects to Vulkan aspect flags.
pub fn convert_aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    let mut result = vk::ImageAspectFlags::empty();
    if aspect.contains(ImageAspect::COLOR) {
        result |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(ImageAspect::DEPTH) {
        result |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(ImageAspect::STENCIL) {
        result |= vk::ImageAspectFlags::STENCIL;
    }
    result
}

/// Convert FilterMode to Vulkan filter.
pub fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Convert FilterMode to Vulkan mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

/// Convert AddressMode to Vulkan sampler address mode.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

pub fn convert_border_color(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_formats_map_to_pack16() {
        assert_eq!(
            convert_texture_format(TextureFormat::Rgb565Unorm),
            vk::Format::R5G6B5_UNORM_PACK16
        );
        assert_eq!(
            convert_texture_format(TextureFormat::Undefined),
            vk::Format::UNDEFINED
        );
    }

    #[test]
    fn test_usage_conversion() {
        let flags = convert_image_usage(ImageUsage::SAMPLED | ImageUsage::COPY_DST);
        assert_eq!(
            flags,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
        );
    }
}
