//! Texture formats, source pixel types and extents.

/// GPU texture format.
///
/// [`TextureFormat::Undefined`] is the "empty" sentinel: a texture whose format
/// is undefined holds no live hardware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// No format. Marks a retired or never-initialized resource.
    #[default]
    Undefined,

    // 16-bit packed color formats
    /// 5-bit red, 6-bit green, 5-bit blue packed into 16 bits.
    Rgb565Unorm,
    /// 5-bit red, green and blue with a 1-bit alpha packed into 16 bits.
    Rgba5551Unorm,
    /// 4-bit red, green, blue and alpha packed into 16 bits.
    Rgba4444Unorm,

    // 32-bit color formats
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true for the empty sentinel.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth32Float
                | Self::Depth24PlusStencil8
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::Rgb565Unorm | Self::Rgba5551Unorm | Self::Rgba4444Unorm | Self::Depth16Unorm => {
                2
            }
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float | Self::Depth24PlusStencil8 => 4,
            Self::Depth32FloatStencil8 => 8,
        }
    }
}

/// Pixel layout of texture data handed over by the texture decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// 16-bit RGB 5:6:5.
    Rgb565,
    /// 16-bit RGBA 5:5:5:1.
    Rgba5551,
    /// 16-bit RGBA 4:4:4:4.
    Rgba4444,
    /// 32-bit RGBA 8:8:8:8, bytes in R, G, B, A order.
    #[default]
    Rgba8888,
}

impl TextureType {
    /// GPU format the pixels are uploaded as.
    pub fn format(&self) -> TextureFormat {
        match self {
            Self::Rgb565 => TextureFormat::Rgb565Unorm,
            Self::Rgba5551 => TextureFormat::Rgba5551Unorm,
            Self::Rgba4444 => TextureFormat::Rgba4444Unorm,
            Self::Rgba8888 => TextureFormat::Rgba8Unorm,
        }
    }

    /// Bytes per pixel of the source data.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba8888 => 4,
            _ => 2,
        }
    }

    /// Returns true for the 16-bit packed layouts.
    pub fn is_packed_16(&self) -> bool {
        self.bytes_per_pixel() == 2
    }
}

/// Width and height of a 2D image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by the extent.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_sentinel() {
        assert!(TextureFormat::default().is_undefined());
        assert_eq!(TextureFormat::Undefined.block_size(), 0);
    }

    #[test]
    fn test_stencil_formats() {
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(TextureFormat::Depth32FloatStencil8.is_depth_stencil());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
    }

    #[test]
    fn test_texture_type_formats() {
        assert_eq!(TextureType::Rgb565.format(), TextureFormat::Rgb565Unorm);
        assert_eq!(TextureType::Rgba8888.format(), TextureFormat::Rgba8Unorm);
        assert_eq!(TextureType::Rgba4444.bytes_per_pixel(), 2);
        assert_eq!(
            TextureType::Rgba8888.bytes_per_pixel(),
            TextureType::Rgba8888.format().block_size()
        );
    }

    #[test]
    fn test_extent() {
        let extent = Extent2d::new(640, 480);
        assert_eq!(extent.pixel_count(), 307_200);
        assert!(!extent.is_empty());
        assert!(Extent2d::new(0, 4).is_empty());
    }
}
