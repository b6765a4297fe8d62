//! Sampler filter/address modes and the sampler descriptor.

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest neighbor filtering.
    #[default]
    Nearest,
    /// Linear filtering.
    Linear,
}

/// Texture address mode (wrapping behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Clamp to edge.
    #[default]
    ClampToEdge,
    /// Repeat.
    Repeat,
    /// Mirrored repeat.
    MirrorRepeat,
}

/// Border color used by clamp-to-border addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    /// Opaque black.
    #[default]
    OpaqueBlack,
    /// Transparent black.
    TransparentBlack,
}

/// Full description of a hardware sampler.
///
/// Built by the sampler cache from packed per-texture parameters and the
/// global filtering settings, then handed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    /// Debug label for the sampler.
    pub label: Option<String>,
    /// Address mode for U coordinate.
    pub address_mode_u: AddressMode,
    /// Address mode for V coordinate.
    pub address_mode_v: AddressMode,
    /// Address mode for W coordinate.
    pub address_mode_w: AddressMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Mipmap filter.
    pub mipmap_filter: FilterMode,
    /// Bias added to the computed level of detail.
    pub mip_lod_bias: f32,
    /// Whether anisotropic filtering is enabled.
    pub anisotropy_enable: bool,
    /// Maximum anisotropy level, only meaningful when enabled.
    pub max_anisotropy: f32,
    /// Minimum LOD clamp.
    pub lod_min_clamp: f32,
    /// Maximum LOD clamp.
    pub lod_max_clamp: f32,
    /// Border color.
    pub border_color: BorderColor,
}

impl SamplerDescriptor {
    /// Create a linear filtering sampler.
    pub fn linear() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..Default::default()
        }
    }

    /// Create a nearest neighbor filtering sampler.
    pub fn nearest() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set address modes for U and V.
    pub fn with_address_modes(mut self, u: AddressMode, v: AddressMode) -> Self {
        self.address_mode_u = u;
        self.address_mode_v = v;
        self
    }

    /// Enable anisotropic filtering at `level`.
    pub fn with_anisotropy(mut self, level: f32) -> Self {
        self.anisotropy_enable = true;
        self.max_anisotropy = level;
        self
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            lod_min_clamp: 0.0,
            lod_max_clamp: 256.0,
            border_color: BorderColor::OpaqueBlack,
        }
    }
}
