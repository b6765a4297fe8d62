//! Packed per-texture sampling parameters.

/// Bits of [`SamplerParams`] that affect the hardware sampler:
/// mip-map D adjust, filter mode, clamp V/U and flip V/U.
pub const SAMPLER_KEY_MASK: u32 = 0x7ef00;

/// Level-of-detail bias indexed by the 4-bit mip-map D adjust field.
pub const LOD_BIAS_TABLE: [f32; 16] = [
    0.0, -4.0, -2.0, -1.0, -0.5, -0.25, 0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0, 2.25,
];

const MIP_MAP_D_SHIFT: u32 = 8;
const SUPER_SAMPLE_BIT: u32 = 12;
const FILTER_MODE_SHIFT: u32 = 13;
const CLAMP_V_BIT: u32 = 15;
const CLAMP_U_BIT: u32 = 16;
const FLIP_V_BIT: u32 = 17;
const FLIP_U_BIT: u32 = 18;

/// Texture sampling parameter word as delivered by the texture decoder.
///
/// Only the bits covered by [`SAMPLER_KEY_MASK`] select a sampler; the rest
/// (texture size codes, shading and blending fields) are carried untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerParams {
    /// The raw parameter word.
    pub full: u32,
}

impl SamplerParams {
    /// Wrap a raw parameter word.
    pub const fn from_bits(full: u32) -> Self {
        Self { full }
    }

    /// Sampler cache key: the masked parameter bits.
    pub const fn key(&self) -> u32 {
        self.full & SAMPLER_KEY_MASK
    }

    /// Mip-map D adjust (index into [`LOD_BIAS_TABLE`]).
    pub const fn mip_map_d(&self) -> u32 {
        (self.full >> MIP_MAP_D_SHIFT) & 0xf
    }

    /// Super-sample flag. Not part of the sampler key.
    pub const fn super_sample(&self) -> bool {
        self.bit(SUPER_SAMPLE_BIT)
    }

    /// Filter mode: 0 is point sampling, anything else is bilinear or better.
    pub const fn filter_mode(&self) -> u32 {
        (self.full >> FILTER_MODE_SHIFT) & 0x3
    }

    /// Clamp in the V direction.
    pub const fn clamp_v(&self) -> bool {
        self.bit(CLAMP_V_BIT)
    }

    /// Clamp in the U direction.
    pub const fn clamp_u(&self) -> bool {
        self.bit(CLAMP_U_BIT)
    }

    /// Mirror in the V direction.
    pub const fn flip_v(&self) -> bool {
        self.bit(FLIP_V_BIT)
    }

    /// Mirror in the U direction.
    pub const fn flip_u(&self) -> bool {
        self.bit(FLIP_U_BIT)
    }

    /// LOD bias for this parameter set.
    pub fn lod_bias(&self) -> f32 {
        LOD_BIAS_TABLE[self.mip_map_d() as usize]
    }

    pub fn with_mip_map_d(self, value: u32) -> Self {
        self.with_field(MIP_MAP_D_SHIFT, 0xf, value)
    }

    pub fn with_super_sample(self, on: bool) -> Self {
        self.with_field(SUPER_SAMPLE_BIT, 1, on as u32)
    }

    pub fn with_filter_mode(self, value: u32) -> Self {
        self.with_field(FILTER_MODE_SHIFT, 0x3, value)
    }

    pub fn with_clamp(self, u: bool, v: bool) -> Self {
        self.with_field(CLAMP_U_BIT, 1, u as u32)
            .with_field(CLAMP_V_BIT, 1, v as u32)
    }

    pub fn with_flip(self, u: bool, v: bool) -> Self {
        self.with_field(FLIP_U_BIT, 1, u as u32)
            .with_field(FLIP_V_BIT, 1, v as u32)
    }

    const fn bit(&self, bit: u32) -> bool {
        self.full & (1 << bit) != 0
    }

    const fn with_field(self, shift: u32, mask: u32, value: u32) -> Self {
        Self {
            full: (self.full & !(mask << shift)) | ((value & mask) << shift),
        }
    }
}
