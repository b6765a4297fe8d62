//! CPU-side sampler types.
//!
//! Provides [`SamplerParams`], the packed per-texture sampling word whose
//! masked bits key the sampler cache, and [`SamplerDescriptor`] with the
//! [`FilterMode`], [`AddressMode`] and [`BorderColor`] enums shared between
//! CPU and GPU code.

mod params;
mod types;

pub use params::{LOD_BIAS_TABLE, SAMPLER_KEY_MASK, SamplerParams};
pub use types::{AddressMode, BorderColor, FilterMode, SamplerDescriptor};
