//! CPU-side texture types.
//!
//! Provides [`TextureFormat`] (with the `Undefined` empty sentinel),
//! [`TextureType`] for decoded source pixels, [`Extent2d`], mip chain
//! arithmetic and the pixel helpers used when the GPU path cannot be taken.

pub mod convert;
pub mod mipmap;
mod types;

pub use convert::widen_to_rgba8888;
pub use mipmap::{generate_mip_chain, mip_chain_size, mip_extent, mip_level_count, mip_offset};
pub use types::{Extent2d, TextureFormat, TextureType};
