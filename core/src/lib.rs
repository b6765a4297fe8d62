//! # texvault core
//!
//! CPU-side types shared by the texvault GPU texture lifecycle manager:
//! texture formats and source pixel types, mip chain arithmetic, the packed
//! sampler parameter word and the sampler descriptor.

pub mod profiling;
pub mod sampler;
pub mod texture;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
