//! GPU resources owned by the texture lifecycle.
//!
//! - [`Texture`] - sampled image with its view, memory and staging buffer
//! - [`SamplerCache`] - samplers memoized by masked parameter bits
//! - [`FramebufferAttachment`] - render-target image with optional stencil view
//!   and readback buffer
//!
//! Every resource holds an `Arc` of the [`GpuBackend`] that created it, so the
//! device outlives its handles.
//!
//! [`GpuBackend`]: crate::backend::GpuBackend

mod attachment;
mod sampler_cache;
mod texture;

pub use attachment::FramebufferAttachment;
pub use sampler_cache::{SamplerCache, sampler_descriptor};
pub use texture::{RetiredTexture, Texture, TextureId};
