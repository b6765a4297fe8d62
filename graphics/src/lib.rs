//! # texvault graphics
//!
//! GPU texture lifecycle for an emulator renderer: textures are decoded on the
//! CPU, uploaded through staging buffers, sampled by in-flight frames and
//! destroyed only once no frame can reference them anymore.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Texture`] - image, view, memory and staging buffer of one cached texture
//! - [`SamplerCache`] - samplers keyed by the masked texture parameter word
//! - [`FramebufferAttachment`] - render-target images
//! - [`FrameTrash`] - frame-indexed deferred destruction
//! - [`TextureCache`] - the facade tying them to the frame loop
//! - [`backend`] - the [`GpuBackend`] trait with Vulkan and Dummy backends
//!
//! ## Example
//!
//! ```ignore
//! use texvault_graphics::{BackendType, RendererConfig, TextureCache, create_backend};
//!
//! let backend = create_backend(BackendType::Auto)?;
//! let mut cache = TextureCache::new(backend, RendererConfig::default());
//! cache.set_current_index(0);
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod deferred;
pub mod error;
pub mod resources;

// Re-export main types for convenience
pub use backend::{BackendType, CommandStream, DummyBackend, GpuBackend, create_backend};
pub use cache::TextureCache;
pub use config::{CacheSettings, FrameSettings, RendererConfig, TextureFiltering, TextureSettings};
pub use deferred::FrameTrash;
pub use error::{GraphicsError, GraphicsResult};
pub use resources::{FramebufferAttachment, SamplerCache, Texture, TextureId};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Logs the version; backends may be created without calling this.
pub fn init() {
    log::info!("texvault graphics v{} initialized", VERSION);
}

static_assertions::assert_impl_all!(TextureCache<u64>: Send, Sync);
static_assertions::assert_impl_all!(FrameTrash: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert!(backend.name() == "Dummy");
    }
}
