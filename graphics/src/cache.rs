//! Texture cache facade driven by the frame loop.
//!
//! Owns the cached [`Texture`]s, the [`FrameTrash`] their evicted handles go
//! through and the [`SamplerCache`].
//!
//! ```ignore
//! let mut cache = TextureCache::new(backend, config);
//! loop {
//!     cache.set_current_index(frame_slot);
//!     cache.cleanup();
//!     let texture = cache.get_texture(key, TextureType::Rgb565, params);
//!     if texture.is_empty() {
//!         cache.update_texture(&key, &mut cmd, w, h, &pixels, true, false)?;
//!     }
//!     cache.set_in_flight(&key);
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use texvault_core::sampler::SamplerParams;
use texvault_core::texture::{TextureType, widen_to_rgba8888};

use crate::backend::{CommandStream, GpuBackend, RawSampler};
use crate::config::{RendererConfig, TextureSettings};
use crate::deferred::FrameTrash;
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{SamplerCache, Texture, TextureId};

struct CacheEntry {
    texture: Texture,
    last_used: u64,
}

/// Keyed textures with frame-deferred destruction.
pub struct TextureCache<K> {
    backend: Arc<dyn GpuBackend>,
    config: RendererConfig,
    entries: HashMap<K, CacheEntry>,
    keys_by_id: HashMap<TextureId, K>,
    trash: FrameTrash,
    samplers: SamplerCache,
    frame: u64,
}

impl<K: Debug> Debug for TextureCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("backend", &self.backend.name())
            .field("textures", &self.entries.len())
            .field("frame", &self.frame)
            .field("trash", &self.trash)
            .field("samplers", &self.samplers)
            .finish()
    }
}

impl<K> TextureCache<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(backend: Arc<dyn GpuBackend>, config: RendererConfig) -> Self {
        log::info!(
            "Texture cache on {} backend ({} frames in flight)",
            backend.name(),
            config.frames.in_flight
        );
        Self {
            samplers: SamplerCache::new(Arc::clone(&backend), config.textures),
            trash: FrameTrash::new(config.frames.in_flight),
            backend,
            config,
            entries: HashMap::new(),
            keys_by_id: HashMap::new(),
            frame: 0,
        }
    }

    /// Find or create the texture for `key` and mark it used this frame.
    pub fn get_texture(
        &mut self,
        key: K,
        tex_type: TextureType,
        params: SamplerParams,
    ) -> &mut Texture {
        let frame = self.frame;
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            let texture = Texture::new(Arc::clone(&self.backend), tex_type, params);
            self.keys_by_id.insert(texture.id(), key);
            CacheEntry {
                texture,
                last_used: frame,
            }
        });
        entry.last_used = frame;
        entry.texture.set_tex_type(tex_type);
        entry.texture.set_params(params);
        &mut entry.texture
    }

    /// The texture for `key`, if cached.
    pub fn find(&self, key: &K) -> Option<&Texture> {
        self.entries.get(key).map(|entry| &entry.texture)
    }

    /// Upload new pixels for `key`.
    ///
    /// A texture referenced by recorded work, including an earlier upload in
    /// this frame, gets fresh hardware objects; its old ones go through the
    /// trash. The upload itself marks the texture in flight for the current
    /// slot. Pixels in a format the device cannot sample are widened to
    /// RGBA8888 first.
    #[allow(clippy::too_many_arguments)]
    pub fn update_texture(
        &mut self,
        key: &K,
        cmd: &mut CommandStream,
        width: u32,
        height: u32,
        data: &[u8],
        mipmapped: bool,
        mipmaps_included: bool,
    ) -> GraphicsResult<()> {
        texvault_core::profile_scope!("TextureCache::update_texture");

        let entry = self.entries.get_mut(key).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("no cached texture for {:?}", key))
        })?;
        let texture = &mut entry.texture;

        if self.trash.is_referenced(texture.id()) && self.trash.destroy_later(texture) {
            log::trace!("Texture {:?} in flight, replacing its hardware objects", key);
        }

        let tex_type = texture.tex_type();
        let widened;
        let data = if tex_type != TextureType::Rgba8888 && texture.force_32bit_texture(tex_type) {
            log::warn!(
                "{:?} cannot be sampled, widening texture {:?} to RGBA8888",
                tex_type.format(),
                key
            );
            widened = widen_to_rgba8888(tex_type, data);
            texture.set_tex_type(TextureType::Rgba8888);
            widened.as_slice()
        } else {
            data
        };

        texture.upload(cmd, width, height, data, mipmapped, mipmaps_included)?;
        self.trash.mark_in_flight(texture.id());
        entry.last_used = self.frame;
        Ok(())
    }

    /// Advance to frame slot `index`, destroying what was queued into it.
    pub fn set_current_index(&mut self, index: usize) {
        texvault_core::frame_mark!();
        self.frame += 1;
        let entries = &mut self.entries;
        let keys_by_id = &self.keys_by_id;
        self.trash.advance_frame(index, |id| {
            if let Some(entry) = keys_by_id.get(&id).and_then(|key| entries.get_mut(key)) {
                entry.texture.clear_read_only_image_view();
            }
        });
    }

    /// Delete textures unused for more than `max_idle_frames`, at most
    /// `max_evictions_per_cleanup` per call. Returns how many were deleted.
    pub fn cleanup(&mut self) -> usize {
        texvault_core::profile_function!();

        let max_idle = self.config.cache.max_idle_frames;
        let frame = self.frame;
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| frame.saturating_sub(entry.last_used) > max_idle)
            .map(|(key, _)| key.clone())
            .take(self.config.cache.max_evictions_per_cleanup)
            .collect();

        for key in &stale {
            let Some(mut entry) = self.entries.remove(key) else {
                continue;
            };
            let id = entry.texture.id();
            if self.trash.is_referenced(id) {
                self.trash.destroy_later(&mut entry.texture);
            }
            self.trash.forget(id);
            self.keys_by_id.remove(&id);
        }
        if !stale.is_empty() {
            log::debug!(
                "Cleanup evicted {} textures ({} remain)",
                stale.len(),
                self.entries.len()
            );
        }
        stale.len()
    }

    /// Queue the hardware objects of `key` for destruction, keeping the
    /// (now empty) cache entry. Returns `false` if there was nothing to queue.
    pub fn destroy_later(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => self.trash.destroy_later(&mut entry.texture),
            None => false,
        }
    }

    /// Whether work recorded under another frame slot uses `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| self.trash.is_in_flight(entry.texture.id()))
    }

    /// Record that work recorded under the current slot uses `key`.
    pub fn set_in_flight(&mut self, key: &K) {
        if let Some(entry) = self.entries.get(key) {
            self.trash.mark_in_flight(entry.texture.id());
        }
    }

    /// Remove `key`; its hardware objects go through the trash.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(mut entry) = self.entries.remove(key) else {
            return false;
        };
        let id = entry.texture.id();
        self.trash.destroy_later(&mut entry.texture);
        self.trash.forget(id);
        self.keys_by_id.remove(&id);
        true
    }

    /// Drop every texture and every deferred handle immediately.
    ///
    /// The caller guarantees the GPU is idle.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys_by_id.clear();
        self.trash.clear();
    }

    /// Clear the cache and release all samplers, e.g. on device loss.
    pub fn term(&mut self) {
        self.clear();
        self.samplers.term();
    }

    /// Sampler for the parameters of `key`'s texture.
    pub fn sampler(&mut self, key: &K) -> GraphicsResult<RawSampler> {
        let params = self
            .entries
            .get(key)
            .map(|entry| entry.texture.params())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("no cached texture for {:?}", key))
            })?;
        self.samplers.get_sampler(params)
    }

    /// Replace the sampling settings and drop samplers built with the old ones.
    pub fn set_texture_settings(&mut self, settings: TextureSettings) {
        self.config.textures = settings;
        self.samplers.set_settings(settings);
        self.samplers.term();
    }

    pub fn samplers(&mut self) -> &mut SamplerCache {
        &mut self.samplers
    }

    pub fn trash(&self) -> &FrameTrash {
        &self.trash
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `set_current_index` calls so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, DummyOptions, ResourceKind};
    use texvault_core::texture::TextureFormat;

    fn cache_with(options: DummyOptions) -> (Arc<DummyBackend>, TextureCache<u32>) {
        let backend = Arc::new(DummyBackend::with_options(options));
        let cache = TextureCache::new(backend.clone(), RendererConfig::default());
        (backend, cache)
    }

    #[test]
    fn test_get_texture_is_find_or_create() {
        let (_backend, mut cache) = cache_with(DummyOptions::default());
        let id = cache
            .get_texture(1, TextureType::Rgba8888, SamplerParams::default())
            .id();
        let again = cache
            .get_texture(1, TextureType::Rgba8888, SamplerParams::default())
            .id();
        assert_eq!(id, again);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unsupported_format_widened() {
        let (backend, mut cache) = cache_with(DummyOptions {
            unsupported_formats: vec![TextureFormat::Rgb565Unorm],
            ..Default::default()
        });
        cache.get_texture(7, TextureType::Rgb565, SamplerParams::default());
        let mut cmd = backend.command_stream();
        cache
            .update_texture(&7, &mut cmd, 2, 2, &[0xff; 8], false, false)
            .unwrap();

        let texture = cache.find(&7).unwrap();
        assert_eq!(texture.tex_type(), TextureType::Rgba8888);
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
        assert_eq!(
            texture.staging_buffer().unwrap().read().unwrap(),
            vec![0xff; 16]
        );
    }

    #[test]
    fn test_update_in_flight_texture_defers_old_image() {
        let (backend, mut cache) = cache_with(DummyOptions::default());
        let mut cmd = backend.command_stream();
        cache.get_texture(1, TextureType::Rgba8888, SamplerParams::default());
        cache
            .update_texture(&1, &mut cmd, 4, 4, &[0; 64], false, false)
            .unwrap();
        let old_image = cache.find(&1).unwrap().image();

        cache.set_in_flight(&1);
        cache.set_current_index(1);
        assert!(cache.is_in_flight(&1));

        cache
            .update_texture(&1, &mut cmd, 4, 4, &[0; 64], false, false)
            .unwrap();
        assert_ne!(cache.find(&1).unwrap().image(), old_image);
        assert_eq!(backend.ledger().live(ResourceKind::Image), 2);

        cache.set_current_index(0);
        cache.set_current_index(1);
        assert_eq!(backend.ledger().live(ResourceKind::Image), 1);
    }

    #[test]
    fn test_second_upload_in_frame_defers_first_objects() {
        let (backend, mut cache) = cache_with(DummyOptions::default());
        let mut cmd = backend.command_stream();
        cache.get_texture(1, TextureType::Rgba8888, SamplerParams::default());
        cache
            .update_texture(&1, &mut cmd, 4, 4, &[0; 64], false, false)
            .unwrap();
        cache
            .update_texture(&1, &mut cmd, 4, 4, &[1; 64], false, false)
            .unwrap();
        assert_eq!(backend.ledger().live(ResourceKind::Image), 2);
        assert_eq!(backend.ledger().live(ResourceKind::Buffer), 2);

        cache.set_current_index(1);
        assert_eq!(backend.ledger().live(ResourceKind::Buffer), 2);
        cache.set_current_index(0);
        assert_eq!(backend.ledger().live(ResourceKind::Image), 1);
        assert_eq!(backend.ledger().live(ResourceKind::Buffer), 1);
        assert_eq!(backend.ledger().double_frees(), 0);
    }

    #[test]
    fn test_missing_key_is_invalid() {
        let (backend, mut cache) = cache_with(DummyOptions::default());
        let mut cmd = backend.command_stream();
        let err = cache
            .update_texture(&3, &mut cmd, 1, 1, &[0; 4], false, false)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));
        assert!(cache.sampler(&3).is_err());
    }

    #[test]
    fn test_sampler_shared_between_textures() {
        let (backend, mut cache) = cache_with(DummyOptions::default());
        let params = SamplerParams::default().with_filter_mode(1);
        cache.get_texture(1, TextureType::Rgba8888, params);
        cache.get_texture(2, TextureType::Rgba8888, params.with_super_sample(true));
        let a = cache.sampler(&1).unwrap();
        let b = cache.sampler(&2).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.ledger().created(ResourceKind::Sampler), 1);

        cache.term();
        assert_eq!(backend.ledger().live(ResourceKind::Sampler), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_defers_destruction() {
        let (backend, mut cache) = cache_with(DummyOptions::default());
        let mut cmd = backend.command_stream();
        cache.get_texture(1, TextureType::Rgba8888, SamplerParams::default());
        cache
            .update_texture(&1, &mut cmd, 4, 4, &[0; 64], false, false)
            .unwrap();

        assert!(cache.remove(&1));
        assert!(!cache.remove(&1));
        assert_eq!(backend.ledger().live(ResourceKind::Image), 1);
        cache.set_current_index(1);
        cache.set_current_index(0);
        assert_eq!(backend.ledger().live_total(), 0);
    }
}
