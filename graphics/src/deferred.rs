//! Frame-indexed deferred destruction of texture resources.
//!
//! Command buffers execute on the GPU while the CPU records later frames, so
//! a texture evicted during frame N may still be sampled by work submitted
//! in frames N-1, N-2, ... Its handles cannot be destroyed on eviction.
//!
//! Instead they are moved into the bin of the frame slot being recorded and
//! destroyed when that slot becomes current again, by which point the frame
//! pacing code has waited for the slot's previous submission to retire.
//!
//! ```text
//!   slot:        0          1          2          0
//!             ┌──────┐   ┌──────┐   ┌──────┐   ┌──────┐
//!   frame:    │  N   │ → │ N+1  │ → │ N+2  │ → │ N+3  │
//!             └──────┘   └──────┘   └──────┘   └──────┘
//!   destroy_later(A) in N  ───────────────────►  A destroyed here
//! ```
//!
//! A bin is drained in a fixed order: in-flight ids, image views, images,
//! memory allocations, staging buffers.

use std::collections::HashSet;

use crate::backend::{GpuBuffer, GpuImage, GpuImageView, GpuMemory};
use crate::resources::{Texture, TextureId};

#[derive(Default)]
struct FrameBin {
    in_flight: HashSet<TextureId>,
    image_views: Vec<GpuImageView>,
    images: Vec<GpuImage>,
    memory: Vec<GpuMemory>,
    buffers: Vec<GpuBuffer>,
}

impl FrameBin {
    fn pending(&self) -> usize {
        self.image_views.len() + self.images.len() + self.memory.len() + self.buffers.len()
    }

    /// Destroy everything in the bin. Returns the number of handles destroyed.
    fn drain(&mut self) -> usize {
        let destroyed = self.pending();
        self.in_flight.clear();
        self.image_views.clear();
        self.images.clear();
        self.memory.clear();
        self.buffers.clear();
        destroyed
    }
}

/// Per-frame-slot bins of handles awaiting destruction, plus the set of
/// textures used by each slot's work.
pub struct FrameTrash {
    bins: Vec<FrameBin>,
    current_index: usize,
}

impl std::fmt::Debug for FrameTrash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTrash")
            .field("depth", &self.bins.len())
            .field("current_index", &self.current_index)
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

impl FrameTrash {
    /// Create a trash with one bin per frame in flight. A depth of zero is
    /// treated as one.
    pub fn new(depth: usize) -> Self {
        Self {
            bins: (0..depth.max(1)).map(|_| FrameBin::default()).collect(),
            current_index: 0,
        }
    }

    /// Make slot `new_index` current and destroy what was queued into it.
    ///
    /// Before switching, `release_alias` is called for every texture marked in
    /// flight under the previous slot so its read-only alias view can be
    /// dropped. Returns the number of handles destroyed.
    pub fn advance_frame(
        &mut self,
        new_index: usize,
        mut release_alias: impl FnMut(TextureId),
    ) -> usize {
        texvault_core::profile_scope!("FrameTrash::advance_frame");

        for &id in &self.bins[self.current_index].in_flight {
            release_alias(id);
        }

        self.current_index = new_index % self.bins.len();
        let destroyed = self.bins[self.current_index].drain();
        if destroyed > 0 {
            log::debug!(
                "Frame slot {}: destroyed {} deferred handles",
                self.current_index,
                destroyed
            );
        }
        texvault_core::profile_plot!("deferred handles", self.pending_count() as f64);
        destroyed
    }

    /// Move the texture's handles into the current bin and reset its format
    /// to the empty sentinel.
    ///
    /// Returns `false`, doing nothing, when the texture holds no image, which
    /// makes repeated calls harmless.
    pub fn destroy_later(&mut self, texture: &mut Texture) -> bool {
        let Some(retired) = texture.retire() else {
            return false;
        };
        log::trace!(
            "Texture {:?} queued for destruction in slot {}",
            retired.id,
            self.current_index
        );

        let bin = &mut self.bins[self.current_index];
        bin.image_views.extend(retired.image_view);
        bin.images.extend(retired.image);
        bin.memory.extend(retired.memory);
        bin.buffers.extend(retired.staging);
        true
    }

    /// Record that work recorded under the current slot uses `id`.
    pub fn mark_in_flight(&mut self, id: TextureId) {
        self.bins[self.current_index].in_flight.insert(id);
    }

    /// Whether `id` is used by work recorded under any slot other than the
    /// current one.
    ///
    /// Usage in the slot being recorded is not a hazard for decisions made
    /// while recording it.
    pub fn is_in_flight(&self, id: TextureId) -> bool {
        self.bins
            .iter()
            .enumerate()
            .any(|(index, bin)| index != self.current_index && bin.in_flight.contains(&id))
    }

    /// Whether work recorded under any slot, the current one included, uses
    /// `id`.
    pub fn is_referenced(&self, id: TextureId) -> bool {
        self.bins.iter().any(|bin| bin.in_flight.contains(&id))
    }

    /// Remove `id` from every in-flight set.
    pub fn forget(&mut self, id: TextureId) {
        for bin in &mut self.bins {
            bin.in_flight.remove(&id);
        }
    }

    /// Destroy everything in every bin immediately.
    ///
    /// The caller guarantees the GPU is idle.
    pub fn clear(&mut self) {
        let destroyed: usize = self.bins.iter_mut().map(FrameBin::drain).sum();
        if destroyed > 0 {
            log::debug!("Destroyed {} deferred handles immediately", destroyed);
        }
    }

    /// Handles waiting in all bins.
    pub fn pending_count(&self) -> usize {
        self.bins.iter().map(FrameBin::pending).sum()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Number of bins.
    pub fn depth(&self) -> usize {
        self.bins.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{DummyBackend, ResourceKind};
    use texvault_core::sampler::SamplerParams;
    use texvault_core::texture::TextureType;

    fn uploaded_texture(backend: &Arc<DummyBackend>) -> Texture {
        let mut texture = Texture::new(
            backend.clone(),
            TextureType::Rgba8888,
            SamplerParams::default(),
        );
        let mut cmd = backend.command_stream();
        texture
            .upload(&mut cmd, 4, 4, &[0; 64], false, false)
            .unwrap();
        texture
    }

    #[test]
    fn test_zero_depth_is_one_bin() {
        let trash = FrameTrash::new(0);
        assert_eq!(trash.depth(), 1);
    }

    #[test]
    fn test_destroyed_when_slot_returns() {
        let backend = Arc::new(DummyBackend::new());
        let mut texture = uploaded_texture(&backend);
        let mut trash = FrameTrash::new(2);

        assert!(trash.destroy_later(&mut texture));
        assert_eq!(trash.pending_count(), 4);

        assert_eq!(trash.advance_frame(1, |_| {}), 0);
        assert_eq!(backend.ledger().live(ResourceKind::Image), 1);
        assert_eq!(trash.advance_frame(0, |_| {}), 4);
        assert_eq!(backend.ledger().live_total(), 0);
    }

    #[test]
    fn test_index_wraps_modulo_depth() {
        let mut trash = FrameTrash::new(3);
        trash.advance_frame(7, |_| {});
        assert_eq!(trash.current_index(), 1);
    }

    #[test]
    fn test_second_destroy_later_is_noop() {
        let backend = Arc::new(DummyBackend::new());
        let mut texture = uploaded_texture(&backend);
        let mut trash = FrameTrash::new(2);

        assert!(trash.destroy_later(&mut texture));
        assert!(!trash.destroy_later(&mut texture));
        assert_eq!(trash.pending_count(), 4);
    }

    #[test]
    fn test_in_flight_excludes_current_slot() {
        let backend = Arc::new(DummyBackend::new());
        let texture = uploaded_texture(&backend);
        let id = texture.id();
        let mut trash = FrameTrash::new(2);

        assert!(!trash.is_in_flight(id));
        trash.mark_in_flight(id);
        assert!(!trash.is_in_flight(id));

        trash.advance_frame(1, |_| {});
        assert!(trash.is_in_flight(id));

        trash.advance_frame(0, |_| {});
        assert!(!trash.is_in_flight(id));
    }

    #[test]
    fn test_referenced_includes_current_slot() {
        let backend = Arc::new(DummyBackend::new());
        let texture = uploaded_texture(&backend);
        let id = texture.id();
        let mut trash = FrameTrash::new(2);

        assert!(!trash.is_referenced(id));
        trash.mark_in_flight(id);
        assert!(trash.is_referenced(id));
        assert!(!trash.is_in_flight(id));

        trash.advance_frame(1, |_| {});
        assert!(trash.is_referenced(id));
        trash.advance_frame(0, |_| {});
        assert!(!trash.is_referenced(id));
    }

    #[test]
    fn test_release_alias_called_for_previous_slot() {
        let backend = Arc::new(DummyBackend::new());
        let a = uploaded_texture(&backend);
        let b = uploaded_texture(&backend);
        let mut trash = FrameTrash::new(2);
        trash.mark_in_flight(a.id());

        let mut released = Vec::new();
        trash.advance_frame(1, |id| released.push(id));
        assert_eq!(released, vec![a.id()]);

        trash.mark_in_flight(b.id());
        released.clear();
        trash.advance_frame(0, |id| released.push(id));
        assert_eq!(released, vec![b.id()]);
    }

    #[test]
    fn test_forget_and_clear() {
        let backend = Arc::new(DummyBackend::new());
        let mut texture = uploaded_texture(&backend);
        let id = texture.id();
        let mut trash = FrameTrash::new(2);

        trash.mark_in_flight(id);
        trash.advance_frame(1, |_| {});
        trash.forget(id);
        assert!(!trash.is_in_flight(id));

        trash.destroy_later(&mut texture);
        trash.clear();
        assert_eq!(trash.pending_count(), 0);
        assert_eq!(backend.ledger().live_total(), 0);
    }
}
