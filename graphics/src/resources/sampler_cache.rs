//! Hardware samplers memoized by their masked parameter bits.

use std::collections::HashMap;
use std::sync::Arc;

use texvault_core::sampler::{AddressMode, FilterMode, SamplerDescriptor, SamplerParams};

use crate::backend::{DeviceCapabilities, GpuBackend, GpuSampler, RawSampler};
use crate::config::{TextureFiltering, TextureSettings};
use crate::error::GraphicsResult;

/// Build the sampler description for `params` under the global settings.
pub fn sampler_descriptor(
    params: SamplerParams,
    settings: &TextureSettings,
    capabilities: &DeviceCapabilities,
) -> SamplerDescriptor {
    let linear = match settings.filtering {
        TextureFiltering::Default => params.filter_mode() != 0,
        TextureFiltering::Nearest => false,
        TextureFiltering::Linear => true,
    };
    let filter = if linear {
        FilterMode::Linear
    } else {
        FilterMode::Nearest
    };

    let wrap = |clamp: bool, flip: bool| {
        if clamp {
            AddressMode::ClampToEdge
        } else if flip {
            AddressMode::MirrorRepeat
        } else {
            AddressMode::Repeat
        }
    };

    let mut descriptor = SamplerDescriptor {
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: filter,
        mip_lod_bias: if capabilities.mip_lod_bias {
            params.lod_bias()
        } else {
            0.0
        },
        ..SamplerDescriptor::default()
    }
    .with_label(format!("sampler#{:05x}", params.key()))
    .with_address_modes(
        wrap(params.clamp_u(), params.flip_u()),
        wrap(params.clamp_v(), params.flip_v()),
    );

    if linear && settings.anisotropic_filtering > 1 && capabilities.sampler_anisotropy {
        descriptor = descriptor.with_anisotropy(
            (settings.anisotropic_filtering as f32).min(capabilities.max_sampler_anisotropy),
        );
    }
    descriptor
}

/// Lazily created samplers, one per distinct key.
///
/// There is no eviction: the key space is a handful of bits.
pub struct SamplerCache {
    backend: Arc<dyn GpuBackend>,
    settings: TextureSettings,
    samplers: HashMap<u32, GpuSampler>,
}

impl std::fmt::Debug for SamplerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerCache")
            .field("settings", &self.settings)
            .field("len", &self.samplers.len())
            .finish()
    }
}

impl SamplerCache {
    pub fn new(backend: Arc<dyn GpuBackend>, settings: TextureSettings) -> Self {
        Self {
            backend,
            settings,
            samplers: HashMap::new(),
        }
    }

    /// Sampler for `params`, created on first use.
    ///
    /// Parameter words with the same masked key share one sampler.
    pub fn get_sampler(&mut self, params: SamplerParams) -> GraphicsResult<RawSampler> {
        let key = params.key();
        if let Some(sampler) = self.samplers.get(&key) {
            return Ok(sampler.raw());
        }

        let descriptor = sampler_descriptor(params, &self.settings, &self.backend.capabilities());
        let sampler = self.backend.create_sampler(&descriptor)?;
        log::debug!(
            "Created sampler for key {:#x}: {:?}/{:?}, aniso {}",
            key,
            descriptor.address_mode_u,
            descriptor.mag_filter,
            descriptor.max_anisotropy
        );
        let raw = sampler.raw();
        self.samplers.insert(key, sampler);
        Ok(raw)
    }

    /// Destroy every cached sampler.
    pub fn term(&mut self) {
        if !self.samplers.is_empty() {
            log::debug!("Releasing {} samplers", self.samplers.len());
        }
        self.samplers.clear();
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn settings(&self) -> &TextureSettings {
        &self.settings
    }

    /// Replace the filtering settings. Samplers already cached keep the old
    /// settings until [`SamplerCache::term`] is called.
    pub fn set_settings(&mut self, settings: TextureSettings) {
        self.settings = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texvault_core::sampler::LOD_BIAS_TABLE;

    fn settings(filtering: TextureFiltering, anisotropy: u32) -> TextureSettings {
        TextureSettings {
            filtering,
            anisotropic_filtering: anisotropy,
        }
    }

    #[test]
    fn test_per_texture_filter() {
        let caps = DeviceCapabilities::default();
        let defaults = TextureSettings::default();

        let point = sampler_descriptor(SamplerParams::default(), &defaults, &caps);
        assert_eq!(point.mag_filter, FilterMode::Nearest);
        assert_eq!(point.mipmap_filter, FilterMode::Nearest);

        let bilinear = sampler_descriptor(
            SamplerParams::default().with_filter_mode(1),
            &defaults,
            &caps,
        );
        assert_eq!(bilinear.min_filter, FilterMode::Linear);
        assert_eq!(bilinear.mipmap_filter, FilterMode::Linear);
    }

    #[test]
    fn test_forced_filtering() {
        let caps = DeviceCapabilities::default();
        let linear_params = SamplerParams::default().with_filter_mode(2);
        let forced = sampler_descriptor(
            linear_params,
            &settings(TextureFiltering::Nearest, 1),
            &caps,
        );
        assert_eq!(forced.mag_filter, FilterMode::Nearest);

        let forced = sampler_descriptor(
            SamplerParams::default(),
            &settings(TextureFiltering::Linear, 1),
            &caps,
        );
        assert_eq!(forced.mag_filter, FilterMode::Linear);
    }

    #[test]
    fn test_wrap_modes() {
        let caps = DeviceCapabilities::default();
        let params = SamplerParams::default()
            .with_clamp(true, false)
            .with_flip(true, true);
        let descriptor = sampler_descriptor(params, &TextureSettings::default(), &caps);
        assert_eq!(descriptor.address_mode_u, AddressMode::ClampToEdge);
        assert_eq!(descriptor.address_mode_v, AddressMode::MirrorRepeat);
        assert_eq!(descriptor.address_mode_w, AddressMode::ClampToEdge);

        let repeat = sampler_descriptor(
            SamplerParams::default(),
            &TextureSettings::default(),
            &caps,
        );
        assert_eq!(repeat.address_mode_u, AddressMode::Repeat);
        assert_eq!(repeat.lod_max_clamp, 256.0);
    }

    #[test]
    fn test_anisotropy_rules() {
        let caps = DeviceCapabilities {
            max_sampler_anisotropy: 8.0,
            ..Default::default()
        };
        let linear = SamplerParams::default().with_filter_mode(1);

        let clamped = sampler_descriptor(linear, &settings(TextureFiltering::Default, 16), &caps);
        assert!(clamped.anisotropy_enable);
        assert_eq!(clamped.max_anisotropy, 8.0);

        let nearest = sampler_descriptor(
            SamplerParams::default(),
            &settings(TextureFiltering::Default, 16),
            &caps,
        );
        assert!(!nearest.anisotropy_enable);

        let off = sampler_descriptor(linear, &settings(TextureFiltering::Default, 1), &caps);
        assert!(!off.anisotropy_enable);

        let unsupported = DeviceCapabilities {
            sampler_anisotropy: false,
            ..caps
        };
        let hw_off = sampler_descriptor(
            linear,
            &settings(TextureFiltering::Default, 4),
            &unsupported,
        );
        assert!(!hw_off.anisotropy_enable);
    }

    #[test]
    fn test_lod_bias() {
        let params = SamplerParams::default().with_mip_map_d(3);
        let caps = DeviceCapabilities::default();
        let biased = sampler_descriptor(params, &TextureSettings::default(), &caps);
        assert_eq!(biased.mip_lod_bias, LOD_BIAS_TABLE[3]);

        let no_bias = DeviceCapabilities {
            mip_lod_bias: false,
            ..caps
        };
        let flat = sampler_descriptor(params, &TextureSettings::default(), &no_bias);
        assert_eq!(flat.mip_lod_bias, 0.0);
    }
}
