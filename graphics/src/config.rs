//! Renderer configuration loaded from TOML.
//!
//! ```toml
//! [textures]
//! filtering = "default"       # "default" | "nearest" | "linear"
//! anisotropic_filtering = 4
//!
//! [frames]
//! in_flight = 2
//!
//! [cache]
//! max_idle_frames = 120
//! max_evictions_per_cleanup = 5
//! ```
//!
//! Every field is optional.

use std::path::Path;

use serde::Deserialize;

use crate::error::{GraphicsError, GraphicsResult};

/// Global texture filtering override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFiltering {
    /// Each texture picks nearest or linear from its own parameters.
    #[default]
    Default,
    /// Always nearest.
    Nearest,
    /// Always linear.
    Linear,
}

/// Texture sampling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    pub filtering: TextureFiltering,
    /// Requested anisotropy level; 1 disables anisotropic filtering.
    pub anisotropic_filtering: u32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            filtering: TextureFiltering::Default,
            anisotropic_filtering: 1,
        }
    }
}

/// Frame pacing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Number of frames the GPU may lag behind; the trash keeps one bin per frame.
    pub in_flight: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self { in_flight: 2 }
    }
}

/// Texture cache maintenance settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Frames a texture may go unused before `cleanup` deletes it.
    pub max_idle_frames: u64,
    /// Upper bound on textures deleted by one `cleanup` call.
    pub max_evictions_per_cleanup: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_idle_frames: 120,
            max_evictions_per_cleanup: 5,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub textures: TextureSettings,
    pub frames: FrameSettings,
    pub cache: CacheSettings,
}

impl RendererConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> GraphicsResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| GraphicsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> GraphicsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphicsError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| GraphicsError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    fn validate(&self) -> GraphicsResult<()> {
        if self.frames.in_flight == 0 {
            return Err(GraphicsError::Config(
                "frames.in_flight must be at least 1".to_string(),
            ));
        }
        if !(1..=16).contains(&self.textures.anisotropic_filtering) {
            return Err(GraphicsError::Config(format!(
                "textures.anisotropic_filtering must be in 1..=16, got {}",
                self.textures.anisotropic_filtering
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RendererConfig::from_toml("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.frames.in_flight, 2);
        assert_eq!(config.cache.max_idle_frames, 120);
    }

    #[test]
    fn test_partial_config() {
        let config = RendererConfig::from_toml(
            r#"
            [textures]
            filtering = "linear"
            anisotropic_filtering = 8

            [frames]
            in_flight = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.textures.filtering, TextureFiltering::Linear);
        assert_eq!(config.textures.anisotropic_filtering, 8);
        assert_eq!(config.frames.in_flight, 3);
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        let err = RendererConfig::from_toml("[frames]\nin_flight = 0").unwrap_err();
        assert!(matches!(err, GraphicsError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_filtering() {
        assert!(RendererConfig::from_toml("[textures]\nfiltering = \"cubic\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RendererConfig::load(Path::new("/nonexistent/texvault.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
