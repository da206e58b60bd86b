//! Configuration system

pub use serde::{Deserialize, Serialize};

use std::path::Path;
use std::time::Duration;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of a [`CanvasRenderer`](crate::CanvasRenderer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots
    pub max_frames_in_flight: usize,
    /// Bound on every fence wait, in milliseconds
    pub fence_timeout_ms: u64,
    /// Binding tables each slot's pool starts with
    pub initial_binding_capacity: u32,
    /// Binding tables one draw call consumes
    pub tables_per_draw: u32,
    /// Run a deletion sweep every this many ticks; 0 leaves it to the caller
    pub garbage_collect_interval: u32,
    /// Color the target is cleared to at the start of a frame
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            fence_timeout_ms: 60_000,
            initial_binding_capacity: 64,
            tables_per_draw: 1,
            garbage_collect_interval: 0,
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    pub const fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Reject settings the renderer cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid("max_frames_in_flight must be at least 1".into()));
        }
        if self.tables_per_draw == 0 {
            return Err(ConfigError::Invalid("tables_per_draw must be at least 1".into()));
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("canvas_gpu_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fence_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_frames_is_rejected() {
        let config = RendererConfig {
            max_frames_in_flight: 0,
            ..RendererConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RendererConfig = toml::from_str("max_frames_in_flight = 3\nclear_color = [0.1, 0.2, 0.3, 1.0]").unwrap();
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.initial_binding_capacity, 64);
        assert_relative_eq!(config.clear_color[2], 0.3);
    }

    #[test]
    fn test_toml_file_round_trip() {
        let path = temp_path("renderer.toml");
        let config = RendererConfig {
            garbage_collect_interval: 120,
            ..RendererConfig::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_file_round_trip() {
        let path = temp_path("renderer.ron");
        let config = RendererConfig {
            tables_per_draw: 2,
            ..RendererConfig::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = RendererConfig::default().save_to_file(temp_path("renderer.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
