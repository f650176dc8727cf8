//! Viewer configuration
//!
//! Loaded from an optional TOML file; every field has a sensible default so
//! the viewer runs without any configuration on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::render::RendererConfig;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error reading the configuration file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("parse error: {0}")]
    Parse(String),
}

/// Top-level viewer configuration
///
/// Validation layers and the frame-in-flight count are runtime options here,
/// not compile-time constants, so the same binary can run with validation on
/// or off and with a deeper frame ring for testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Application name reported to the Vulkan driver and used as window title
    pub app_name: String,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Enable the Khronos validation layer and debug messenger
    pub enable_validation: bool,
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Path to the OBJ model to display
    pub model_path: PathBuf,
    /// Path to the model's texture image
    pub texture_path: PathBuf,
    /// Path to the compiled vertex shader (SPIR-V)
    pub vertex_shader_path: PathBuf,
    /// Path to the compiled fragment shader (SPIR-V)
    pub fragment_shader_path: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            app_name: "Model Viewer".to_string(),
            window_width: 800,
            window_height: 600,
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            model_path: PathBuf::from("assets/cube.obj"),
            texture_path: PathBuf::from("assets/texture.png"),
            vertex_shader_path: PathBuf::from("shaders/model.vert.spv"),
            fragment_shader_path: PathBuf::from("shaders/model.frag.spv"),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file is absent or malformed
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path);
                config
            }
            Err(ConfigError::Io(_)) => {
                log::debug!("No configuration file at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                log::warn!("Invalid configuration at {:?} ({}), using defaults", path, e);
                Self::default()
            }
        }
    }

    /// Extract the subset of options the renderer consumes
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            app_name: self.app_name.clone(),
            enable_validation: self.enable_validation,
            frames_in_flight: self.frames_in_flight,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ViewerConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.window_width > 0 && config.window_height > 0);
    }

    #[test]
    fn parses_partial_toml() {
        let config: ViewerConfig = toml::from_str(
            r#"
            app_name = "test viewer"
            enable_validation = true
            frames_in_flight = 3
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.app_name, "test viewer");
        assert!(config.enable_validation);
        assert_eq!(config.frames_in_flight, 3);
        // unspecified fields fall back to defaults
        assert_eq!(config.window_width, 800);
    }

    #[test]
    fn renderer_config_carries_runtime_toggles() {
        let config = ViewerConfig {
            enable_validation: true,
            frames_in_flight: 4,
            ..ViewerConfig::default()
        };

        let renderer = config.renderer_config();
        assert!(renderer.enable_validation);
        assert_eq!(renderer.frames_in_flight, 4);
    }
}
