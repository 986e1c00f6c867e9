//! Engine configuration
//!
//! Loaded from TOML. Every section and field is optional:
//!
//! ```toml
//! [engine]
//! viewport_width = 1280
//! viewport_height = 720
//! clear_color = [0.1, 0.1, 0.12, 1.0]
//! fixed_time_step = 0.016
//!
//! [camera]
//! fov = 60.0
//! position = [0.0, 2.0, 10.0]
//! target = [0.0, 0.0, 0.0]
//!
//! [scene]
//! ambient_color = [0.2, 0.2, 0.2, 1.0]
//! ```

use prism_core::{Color, Vec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: RenderConfig,
    pub camera: CameraConfig,
    pub scene: SceneConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Frame loop and output settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub clear_color: [f32; 4],
    /// Upper bound for a single frame's delta time, in seconds
    pub max_delta_time: f32,
    pub time_scale: f32,
    /// Use a fixed delta instead of the wall clock
    pub fixed_time_step: Option<f32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800,
            viewport_height: 600,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_delta_time: 0.25,
            time_scale: 1.0,
            fixed_time_step: None,
        }
    }
}

impl RenderConfig {
    pub fn clear_color(&self) -> Color {
        Color::from_array(self.clear_color)
    }
}

/// Initial camera setup
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub orthographic: bool,
    pub orthographic_size: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 45.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 0.0, 10.0],
            target: [0.0, 0.0, 0.0],
            orthographic: false,
            orthographic_size: 10.0,
        }
    }
}

impl CameraConfig {
    pub fn position(&self) -> Vec3 {
        let [x, y, z] = self.position;
        Vec3::new(x, y, z)
    }

    pub fn target(&self) -> Vec3 {
        let [x, y, z] = self.target;
        Vec3::new(x, y, z)
    }
}

/// Scene-wide settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub name: String,
    pub ambient_color: [f32; 4],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            name: "scene".to_string(),
            ambient_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

impl SceneConfig {
    pub fn ambient_color(&self) -> Color {
        Color::from_array(self.ambient_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [engine]
            viewport_width = 1280

            [camera]
            fov = 60.0
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.viewport_width, 1280);
        assert_eq!(config.engine.viewport_height, 600);
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.camera.position(), Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(config.scene, SceneConfig::default());
    }

    #[test]
    fn test_empty_config() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_toml("[engine]\nviewport_width = \"wide\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/definitely/not/here/prism.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
