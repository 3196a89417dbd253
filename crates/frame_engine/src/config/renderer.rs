//! Renderer, camera and window settings

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Upper bound accepted for frames in flight
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Locations of the precompiled SPIR-V shader blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("Shaders/vert.spv", "Shaders/frag.spv")
    }
}

/// Fixed view/projection parameters written into the uniform block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Camera position
    pub eye: [f32; 3],
    /// Point the camera looks at
    pub target: [f32; 3],
    /// World up direction
    pub up: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            eye: [0.0, 0.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

/// Configuration for the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frame slots that may have work queued on the GPU at once
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` follows the build profile)
    pub enable_validation: Option<bool>,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Camera used to fill the view/projection uniform block
    pub camera: CameraConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            enable_validation: None,
            clear_color: [0.6, 0.65, 0.4, 1.0],
            camera: CameraConfig::default(),
        }
    }

    /// Set shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight, clamped to `1..=8`
    #[must_use]
    pub fn with_max_frames_in_flight(mut self, max_frames: usize) -> Self {
        self.max_frames_in_flight = max_frames.clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT);
        self
    }

    /// Set background clear color
    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable Vulkan validation layers
    #[must_use]
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Set the camera
    #[must_use]
    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Reject values that would leave the renderer in an unusable state
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid {
                field: "max_frames_in_flight",
                reason: format!(
                    "{} is outside 1..={MAX_FRAMES_IN_FLIGHT_LIMIT}",
                    self.max_frames_in_flight
                ),
            });
        }
        if self.shaders.vertex_shader_path.is_empty() {
            return Err(ConfigError::Invalid {
                field: "shaders.vertex_shader_path",
                reason: "path is empty".to_string(),
            });
        }
        if self.shaders.fragment_shader_path.is_empty() {
            return Err(ConfigError::Invalid {
                field: "shaders.fragment_shader_path",
                reason: "path is empty".to_string(),
            });
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(ConfigError::Invalid {
                field: "camera",
                reason: format!("near {} / far {} do not form a depth range", self.camera.near, self.camera.far),
            });
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Vulkan Frame Engine")
    }
}

impl Config for RendererConfig {}

/// Window settings for the presentation shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Test Window".to_string(),
            width: 800,
            height: 600,
        }
    }
}

impl Config for WindowConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2, "two frames in flight by default");
        assert_eq!(config.clear_color, [0.6, 0.65, 0.4, 1.0]);
        assert_eq!(config.shaders.vertex_shader_path, "Shaders/vert.spv");
        assert_eq!(config.shaders.fragment_shader_path, "Shaders/frag.spv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_is_clamped() {
        assert_eq!(RendererConfig::default().with_max_frames_in_flight(0).max_frames_in_flight, 1);
        assert_eq!(RendererConfig::default().with_max_frames_in_flight(64).max_frames_in_flight, 8);
        assert_eq!(RendererConfig::default().with_max_frames_in_flight(3).max_frames_in_flight, 3);
    }

    #[test]
    fn test_validate_rejects_zero_frames_from_file() {
        let config: RendererConfig = toml::from_str("max_frames_in_flight = 0").unwrap();
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field: "max_frames_in_flight", .. })),
            "zero frame slots can never make progress"
        );
    }

    #[test]
    fn test_validate_rejects_empty_shader_path() {
        let config = RendererConfig::default().with_shaders(ShaderConfig::new("", "frag.spv"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "partial"
            [camera]
            fov_degrees = 60.0
            "#,
        )
        .unwrap();
        assert_eq!(config.application_name, "partial");
        assert!((config.camera.fov_degrees - 60.0).abs() < f32::EPSILON);
        assert!((config.camera.far - 100.0).abs() < f32::EPSILON, "unspecified camera fields stay default");
        assert_eq!(config.max_frames_in_flight, 2);
    }

    #[test]
    fn test_explicit_validation_overrides_profile() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
    }
}
