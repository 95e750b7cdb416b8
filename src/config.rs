// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.
//
// The parsed file is turned into one immutable `RenderSettings` value at
// startup. Device selection, swapchain and pipeline creation all read from
// that value instead of scattering formats and counts across call sites.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::CStr;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 640 * 2,
            height: 480 * 2,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub min_image_count: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            min_image_count: MIN_SWAPCHAIN_IMAGES,
        }
    }
}

/// Precompiled SPIR-V locations, relative to the working directory
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "triangle.log".to_string(),
        }
    }
}

const CONFIG_FILE: &str = "config.toml";

/// Where the active configuration came from
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file, defaults in use
    Missing(PathBuf),
    /// The file exists but could not be read or parsed, defaults in use
    Invalid(anyhow::Error),
}

impl ConfigSource {
    /// Log how the configuration was obtained, once a logger exists
    pub fn report(&self, config: &Config) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Invalid(e) => log::warn!("{:#}. Using defaults.", e),
        }
        log::debug!("Config: {:?}", config);
    }
}

/// Double buffering is the floor; the driver may hand back more.
const MIN_SWAPCHAIN_IMAGES: u32 = 2;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything the Vulkan setup chain needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub app_name: String,
    pub extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub min_image_count: u32,
    pub clear_color: [f32; 4],
    pub enable_validation: bool,
    pub validation_layers: Vec<&'static CStr>,
    pub device_extensions: Vec<&'static CStr>,
}

impl Config {
    /// Load configuration from config.toml, falling back to defaults.
    ///
    /// Logging is not up yet when this runs, so how the config was obtained
    /// comes back as a `ConfigSource` to be reported later.
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default(CONFIG_FILE)
    }

    /// Like `load`, for an arbitrary path
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigSource::Missing(path.to_path_buf()));
        }

        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Resolve the file into the immutable value the setup chain consumes.
    ///
    /// Validation is only ever requested in debug builds.
    pub fn render_settings(&self) -> RenderSettings {
        let enable_validation = cfg!(debug_assertions) && self.debug.validation_layers;

        RenderSettings {
            app_name: self.window.title.clone(),
            extent: vk::Extent2D {
                width: self.window.width,
                height: self.window.height,
            },
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: self.present_mode(),
            min_image_count: self.graphics.min_image_count.max(MIN_SWAPCHAIN_IMAGES),
            clear_color: self.graphics.clear_color,
            enable_validation,
            validation_layers: if enable_validation {
                vec![VALIDATION_LAYER]
            } else {
                Vec::new()
            },
            device_extensions: vec![ash::extensions::khr::Swapchain::name()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 960);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/triangle.vert.spv"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 800

            [graphics]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 960);
        assert_eq!(config.window.title, "Vulkan");
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.graphics.present_mode, "fifo");
    }

    #[test]
    fn present_mode_names_are_case_insensitive() {
        let mut config = Config::default();

        config.graphics.present_mode = "Mailbox".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);

        config.graphics.present_mode = "FIFO_RELAXED".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO_RELAXED);

        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let result: std::result::Result<Config, _> = toml::from_str("[window]\nwidth = \"wide\"");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let (config, source) = Config::load_or_default("definitely/not/here/config.toml");

        assert_eq!(config.window.title, "Vulkan");
        assert!(matches!(source, ConfigSource::Missing(_)));
        assert!(Config::load_from_path("definitely/not/here/config.toml").is_err());
    }

    #[test]
    fn broken_file_falls_back_to_defaults_and_keeps_the_error() {
        let path = std::env::temp_dir().join(format!("triangle-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = \"wide\"\n").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1280);
        match source {
            ConfigSource::Invalid(e) => assert!(format!("{:#}", e).contains("Failed to parse")),
            other => panic!("expected an invalid config, got {:?}", other),
        }
    }

    #[test]
    fn readable_file_is_used() {
        let path = std::env::temp_dir().join(format!("triangle-config-ok-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\ntitle = \"Triangle\"\n").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.title, "Triangle");
        assert!(matches!(source, ConfigSource::File(_)));
    }

    #[test]
    fn render_settings_never_request_fewer_than_two_images() {
        let mut config = Config::default();
        config.graphics.min_image_count = 1;

        let settings = config.render_settings();
        assert_eq!(settings.min_image_count, 2);
    }

    #[test]
    fn render_settings_carry_window_and_swapchain_choices() {
        let mut config = Config::default();
        config.window.width = 320;
        config.window.height = 240;
        config.graphics.min_image_count = 3;

        let settings = config.render_settings();

        assert_eq!(settings.extent, vk::Extent2D { width: 320, height: 240 });
        assert_eq!(settings.min_image_count, 3);
        assert_eq!(settings.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(settings.device_extensions, vec![ash::extensions::khr::Swapchain::name()]);
    }

    #[test]
    fn validation_layers_follow_the_toggle() {
        let mut config = Config::default();
        config.debug.validation_layers = false;
        let settings = config.render_settings();
        assert!(!settings.enable_validation);
        assert!(settings.validation_layers.is_empty());

        config.debug.validation_layers = true;
        let settings = config.render_settings();
        assert_eq!(settings.enable_validation, cfg!(debug_assertions));
        assert_eq!(settings.validation_layers.len(), usize::from(settings.enable_validation));
    }
}
