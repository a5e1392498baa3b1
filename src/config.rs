// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section has defaults, so a missing file, a missing section or a
// missing key all fall back to the values the sample starts with.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub sample: SampleConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "API without Secrets: Introduction to Vulkan".to_string(),
            width: 1000,
            height: 800,
            fullscreen: false,
        }
    }
}

/// Swapchain and frame pool settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub swapchain_image_count: u32,
    /// Number of frame resource sets allocated; the slider picks how many are used
    pub frame_resources_pool_size: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            swapchain_image_count: 3,
            frame_resources_pool_size: 5,
        }
    }
}

/// Initial values of the sample's sliders
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub objects_count: u32,
    pub frame_resources_count: usize,
    pub pre_submit_cpu_work_ms: u32,
    pub post_submit_cpu_work_ms: u32,
    pub max_objects: u32,
    /// Fixed seed for object placement; random when absent
    pub seed: Option<u64>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            objects_count: 100,
            frame_resources_count: 1,
            pre_submit_cpu_work_ms: 0,
            post_submit_cpu_work_ms: 0,
            max_objects: 1000,
            seed: None,
        }
    }
}

/// Where textures and compiled shaders are read from
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub data_dir: PathBuf,
    pub shader_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            shader_dir: PathBuf::from("shaders"),
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
            log_file: "vulkan_debug.log".to_string(),
        }
    }
}

/// Slider limits shared by config clamping and the GUI
pub const MIN_OBJECTS: u32 = 10;
pub const OBJECTS_STEP: u32 = 50;
pub const MAX_CPU_WORK_MS: u32 = 20;
/// Upper bound for `max_objects`
pub const MAX_OBJECTS_LIMIT: u32 = 100_000;
/// Guaranteed minimum of maxImageDimension2D
pub const MAX_WINDOW_DIMENSION: u32 = 4096;

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> Self {
        let (config, error) = Self::load_or_default("config.toml");
        if let Some(e) = error {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
        }
        config
    }

    /// Defaults plus the reason when the file at `path` cannot be used
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse TOML text and clamp sample values into their slider ranges
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        let window = &mut self.window;
        window.width = window.width.clamp(1, MAX_WINDOW_DIMENSION);
        window.height = window.height.clamp(1, MAX_WINDOW_DIMENSION);

        let graphics = &mut self.graphics;
        graphics.frame_resources_pool_size = graphics.frame_resources_pool_size.max(1);
        graphics.swapchain_image_count = graphics.swapchain_image_count.max(1);

        let sample = &mut self.sample;
        sample.max_objects = sample.max_objects.clamp(MIN_OBJECTS, MAX_OBJECTS_LIMIT);
        sample.objects_count = sample.objects_count.clamp(MIN_OBJECTS, sample.max_objects);
        sample.frame_resources_count = sample
            .frame_resources_count
            .clamp(1, graphics.frame_resources_pool_size);
        sample.pre_submit_cpu_work_ms = sample.pre_submit_cpu_work_ms.min(MAX_CPU_WORK_MS);
        sample.post_submit_cpu_work_ms = sample.post_submit_cpu_work_ms.min(MAX_CPU_WORK_MS);
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
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1000);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.graphics.frame_resources_pool_size, 5);
        assert_eq!(config.sample.objects_count, 100);
        assert_eq!(config.sample.frame_resources_count, 1);
        assert_eq!(config.sample.max_objects, 1000);
        assert_eq!(config.assets.data_dir, PathBuf::from("Data"));
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [sample]
            objects_count = 500
            seed = 7

            [graphics]
            present_mode = "FIFO"
            "#,
        )
        .unwrap();
        assert_eq!(config.sample.objects_count, 500);
        assert_eq!(config.sample.seed, Some(7));
        assert_eq!(config.sample.max_objects, 1000);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.swapchain_image_count, 3);
    }

    #[test]
    fn sample_values_are_clamped() {
        let config = Config::parse(
            r#"
            [graphics]
            frame_resources_pool_size = 3

            [sample]
            objects_count = 5000
            max_objects = 2000
            frame_resources_count = 8
            pre_submit_cpu_work_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.sample.objects_count, 2000);
        assert_eq!(config.sample.frame_resources_count, 3);
        assert_eq!(config.sample.pre_submit_cpu_work_ms, MAX_CPU_WORK_MS);
    }

    #[test]
    fn zero_counts_are_raised() {
        let config = Config::parse(
            r#"
            [graphics]
            frame_resources_pool_size = 0

            [sample]
            objects_count = 0
            frame_resources_count = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.graphics.frame_resources_pool_size, 1);
        assert_eq!(config.sample.frame_resources_count, 1);
        assert_eq!(config.sample.objects_count, MIN_OBJECTS);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-please\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::parse("[sample\nobjects_count = ").is_err());
    }

    #[test]
    fn huge_limits_and_zero_window_are_bounded() {
        let config = Config::parse(
            r#"
            [window]
            width = 0
            height = 100000

            [sample]
            max_objects = 4000000000
            objects_count = 4000000000
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 1);
        assert_eq!(config.window.height, MAX_WINDOW_DIMENSION);
        assert_eq!(config.sample.max_objects, MAX_OBJECTS_LIMIT);
        assert_eq!(config.sample.objects_count, MAX_OBJECTS_LIMIT);
    }

    #[test]
    fn malformed_file_gives_defaults_and_reports_error() {
        let path = std::env::temp_dir().join(format!("frame-resources-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[sample\nobjects_count = ").unwrap();

        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        let error = error.expect("malformed config should report an error");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
        assert_eq!(config.sample.objects_count, 100);
        assert_eq!(config.window.width, 1000);
    }

    #[test]
    fn missing_file_reports_no_error() {
        let (config, error) = Config::load_or_default("does/not/exist.toml");
        assert!(error.is_none());
        assert_eq!(config.graphics.frame_resources_pool_size, 5);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.window.title, "API without Secrets: Introduction to Vulkan");
    }
}
