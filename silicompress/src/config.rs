use std::fs;
use std::path::{Path, PathBuf};

use crate::image::{ImageFormat, DEFAULT_MAX_DIMENSIONS};
use crate::sample_size::ImageDimensions;
use crate::video::VideoDefaults;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Bounding box for compressed images
    pub max_dimensions: ImageDimensions,
    pub image_format: ImageFormat,
    pub video: VideoDefaults,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_dimensions: DEFAULT_MAX_DIMENSIONS,
            image_format: ImageFormat::default(),
            video: VideoDefaults::default(),
        }
    }
}

impl CompressorConfig {
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Option<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    pub fn save_to(&self, path: &Path) -> Option<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(path, json).ok())
    }

    pub fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("silicompress").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PngCompression;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");

        let config = CompressorConfig {
            max_dimensions: ImageDimensions::new(1024, 768),
            image_format: ImageFormat::Png {
                compression: PngCompression::Best,
            },
            video: VideoDefaults {
                width: 1280,
                height: 720,
                bitrate: 2_000_000,
            },
        };
        config.save_to(&path).unwrap();

        assert_eq!(CompressorConfig::load_from(&path), Some(config));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_dimensions":{"width":300,"height":400}}"#).unwrap();

        let config = CompressorConfig::load_from(&path).unwrap();
        assert_eq!(config.max_dimensions, ImageDimensions::new(300, 400));
        assert_eq!(config.image_format, ImageFormat::default());
        assert_eq!(config.video, VideoDefaults::default());
    }

    #[test]
    fn garbage_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert_eq!(CompressorConfig::load_from(&path), None);
    }
}
