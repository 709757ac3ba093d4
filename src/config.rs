// Runtime configuration
//
// Defaults come from constants.rs. A library may carry a config.json in its
// files directory; every field is optional there.

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::constants::{
    PREVIEW_JPEG_QUALITY, PREVIEW_LARGE_SIZE, PREVIEW_QUEUE_LIMIT, PREVIEW_THUMB_SIZE,
};
use crate::error::{GalleryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GalleryConfig {
    /// Concurrent preview jobs (defaults to the CPU count)
    pub preview_workers: usize,
    /// Queued preview jobs above which inbound requests stop being read
    pub preview_queue_limit: usize,
    /// Bounding size of the large preview, in pixels
    pub large_size: u32,
    /// Bounding size of the thumbnail, in pixels
    pub thumb_size: u32,
    pub jpeg_quality: u8,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            preview_workers: default_workers(),
            preview_queue_limit: PREVIEW_QUEUE_LIMIT,
            large_size: PREVIEW_LARGE_SIZE,
            thumb_size: PREVIEW_THUMB_SIZE,
            jpeg_quality: PREVIEW_JPEG_QUALITY,
        }
    }
}

impl GalleryConfig {
    /// Load config from a JSON file, falling back to defaults when it is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.try_exists()? {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: GalleryConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.preview_workers == 0 {
            return Err(GalleryError::Validation("previewWorkers must be at least 1".to_string()));
        }
        if self.large_size == 0 || self.thumb_size == 0 {
            return Err(GalleryError::Validation("preview sizes must be positive".to_string()));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(GalleryError::Validation("jpegQuality must be in 1..=100".to_string()));
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = GalleryConfig::load(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config, GalleryConfig::default());
        assert_eq!(config.preview_queue_limit, 4096);
        assert!(config.preview_workers >= 1);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"previewWorkers": 3, "thumbSize": 200}"#).unwrap();

        let config = GalleryConfig::load(&path).unwrap();
        assert_eq!(config.preview_workers, 3);
        assert_eq!(config.thumb_size, 200);
        assert_eq!(config.large_size, 1280);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"previewWorkers": 0}"#).unwrap();

        assert!(matches!(GalleryConfig::load(&path), Err(GalleryError::Validation(_))));
    }
}
