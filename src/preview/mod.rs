// Preview pipeline module
//
// Every blob gets two derived JPEGs:
// - Large: bounded to 1280px on the constrained axis
// - Thumbnail: bounded to 320px, used for album grids
//
// Artifacts are keyed by content hash, so one rendering serves every image
// row that shares the blob. Generation is lazy (first request) or eager
// (scheduled after an album mutation), and always goes through the
// coordinator so concurrent requests for one hash render once.

pub mod coordinator;
pub mod render;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::constants::{PREVIEW_LARGE_SUFFIX, PREVIEW_THUMB_SUFFIX};
use crate::error::GalleryError;

pub use coordinator::{CoordinatorStats, PreviewCoordinator, StatsSnapshot};
pub use render::{ImageRenderer, PreviewRenderer, RenderTarget};
pub use worker::PreviewWorker;

/// One of the two preview renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSize {
    Large,
    Thumbnail,
}

impl PreviewSize {
    /// Render and publish order.
    pub const ALL: [PreviewSize; 2] = [PreviewSize::Large, PreviewSize::Thumbnail];

    /// Filename suffix appended to the hash remainder
    pub fn suffix(self) -> &'static str {
        match self {
            PreviewSize::Large => PREVIEW_LARGE_SUFFIX,
            PreviewSize::Thumbnail => PREVIEW_THUMB_SUFFIX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PreviewSize::Large => "large",
            PreviewSize::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for PreviewSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviewSize {
    type Err = GalleryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "large" | "1" => Ok(PreviewSize::Large),
            "thumbnail" | "thumb" | "2" => Ok(PreviewSize::Thumbnail),
            other => Err(GalleryError::Validation(format!("Unknown preview size: {}", other))),
        }
    }
}
