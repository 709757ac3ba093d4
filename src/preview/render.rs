// Preview rendering
//
// Decodes a blob once, then writes each requested size as a JPEG. The
// resize bound applies to the width for landscape and square sources and to
// the height for portrait sources, judged on the stored pixel dimensions.
// EXIF orientation is applied after resizing.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::error::Result;
use crate::preview::PreviewSize;

/// One output of a render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub size: PreviewSize,
    /// Bound on the constrained axis, in pixels
    pub max_dimension: u32,
    /// Where the encoded JPEG is written (a staging path, not the final one)
    pub output: PathBuf,
}

/// Codec seam for preview generation.
pub trait PreviewRenderer: Send + Sync {
    /// Render every target from the image at `source`.
    fn render(&self, source: &Path, targets: &[RenderTarget]) -> Result<()>;
}

/// Renderer backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    quality: u8,
}

impl ImageRenderer {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl PreviewRenderer for ImageRenderer {
    fn render(&self, source: &Path, targets: &[RenderTarget]) -> Result<()> {
        let (img, orientation) = decode_with_orientation(source)?;
        let portrait = img.height() > img.width();

        for target in targets {
            let resized = if portrait {
                img.resize(u32::MAX, target.max_dimension, FilterType::Lanczos3)
            } else {
                img.resize(target.max_dimension, u32::MAX, FilterType::Lanczos3)
            };
            let mut oriented = resized;
            oriented.apply_orientation(orientation);

            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(oriented.to_rgb8());
            let mut writer = BufWriter::new(File::create(&target.output)?);
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            rgb.write_with_encoder(encoder)?;
            writer.flush()?;

            log::debug!(
                "Rendered {} preview {}x{} -> {}",
                target.size,
                rgb.width(),
                rgb.height(),
                target.output.display()
            );
        }

        Ok(())
    }
}

fn decode_with_orientation(path: &Path) -> Result<(DynamicImage, Orientation)> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    // Missing or unreadable EXIF is not fatal for a preview
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let img = DynamicImage::from_decoder(decoder)?;
    Ok((img, orientation))
}

/// Whether the image displays taller than wide, after EXIF orientation.
/// Only the header is read; pixels are not decoded.
pub fn detect_portrait(path: &Path) -> Result<bool> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let (width, height) = decoder.dimensions();
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let swaps_axes = matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    );
    Ok(if swaps_axes { width > height } else { height > width })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))
            .save(&path)
            .unwrap();
        path
    }

    fn decode(path: &Path) -> DynamicImage {
        ImageReader::open(path).unwrap().with_guessed_format().unwrap().decode().unwrap()
    }

    fn targets(dir: &Path, large: u32, thumb: u32) -> Vec<RenderTarget> {
        vec![
            RenderTarget { size: PreviewSize::Large, max_dimension: large, output: dir.join("out.1") },
            RenderTarget { size: PreviewSize::Thumbnail, max_dimension: thumb, output: dir.join("out.2") },
        ]
    }

    #[test]
    fn test_landscape_is_width_constrained() {
        let tmp = TempDir::new().unwrap();
        let source = write_png(tmp.path(), "wide.png", 400, 200);
        let targets = targets(tmp.path(), 100, 40);

        ImageRenderer::new(75).render(&source, &targets).unwrap();

        let large = decode(&targets[0].output);
        assert_eq!((large.width(), large.height()), (100, 50));
        let thumb = decode(&targets[1].output);
        assert_eq!((thumb.width(), thumb.height()), (40, 20));
    }

    #[test]
    fn test_portrait_is_height_constrained() {
        let tmp = TempDir::new().unwrap();
        let source = write_png(tmp.path(), "tall.png", 200, 400);
        let targets = targets(tmp.path(), 100, 40);

        ImageRenderer::new(75).render(&source, &targets).unwrap();

        let large = decode(&targets[0].output);
        assert_eq!((large.width(), large.height()), (50, 100));
    }

    #[test]
    fn test_undecodable_source_fails() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("garbage");
        std::fs::write(&source, b"not an image at all").unwrap();

        assert!(ImageRenderer::new(75).render(&source, &targets(tmp.path(), 100, 40)).is_err());
        assert!(detect_portrait(&source).is_err());
    }

    #[test]
    fn test_detect_portrait_from_dimensions() {
        let tmp = TempDir::new().unwrap();
        assert!(detect_portrait(&write_png(tmp.path(), "tall.png", 10, 20)).unwrap());
        assert!(!detect_portrait(&write_png(tmp.path(), "wide.png", 20, 10)).unwrap());
        assert!(!detect_portrait(&write_png(tmp.path(), "square.png", 10, 10)).unwrap());
    }
}
