// Preview worker
//
// Runs one job end to end for a content hash. Both sizes are rendered into
// temp files in the upload directory, then renamed into the preview shard
// large first. A job never leaves a single artifact behind: if the second
// rename fails the first is removed again. Publishing holds the content
// store's file lock and is skipped when the blob was removed while
// rendering, so no preview outlives its blob.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::{Builder, TempPath};

use crate::config::GalleryConfig;
use crate::constants::TEMP_FILE_PREFIX;
use crate::error::{GalleryError, Result};
use crate::hash::short_hash;
use crate::preview::render::{PreviewRenderer, RenderTarget};
use crate::preview::PreviewSize;
use crate::store::{remove_file_if_exists, ContentStore};

pub struct PreviewWorker {
    store: Arc<ContentStore>,
    renderer: Arc<dyn PreviewRenderer>,
    large_size: u32,
    thumb_size: u32,
}

impl PreviewWorker {
    pub fn new(
        store: Arc<ContentStore>,
        renderer: Arc<dyn PreviewRenderer>,
        config: &GalleryConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            large_size: config.large_size,
            thumb_size: config.thumb_size,
        }
    }

    fn bound(&self, size: PreviewSize) -> u32 {
        match size {
            PreviewSize::Large => self.large_size,
            PreviewSize::Thumbnail => self.thumb_size,
        }
    }

    /// Whether both artifacts for `hash` are already published
    pub fn artifacts_exist(&self, hash: &str) -> Result<bool> {
        for size in PreviewSize::ALL {
            if !self.store.preview_path(hash, size)?.try_exists()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Generate both previews for `hash` unless they already exist.
    pub fn run(&self, hash: &str) -> Result<()> {
        if self.artifacts_exist(hash)? {
            log::debug!("Previews for {} already exist", short_hash(hash));
            return Ok(());
        }

        let source = self.store.blob_path(hash)?;
        if !source.try_exists()? {
            return Err(GalleryError::Other(format!(
                "Blob {} is missing from the store",
                short_hash(hash)
            )));
        }

        // Stage outputs; TempPath removes them on drop unless persisted
        let mut staged: Vec<(TempPath, PathBuf)> = Vec::with_capacity(PreviewSize::ALL.len());
        let mut targets = Vec::with_capacity(PreviewSize::ALL.len());
        for size in PreviewSize::ALL {
            let temp = Builder::new()
                .prefix(TEMP_FILE_PREFIX)
                .tempfile_in(self.store.upload_dir())?
                .into_temp_path();
            targets.push(RenderTarget {
                size,
                max_dimension: self.bound(size),
                output: temp.to_path_buf(),
            });
            staged.push((temp, self.store.preview_path(hash, size)?));
        }

        self.renderer.render(&source, &targets)?;

        let _guard = self.store.lock_files()?;
        if !source.try_exists()? {
            // Staged outputs are removed when `staged` drops
            return Err(GalleryError::Other(format!(
                "Blob {} was removed while its previews were rendering",
                short_hash(hash)
            )));
        }

        if let Some((_, dest)) = staged.first() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut published: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (temp, dest) in staged {
            if let Err(e) = temp.persist(&dest) {
                for path in &published {
                    if let Err(cleanup) = remove_file_if_exists(path) {
                        log::warn!("Could not remove partial preview {}: {}", path.display(), cleanup);
                    }
                }
                return Err(GalleryError::Io(e.error));
            }
            published.push(dest);
        }

        log::info!("Generated previews for {}", short_hash(hash));
        Ok(())
    }
}
