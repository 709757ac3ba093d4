// Gallery facade
//
// What request handlers call. Catalog work runs on the blocking pool; preview
// work goes through the coordinator. After a successful add or edit the
// returned jobs are scheduled in the background so previews are usually
// ready before the first read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};

use crate::album::{AddAlbumOutcome, AlbumEdit, AlbumStore, EditAlbumOutcome, PreviewJob};
use crate::config::GalleryConfig;
use crate::constants::CONFIG_FILENAME;
use crate::db::get_files_dir;
use crate::error::{PreviewError, Result};
use crate::hash::short_hash;
use crate::preview::{
    ImageRenderer, PreviewCoordinator, PreviewRenderer, PreviewSize, PreviewWorker, StatsSnapshot,
};
use crate::upload::UploadBatch;

/// Counts from a warm-up pass over the whole catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub total: usize,
    pub ready: usize,
    pub failed: usize,
}

pub struct Gallery {
    albums: Arc<AlbumStore>,
    coordinator: PreviewCoordinator,
}

impl Gallery {
    /// Config for the library at `db_path`: `config.json` in its files
    /// directory, or defaults.
    pub fn load_config(db_path: &Path) -> Result<GalleryConfig> {
        GalleryConfig::load(&get_files_dir(db_path).join(CONFIG_FILENAME))
    }

    /// Open a library and start its preview coordinator.
    /// Must be called inside a tokio runtime.
    pub fn open(db_path: &Path, config: &GalleryConfig) -> Result<Self> {
        config.validate()?;
        let albums = Arc::new(AlbumStore::open(db_path)?);
        let renderer = Arc::new(ImageRenderer::new(config.jpeg_quality));
        Ok(Self::with_renderer(albums, renderer, config))
    }

    pub fn with_renderer(
        albums: Arc<AlbumStore>,
        renderer: Arc<dyn PreviewRenderer>,
        config: &GalleryConfig,
    ) -> Self {
        let worker = Arc::new(PreviewWorker::new(Arc::clone(albums.store()), renderer, config));
        let coordinator = PreviewCoordinator::spawn(worker, config);
        Self { albums, coordinator }
    }

    pub fn albums(&self) -> &Arc<AlbumStore> {
        &self.albums
    }

    /// Start staging uploads for an add or edit.
    pub fn new_upload_batch(&self) -> Result<UploadBatch> {
        UploadBatch::new(self.albums.store())
    }

    pub async fn add_album(
        &self,
        owner_id: i64,
        name: String,
        uploads: UploadBatch,
    ) -> Result<AddAlbumOutcome> {
        let (outcome, _previews) = self.add_album_with_previews(owner_id, name, uploads).await?;
        Ok(outcome)
    }

    /// Like `add_album`, also returning the background preview task so the
    /// caller can wait for it.
    pub async fn add_album_with_previews(
        &self,
        owner_id: i64,
        name: String,
        uploads: UploadBatch,
    ) -> Result<(AddAlbumOutcome, JoinHandle<()>)> {
        let albums = Arc::clone(&self.albums);
        let outcome =
            tokio::task::spawn_blocking(move || albums.add_album(owner_id, &name, uploads)).await??;
        let previews = self.schedule_previews(outcome.jobs.clone());
        Ok((outcome, previews))
    }

    pub async fn edit_album(
        &self,
        owner_id: i64,
        album_id: i64,
        edit: AlbumEdit,
        uploads: Option<UploadBatch>,
    ) -> Result<EditAlbumOutcome> {
        let (outcome, _previews) =
            self.edit_album_with_previews(owner_id, album_id, edit, uploads).await?;
        Ok(outcome)
    }

    pub async fn edit_album_with_previews(
        &self,
        owner_id: i64,
        album_id: i64,
        edit: AlbumEdit,
        uploads: Option<UploadBatch>,
    ) -> Result<(EditAlbumOutcome, JoinHandle<()>)> {
        let albums = Arc::clone(&self.albums);
        let outcome = tokio::task::spawn_blocking(move || {
            albums.edit_album(owner_id, album_id, edit, uploads)
        })
        .await??;
        let previews = self.schedule_previews(outcome.jobs.clone());
        Ok((outcome, previews))
    }

    /// Generate previews for `jobs` in the background, one at a time.
    pub fn schedule_previews(&self, jobs: Vec<PreviewJob>) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            for job in jobs {
                match coordinator.request(&job.sha256).await {
                    Ok(()) => {}
                    Err(PreviewError::ShuttingDown) => {
                        log::debug!("Preview preparation stopped by shutdown");
                        break;
                    }
                    Err(e) => log::warn!("Preview for image {} failed: {}", job.image_id, e),
                }
            }
        })
    }

    /// Path of a preview of `image_id`, generating it first if missing.
    pub async fn request_preview(&self, image_id: i64, size: PreviewSize) -> Result<PathBuf> {
        let hash = self.image_hash(image_id).await?;
        let path = self.albums.store().preview_path(&hash, size)?;
        if !path.try_exists()? {
            log::debug!("Preview {} of {} missing, requesting", size, short_hash(&hash));
            self.coordinator.request(&hash).await?;
        }
        Ok(path)
    }

    /// Path of the original upload of `image_id`.
    pub async fn original_path(&self, image_id: i64) -> Result<PathBuf> {
        let hash = self.image_hash(image_id).await?;
        self.albums.store().blob_path(&hash)
    }

    /// Request previews for every blob in the catalog concurrently.
    pub async fn warm_previews(&self) -> Result<WarmReport> {
        let albums = Arc::clone(&self.albums);
        let hashes = tokio::task::spawn_blocking(move || albums.distinct_hashes()).await??;

        let mut report = WarmReport { total: hashes.len(), ..WarmReport::default() };
        let mut requests = JoinSet::new();
        for hash in hashes {
            let coordinator = self.coordinator.clone();
            requests.spawn(async move { coordinator.request(&hash).await });
        }
        while let Some(joined) = requests.join_next().await {
            match joined? {
                Ok(()) => report.ready += 1,
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Warmed previews: {} of {} ready, {} failed",
            report.ready,
            report.total,
            report.failed
        );
        Ok(report)
    }

    pub fn preview_stats(&self) -> StatsSnapshot {
        self.coordinator.stats()
    }

    /// Stop the preview coordinator. Running jobs finish first.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }

    async fn image_hash(&self, image_id: i64) -> Result<String> {
        let albums = Arc::clone(&self.albums);
        let hash = tokio::task::spawn_blocking(move || albums.image_hash(image_id)).await??;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleryError;
    use image::{DynamicImage, ImageReader, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn small_config() -> GalleryConfig {
        GalleryConfig {
            preview_workers: 2,
            large_size: 32,
            thumb_size: 8,
            ..GalleryConfig::default()
        }
    }

    fn png(seed: u8, width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, Rgb([seed, seed, 0]))
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn decode(path: &Path) -> DynamicImage {
        ImageReader::open(path).unwrap().with_guessed_format().unwrap().decode().unwrap()
    }

    async fn gallery_with_album(tmp: &TempDir) -> (Gallery, AddAlbumOutcome) {
        let gallery = Gallery::open(&tmp.path().join("gallery.db"), &small_config()).unwrap();
        let mut uploads = gallery.new_upload_batch().unwrap();
        uploads.add(&mut Cursor::new(png(1, 64, 48)), "wide.png", None);
        uploads.add(&mut Cursor::new(png(2, 48, 64)), "tall.png", None);
        let outcome = gallery.add_album(1, "Holiday".to_string(), uploads).await.unwrap();
        (gallery, outcome)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_preview_renders_both_sizes() {
        let tmp = TempDir::new().unwrap();
        let (gallery, outcome) = gallery_with_album(&tmp).await;
        let wide = outcome.jobs[0].image_id;
        let tall = outcome.jobs[1].image_id;

        let large = gallery.request_preview(wide, PreviewSize::Large).await.unwrap();
        let thumb = gallery.request_preview(wide, PreviewSize::Thumbnail).await.unwrap();
        assert_eq!(decode(&large).width(), 32);
        assert_eq!(decode(&thumb).width(), 8);

        let tall_thumb = gallery.request_preview(tall, PreviewSize::Thumbnail).await.unwrap();
        assert_eq!(decode(&tall_thumb).height(), 8);

        gallery.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_album_previews_ready_after_join() {
        let tmp = TempDir::new().unwrap();
        let gallery = Gallery::open(&tmp.path().join("gallery.db"), &small_config()).unwrap();
        let mut uploads = gallery.new_upload_batch().unwrap();
        uploads.add(&mut Cursor::new(png(5, 40, 30)), "one.png", None);
        uploads.add(&mut Cursor::new(png(6, 30, 40)), "two.png", None);

        let (outcome, previews) =
            gallery.add_album_with_previews(1, "Waited".to_string(), uploads).await.unwrap();
        previews.await.unwrap();

        for job in &outcome.jobs {
            for size in PreviewSize::ALL {
                assert!(gallery.albums().store().preview_path(&job.sha256, size).unwrap().exists());
            }
        }
        assert_eq!(gallery.preview_stats().completed, 2);
        gallery.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_image() {
        let tmp = TempDir::new().unwrap();
        let (gallery, _) = gallery_with_album(&tmp).await;

        assert!(matches!(
            gallery.request_preview(999, PreviewSize::Large).await,
            Err(GalleryError::ImageNotFound(999))
        ));
        assert!(matches!(gallery.original_path(999).await, Err(GalleryError::ImageNotFound(999))));
        gallery.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_original_path_points_at_blob() {
        let tmp = TempDir::new().unwrap();
        let (gallery, outcome) = gallery_with_album(&tmp).await;

        let path = gallery.original_path(outcome.jobs[0].image_id).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), png(1, 64, 48));
        gallery.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_warm_previews_covers_catalog() {
        let tmp = TempDir::new().unwrap();
        let (gallery, outcome) = gallery_with_album(&tmp).await;

        let report = gallery.warm_previews().await.unwrap();
        assert_eq!(report, WarmReport { total: 2, ready: 2, failed: 0 });
        for job in &outcome.jobs {
            for size in PreviewSize::ALL {
                assert!(gallery.albums().store().preview_path(&job.sha256, size).unwrap().exists());
            }
        }
        gallery.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_edit_through_gallery() {
        let tmp = TempDir::new().unwrap();
        let (gallery, outcome) = gallery_with_album(&tmp).await;

        let mut uploads = gallery.new_upload_batch().unwrap();
        uploads.add(&mut Cursor::new(png(3, 20, 20)), "square.png", None);
        let edit = AlbumEdit {
            deleted: vec![outcome.jobs[0].image_id],
            ..AlbumEdit::default()
        };
        let edited = gallery.edit_album(1, outcome.album_id, edit, Some(uploads)).await.unwrap();

        assert_eq!(edited.deleted_count, 1);
        assert_eq!(edited.jobs.len(), 1);
        let path = gallery.request_preview(edited.jobs[0].image_id, PreviewSize::Large).await.unwrap();
        assert!(path.exists());
        gallery.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_requests_after_shutdown_fail() {
        let tmp = TempDir::new().unwrap();
        let gallery = Gallery::open(&tmp.path().join("gallery.db"), &small_config()).unwrap();
        gallery.shutdown().await;

        // Catalog mutations still work; only preview generation stops
        let mut uploads = gallery.new_upload_batch().unwrap();
        uploads.add(&mut Cursor::new(png(4, 10, 10)), "late.png", None);
        let outcome = gallery.add_album(1, "Late".to_string(), uploads).await.unwrap();

        let result = gallery.request_preview(outcome.jobs[0].image_id, PreviewSize::Thumbnail).await;
        assert!(matches!(result, Err(GalleryError::Preview(PreviewError::ShuttingDown))));
    }

    #[test]
    fn test_config_file_next_to_catalog() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("gallery.db");
        let files_dir = get_files_dir(&db_path);
        std::fs::create_dir_all(&files_dir).unwrap();
        std::fs::write(files_dir.join(CONFIG_FILENAME), r#"{"jpegQuality": 90}"#).unwrap();

        assert_eq!(Gallery::load_config(&db_path).unwrap().jpeg_quality, 90);
    }
}
