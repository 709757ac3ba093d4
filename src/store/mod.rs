// Content-addressed blob store
//
// Layout under the files directory:
//   images/<hash[0:3]>/<hash[3:]>        original blobs
//   preview/<hash[0:3]>/<hash[3:]>.1     large preview
//   preview/<hash[0:3]>/<hash[3:]>.2     thumbnail
//   upload/                              private staging directories
//
// Blobs are write-once. Ingestion renames a fully written temp file into
// place, so a reader never sees a partial blob. The check-then-rename in
// `ingest` is not atomic on its own. Everything that adds or removes files
// under `images/` or publishes previews holds `lock_files` while doing so.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::{HASH_SHARD_LEN, IMAGES_FOLDER, PREVIEW_FOLDER, UPLOAD_FOLDER};
use crate::error::{GalleryError, Result};
use crate::hash::{short_hash, validate_hash};
use crate::preview::PreviewSize;

/// Result of ingesting one temp file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub path: PathBuf,
    /// False when a blob with this hash already existed and the temp file was discarded
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    images_dir: PathBuf,
    preview_dir: PathBuf,
    upload_dir: PathBuf,
    /// Shared by clones; see `lock_files`
    files_lock: Arc<Mutex<()>>,
}

impl ContentStore {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        let root = files_dir.into();
        Self {
            images_dir: root.join(IMAGES_FOLDER),
            preview_dir: root.join(PREVIEW_FOLDER),
            upload_dir: root.join(UPLOAD_FOLDER),
            root,
            files_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize blob ingestion, blob removal and preview publishing.
    pub fn lock_files(&self) -> Result<MutexGuard<'_, ()>> {
        self.files_lock
            .lock()
            .map_err(|_| GalleryError::Other("Content store lock poisoned".to_string()))
    }

    /// Create the store directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.images_dir)?;
        fs::create_dir_all(&self.preview_dir)?;
        fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn preview_dir(&self) -> &Path {
        &self.preview_dir
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Path of the blob for `hash`
    pub fn blob_path(&self, hash: &str) -> Result<PathBuf> {
        validate_hash(hash)?;
        let (shard, rest) = hash.split_at(HASH_SHARD_LEN);
        Ok(self.images_dir.join(shard).join(rest))
    }

    /// Path of one preview artifact for `hash`
    pub fn preview_path(&self, hash: &str, size: PreviewSize) -> Result<PathBuf> {
        validate_hash(hash)?;
        let (shard, rest) = hash.split_at(HASH_SHARD_LEN);
        Ok(self
            .preview_dir
            .join(shard)
            .join(format!("{}{}", rest, size.suffix())))
    }

    /// Blob plus both preview artifacts, in removal order
    pub fn orphan_paths(&self, hash: &str) -> Result<Vec<PathBuf>> {
        let mut paths = vec![self.blob_path(hash)?];
        for size in PreviewSize::ALL {
            paths.push(self.preview_path(hash, size)?);
        }
        Ok(paths)
    }

    /// Remove the blob and both previews of an unreferenced hash.
    /// Missing files are skipped. Returns how many files were removed.
    pub fn remove_blob_and_previews(&self, hash: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.orphan_paths(hash)? {
            if remove_file_if_exists(&path)? {
                removed += 1;
            }
        }
        log::debug!("Removed {} stored files for {}", removed, short_hash(hash));
        Ok(removed)
    }

    /// Move a fully written temp file into the store under `hash`.
    ///
    /// If the blob already exists the temp file is discarded and the existing
    /// path returned. The caller still owns the temp file when this fails.
    pub fn ingest(&self, temp_path: &Path, hash: &str) -> Result<IngestOutcome> {
        let dest = self.blob_path(hash)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if dest.try_exists()? {
            if let Err(e) = fs::remove_file(temp_path) {
                log::warn!("Could not discard temp file {}: {}", temp_path.display(), e);
            }
            log::debug!("Blob {} already stored", short_hash(hash));
            return Ok(IngestOutcome { path: dest, created: false });
        }

        fs::rename(temp_path, &dest)?;
        log::debug!("Stored blob {}", short_hash(hash));
        Ok(IngestOutcome { path: dest, created: true })
    }
}

/// Remove a file, treating "already gone" as success.
/// Returns whether a file was actually removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests;
