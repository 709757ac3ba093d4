// Upload staging
//
// Received files are streamed into a private temp directory under the
// store's upload folder, hashed on the way. Each staged file carries what
// the album transaction needs: hash, original filename, orientation and
// capture time. Whatever is not ingested is removed with the directory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::{Builder, TempDir};

use crate::constants::TEMP_FILE_PREFIX;
use crate::error::{ItemError, Result};
use crate::hash::{short_hash, write_file_with_hash};
use crate::preview::render::detect_portrait;
use crate::store::ContentStore;

/// A fully received upload, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub temp_path: PathBuf,
    pub sha256: String,
    /// Filename as sent by the client
    pub file_name: String,
    pub title: String,
    /// Capture time, or the upload time when unknown
    pub created: DateTime<Utc>,
    pub is_portrait: bool,
    /// Explicitly chosen as the album cover
    pub is_cover: bool,
}

pub struct UploadBatch {
    dir: TempDir,
    files: Vec<UploadedFile>,
    errors: Vec<ItemError>,
    received: usize,
}

impl UploadBatch {
    /// Create a batch with its own temp directory in the store's upload folder.
    pub fn new(store: &ContentStore) -> Result<Self> {
        std::fs::create_dir_all(store.upload_dir())?;
        let dir = Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempdir_in(store.upload_dir())?;
        Ok(Self {
            dir,
            files: Vec::new(),
            errors: Vec::new(),
            received: 0,
        })
    }

    /// Stage one upload. Returns its index in `files()`, or `None` when the
    /// file was rejected (the reason is recorded in `errors()`).
    pub fn add<R: Read>(
        &mut self,
        reader: &mut R,
        file_name: &str,
        captured_at: Option<DateTime<Utc>>,
    ) -> Option<usize> {
        self.received += 1;
        let temp_path = self.dir.path().join(self.received.to_string());

        let sha256 = match write_file_with_hash(&temp_path, reader) {
            Ok((bytes, sha256)) => {
                log::debug!("Received {} ({} bytes, {})", file_name, bytes, short_hash(&sha256));
                sha256
            }
            Err(e) => {
                log::warn!("Could not store upload {}: {}", file_name, e);
                self.errors.push(ItemError::new(file_name, "Could not store upload"));
                discard(&temp_path);
                return None;
            }
        };

        let is_portrait = match detect_portrait(&temp_path) {
            Ok(portrait) => portrait,
            Err(e) => {
                log::warn!("Could not read image size of {}: {}", file_name, e);
                self.errors.push(ItemError::new(file_name, "Could not determine image size"));
                discard(&temp_path);
                return None;
            }
        };

        let created = match captured_at {
            Some(t) => t,
            None => {
                self.errors.push(ItemError::new(
                    file_name,
                    "Could not determine image time, current time assumed",
                ));
                Utc::now()
            }
        };

        self.files.push(UploadedFile {
            temp_path,
            sha256,
            file_name: file_name.to_string(),
            title: String::new(),
            created,
            is_portrait,
            is_cover: false,
        });
        Some(self.files.len() - 1)
    }

    /// Stage a file from disk, using its modification time as capture time.
    pub fn add_path(&mut self, path: &Path) -> Option<usize> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Could not open {}: {}", path.display(), e);
                self.received += 1;
                self.errors.push(ItemError::new(file_name, "Could not read file"));
                return None;
            }
        };
        let captured_at = file
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        self.add(&mut file, &file_name, captured_at)
    }

    pub fn set_title(&mut self, index: usize, title: impl Into<String>) -> bool {
        match self.files.get_mut(index) {
            Some(file) => {
                file.title = title.into();
                true
            }
            None => false,
        }
    }

    /// Mark one staged file as the album cover
    pub fn set_cover(&mut self, index: usize) -> bool {
        if index >= self.files.len() {
            return false;
        }
        for (i, file) in self.files.iter_mut().enumerate() {
            file.is_cover = i == index;
        }
        true
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// Problems recorded while staging (rejections and warnings)
    pub fn errors(&self) -> &[ItemError] {
        &self.errors
    }

    /// Number of uploads offered, including rejected ones
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Split into staged files and errors. The returned `TempDir` removes any
    /// file that was not ingested when dropped.
    pub fn into_parts(self) -> (Vec<UploadedFile>, Vec<ItemError>, TempDir) {
        (self.files, self.errors, self.dir)
    }
}

fn discard(path: &Path) {
    if let Err(e) = crate::store::remove_file_if_exists(path) {
        log::warn!("Could not remove rejected upload {}: {}", path.display(), e);
    }
}
