// Album store
//
// Owns the catalog connection and the content store. Every mutation
// (add, edit) runs under the content store's file lock, which covers blob
// ingestion, the database transaction and orphan removal; see transaction.rs.

mod cleanup;
mod transaction;


use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, schema};
use crate::error::{GalleryError, ItemError, Result};
use crate::store::ContentStore;

pub use schema::{Album, Image};

/// Preview work produced by a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewJob {
    pub image_id: i64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAlbumOutcome {
    pub album_id: i64,
    /// Images inserted
    pub added: usize,
    /// One job per distinct content hash
    pub jobs: Vec<PreviewJob>,
    pub errors: Vec<ItemError>,
}

/// Changes to apply to an existing album.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlbumEdit {
    /// New name; `None` keeps the current one
    pub name: Option<String>,
    /// Image ids to delete
    pub deleted: Vec<i64>,
    /// Image id (as sent by the client) to new title
    pub titles: HashMap<String, String>,
}

impl AlbumEdit {
    fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.titles.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAlbumOutcome {
    /// The album lost its last image and was removed
    pub deleted: bool,
    pub deleted_count: usize,
    pub title_edit_count: usize,
    pub added: usize,
    pub jobs: Vec<PreviewJob>,
    pub errors: Vec<ItemError>,
}

pub struct AlbumStore {
    conn: Mutex<Connection>,
    store: Arc<ContentStore>,
}

impl AlbumStore {
    pub fn new(conn: Connection, store: Arc<ContentStore>) -> Self {
        Self {
            conn: Mutex::new(conn),
            store,
        }
    }

    /// Open the catalog at `db_path` and the files directory next to it.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = db::open_db(db_path)?;
        let store = ContentStore::new(db::get_files_dir(db_path));
        store.ensure_dirs()?;
        log::info!("Opened catalog {}", db_path.display());
        Ok(Self::new(conn, Arc::new(store)))
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GalleryError::Other("Catalog lock poisoned".to_string()))
    }

    fn mutation_lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.store.lock_files()
    }

    pub fn get_album(&self, album_id: i64) -> Result<Album> {
        let conn = self.conn()?;
        schema::get_album(&conn, album_id)?.ok_or(GalleryError::AlbumNotFound(album_id))
    }

    pub fn list_albums(&self, owner_id: Option<i64>) -> Result<Vec<Album>> {
        let conn = self.conn()?;
        schema::list_albums(&conn, owner_id)
    }

    /// Images of an album, earliest first
    pub fn list_album_images(&self, album_id: i64) -> Result<Vec<Image>> {
        let conn = self.conn()?;
        if schema::get_album(&conn, album_id)?.is_none() {
            return Err(GalleryError::AlbumNotFound(album_id));
        }
        schema::list_album_images(&conn, album_id)
    }

    pub fn get_image(&self, image_id: i64) -> Result<Image> {
        let conn = self.conn()?;
        schema::get_image(&conn, image_id)?.ok_or(GalleryError::ImageNotFound(image_id))
    }

    /// Content hash of an image
    pub fn image_hash(&self, image_id: i64) -> Result<String> {
        let conn = self.conn()?;
        schema::get_image_hash(&conn, image_id)?.ok_or(GalleryError::ImageNotFound(image_id))
    }

    /// Every distinct content hash in the catalog
    pub fn distinct_hashes(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        schema::list_distinct_hashes(&conn)
    }
}
