// Album transactions
//
// One add or edit is applied as a unit across the catalog and the blob
// store:
//   1. take the mutation lock
//   2. ingest uploads; blobs this call created go on a CleanupList
//   3. apply deletions, title edits and inserts in one SQLite transaction
//   4. pick the cover, or delete the album when it has no images left
//   5. commit, dismiss the CleanupList, then remove orphaned blobs
// A failure before the commit rolls back and the CleanupList removes the
// new blobs. Orphans are only removed after the commit and never un-commit
// anything when removal fails.

use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;
use tempfile::TempDir;

use super::cleanup::CleanupList;
use super::{AddAlbumOutcome, AlbumEdit, AlbumStore, EditAlbumOutcome, PreviewJob};
use crate::db::schema::{self, format_timestamp, now_timestamp, NewImage};
use crate::error::{GalleryError, ItemError, Result};
use crate::hash::short_hash;
use crate::upload::{UploadBatch, UploadedFile};

/// Result of the insert step
struct Inserted {
    jobs: Vec<PreviewJob>,
    count: usize,
    first: Option<(i64, bool)>,
    explicit_cover: Option<(i64, bool)>,
}

/// What the edit transaction decided, applied after the commit
struct EditApplied {
    outcome: EditAlbumOutcome,
    orphans: Vec<String>,
}

fn unpack(uploads: Option<UploadBatch>) -> (Vec<UploadedFile>, Vec<ItemError>, Option<TempDir>) {
    match uploads {
        Some(batch) => {
            let (files, errors, dir) = batch.into_parts();
            (files, errors, Some(dir))
        }
        None => (Vec::new(), Vec::new(), None),
    }
}

/// Database failures abort the batch and carry the item errors so far.
fn transaction_error(err: GalleryError, errors: Vec<ItemError>) -> GalleryError {
    match err {
        GalleryError::Database(source) => {
            log::error!("Album transaction rolled back: {}", source);
            GalleryError::Transaction { source, errors }
        }
        other => other,
    }
}

impl AlbumStore {
    /// Create an album from staged uploads.
    pub fn add_album(&self, owner_id: i64, name: &str, uploads: UploadBatch) -> Result<AddAlbumOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GalleryError::Validation("Album name is required".to_string()));
        }

        // `_dir` keeps the staging directory alive until the end of the call
        let (files, mut errors, _dir) = uploads.into_parts();
        if files.is_empty() {
            return Err(if errors.is_empty() {
                GalleryError::Validation("No images uploaded".to_string())
            } else {
                GalleryError::NothingIngested(errors)
            });
        }

        let _guard = self.mutation_lock()?;
        let mut staged = CleanupList::new();
        let ingested = self.ingest_all(files, &mut staged, &mut errors);
        if ingested.is_empty() {
            return Err(GalleryError::NothingIngested(errors));
        }

        let mut conn = self.conn()?;
        let (album_id, inserted) = match insert_album_tx(&mut conn, owner_id, name, &ingested) {
            Ok(result) => result,
            Err(e) => return Err(transaction_error(e, errors)),
        };
        staged.dismiss();

        log::info!(
            "Created album {} ({} images, {} new blobs)",
            album_id,
            inserted.count,
            inserted.jobs.len()
        );
        Ok(AddAlbumOutcome {
            album_id,
            added: inserted.count,
            jobs: inserted.jobs,
            errors,
        })
    }

    /// Apply deletions, title edits, a rename and new uploads to one album.
    pub fn edit_album(
        &self,
        owner_id: i64,
        album_id: i64,
        edit: AlbumEdit,
        uploads: Option<UploadBatch>,
    ) -> Result<EditAlbumOutcome> {
        let new_name = match edit.name.as_deref().map(str::trim) {
            Some("") => return Err(GalleryError::Validation("Album name is required".to_string())),
            other => other.map(str::to_string),
        };
        let (files, mut errors, _dir) = unpack(uploads);

        let _guard = self.mutation_lock()?;

        let album = {
            let conn = self.conn()?;
            schema::get_album(&conn, album_id)?.ok_or(GalleryError::AlbumNotFound(album_id))?
        };
        if album.owner_id != owner_id {
            return Err(GalleryError::NotOwner(album_id));
        }

        let renames = new_name.as_deref().is_some_and(|n| n != album.name);
        if !renames && files.is_empty() && edit.is_empty() {
            return Err(if errors.is_empty() {
                GalleryError::Validation("Nothing to change".to_string())
            } else {
                GalleryError::NothingIngested(errors)
            });
        }

        let mut staged = CleanupList::new();
        let ingested = self.ingest_all(files, &mut staged, &mut errors);

        let name = new_name.unwrap_or_else(|| album.name.clone());
        let applied = {
            let mut conn = self.conn()?;
            match edit_album_tx(&mut conn, &album, &name, &edit, &ingested, &mut errors) {
                Ok(applied) => applied,
                Err(e) => return Err(transaction_error(e, errors)),
            }
        };
        staged.dismiss();

        for hash in &applied.orphans {
            if let Err(e) = self.store.remove_blob_and_previews(hash) {
                log::warn!("Could not remove orphaned blob {}: {}", short_hash(hash), e);
            }
        }

        let mut outcome = applied.outcome;
        outcome.errors = errors;
        log::info!(
            "Edited album {}: {} deleted, {} retitled, {} added{}",
            album_id,
            outcome.deleted_count,
            outcome.title_edit_count,
            outcome.added,
            if outcome.deleted { ", album removed" } else { "" }
        );
        Ok(outcome)
    }

    /// Move staged uploads into the store. Blobs created here are
    /// registered on `staged`; failures become item errors.
    fn ingest_all(
        &self,
        files: Vec<UploadedFile>,
        staged: &mut CleanupList,
        errors: &mut Vec<ItemError>,
    ) -> Vec<UploadedFile> {
        let mut ingested = Vec::with_capacity(files.len());
        for file in files {
            match self.store.ingest(&file.temp_path, &file.sha256) {
                Ok(outcome) => {
                    if outcome.created {
                        staged.push(outcome.path);
                    }
                    ingested.push(file);
                }
                Err(e) => {
                    log::warn!("Could not ingest {}: {}", file.file_name, e);
                    errors.push(ItemError::new(&file.file_name, "Could not store image"));
                }
            }
        }
        ingested
    }
}

fn insert_album_tx(
    conn: &mut Connection,
    owner_id: i64,
    name: &str,
    files: &[UploadedFile],
) -> Result<(i64, Inserted)> {
    let tx = conn.transaction()?;
    let album_id = schema::insert_album(&tx, owner_id, name, &now_timestamp())?;
    let inserted = insert_images(&tx, album_id, files)?;

    // A new album defaults to its first upload as cover
    if let Some((image_id, portrait)) = inserted.explicit_cover.or(inserted.first) {
        schema::set_album_cover(&tx, album_id, image_id, portrait)?;
    }
    tx.commit()?;
    Ok((album_id, inserted))
}

fn edit_album_tx(
    conn: &mut Connection,
    album: &schema::Album,
    name: &str,
    edit: &AlbumEdit,
    files: &[UploadedFile],
    errors: &mut Vec<ItemError>,
) -> Result<EditApplied> {
    let album_id = album.id;
    let tx = conn.transaction()?;
    let mut outcome = EditAlbumOutcome::default();

    schema::update_album_name(&tx, album_id, name, &now_timestamp())?;

    let mut candidates: Vec<String> = Vec::new();
    for &image_id in &edit.deleted {
        let Some(hash) = schema::get_image_hash_in_album(&tx, image_id, album_id)? else {
            errors.push(ItemError::new(format!("image={}", image_id), "Not found in this album"));
            continue;
        };
        if schema::delete_image_in_album(&tx, image_id, album_id)? > 0 {
            outcome.deleted_count += 1;
            candidates.push(hash);
        }
    }

    // Sorted so item errors come out in a stable order
    let titles: BTreeMap<&String, &String> = edit.titles.iter().collect();
    for (key, title) in titles {
        let Ok(image_id) = key.trim().parse::<i64>() else {
            errors.push(ItemError::new(key.as_str(), "Error parsing image ID"));
            continue;
        };
        if schema::update_image_title(&tx, image_id, album_id, title)? > 0 {
            outcome.title_edit_count += 1;
        } else {
            errors.push(ItemError::new(format!("image={}", image_id), "Not found in this album"));
        }
    }

    let inserted = insert_images(&tx, album_id, files)?;
    outcome.added = inserted.count;

    // Checked after the inserts: a re-upload keeps its blob
    let mut orphans = Vec::new();
    let mut seen = HashSet::new();
    for hash in candidates {
        if seen.insert(hash.clone()) && !schema::hash_is_referenced(&tx, &hash)? {
            orphans.push(hash);
        }
    }

    let existing_cover = match album.image_id {
        Some(cover_id) => schema::get_image_orientation_in_album(&tx, cover_id, album_id)?
            .map(|portrait| (cover_id, portrait)),
        None => None,
    };
    let cover = match inserted.explicit_cover.or(existing_cover) {
        Some(cover) => Some(cover),
        None => schema::first_album_image(&tx, album_id)?,
    };
    match cover {
        Some((image_id, portrait)) => {
            schema::set_album_cover(&tx, album_id, image_id, portrait)?;
            outcome.jobs = inserted.jobs;
        }
        None => {
            schema::delete_album(&tx, album_id)?;
            outcome.deleted = true;
        }
    }

    tx.commit()?;
    Ok(EditApplied { outcome, orphans })
}

/// Insert one row per file. Jobs are emitted once per distinct hash.
fn insert_images(conn: &Connection, album_id: i64, files: &[UploadedFile]) -> Result<Inserted> {
    let mut inserted = Inserted {
        jobs: Vec::new(),
        count: 0,
        first: None,
        explicit_cover: None,
    };
    let mut hashes = HashSet::new();

    for file in files {
        let image_id = schema::insert_image(conn, &NewImage {
            album_id,
            sha256sum: file.sha256.clone(),
            title: file.title.clone(),
            is_portrait: file.is_portrait,
            created: format_timestamp(file.created),
            owner_file_name: file.file_name.clone(),
        })?;
        inserted.count += 1;

        if inserted.first.is_none() {
            inserted.first = Some((image_id, file.is_portrait));
        }
        if file.is_cover {
            inserted.explicit_cover = Some((image_id, file.is_portrait));
        }
        if hashes.insert(file.sha256.as_str()) {
            inserted.jobs.push(PreviewJob {
                image_id,
                sha256: file.sha256.clone(),
            });
        }
    }

    Ok(inserted)
}
