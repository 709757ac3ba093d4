// Database schema types and query helpers
//
// Helpers take `&Connection` so they work both on a plain connection and
// inside a `rusqlite::Transaction` (which derefs to `Connection`).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::Result;

/// Format a UTC time the way the catalog stores it
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

// ----- Album -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i64,
    pub owner_id: i64,
    /// Cover image
    pub image_id: Option<i64>,
    pub is_portrait: bool,
    pub created: String,
    pub modified: String,
    pub name: String,
}

const ALBUM_COLUMNS: &str = "aid, owner_id, image_id, is_portrait, created, modified, name";

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        image_id: row.get(2)?,
        is_portrait: row.get(3)?,
        created: row.get(4)?,
        modified: row.get(5)?,
        name: row.get(6)?,
    })
}

pub fn insert_album(conn: &Connection, owner_id: i64, name: &str, now: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO albums (owner_id, created, modified, name) VALUES (?1, ?2, ?2, ?3)",
        params![owner_id, now, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_album(conn: &Connection, id: i64) -> Result<Option<Album>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM albums WHERE aid = ?1", ALBUM_COLUMNS),
        params![id],
        album_from_row,
    ).optional()?;
    Ok(result)
}

/// List albums, newest modification first. `owner_id` filters by owner.
pub fn list_albums(conn: &Connection, owner_id: Option<i64>) -> Result<Vec<Album>> {
    let sql = match owner_id {
        Some(_) => format!(
            "SELECT {} FROM albums WHERE owner_id = ?1 ORDER BY modified DESC, aid DESC",
            ALBUM_COLUMNS
        ),
        None => format!("SELECT {} FROM albums ORDER BY modified DESC, aid DESC", ALBUM_COLUMNS),
    };
    let mut stmt = conn.prepare(&sql)?;
    let albums = match owner_id {
        Some(owner) => stmt.query_map(params![owner], album_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt.query_map([], album_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(albums)
}

pub fn update_album_name(conn: &Connection, id: i64, name: &str, now: &str) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE albums SET name = ?1, modified = ?2 WHERE aid = ?3",
        params![name, now, id],
    )?;
    Ok(rows)
}

pub fn set_album_cover(conn: &Connection, id: i64, image_id: i64, is_portrait: bool) -> Result<()> {
    conn.execute(
        "UPDATE albums SET image_id = ?1, is_portrait = ?2 WHERE aid = ?3",
        params![image_id, is_portrait, id],
    )?;
    Ok(())
}

pub fn delete_album(conn: &Connection, id: i64) -> Result<usize> {
    let rows = conn.execute("DELETE FROM albums WHERE aid = ?1", params![id])?;
    Ok(rows)
}

// ----- Image -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub album_id: i64,
    pub sha256sum: String,
    pub title: String,
    pub is_portrait: bool,
    pub created: String,
    pub owner_file_name: String,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub album_id: i64,
    pub sha256sum: String,
    pub title: String,
    pub is_portrait: bool,
    pub created: String,
    pub owner_file_name: String,
}

const IMAGE_COLUMNS: &str = "iid, album_id, sha256sum, title, is_portrait, created, owner_file_name";

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        album_id: row.get(1)?,
        sha256sum: row.get(2)?,
        title: row.get(3)?,
        is_portrait: row.get(4)?,
        created: row.get(5)?,
        owner_file_name: row.get(6)?,
    })
}

pub fn insert_image(conn: &Connection, image: &NewImage) -> Result<i64> {
    conn.execute(
        "INSERT INTO images (album_id, sha256sum, title, is_portrait, created, owner_file_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            image.album_id,
            image.sha256sum,
            image.title,
            image.is_portrait,
            image.created,
            image.owner_file_name,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_image(conn: &Connection, id: i64) -> Result<Option<Image>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM images WHERE iid = ?1", IMAGE_COLUMNS),
        params![id],
        image_from_row,
    ).optional()?;
    Ok(result)
}

pub fn get_image_hash(conn: &Connection, id: i64) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT sha256sum FROM images WHERE iid = ?1",
        params![id],
        |row| row.get(0),
    ).optional()?;
    Ok(result)
}

pub fn get_image_hash_in_album(conn: &Connection, id: i64, album_id: i64) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT sha256sum FROM images WHERE iid = ?1 AND album_id = ?2",
        params![id, album_id],
        |row| row.get(0),
    ).optional()?;
    Ok(result)
}

/// Orientation flag of an image if it belongs to the album
pub fn get_image_orientation_in_album(conn: &Connection, id: i64, album_id: i64) -> Result<Option<bool>> {
    let result = conn.query_row(
        "SELECT is_portrait FROM images WHERE iid = ?1 AND album_id = ?2",
        params![id, album_id],
        |row| row.get(0),
    ).optional()?;
    Ok(result)
}

pub fn delete_image_in_album(conn: &Connection, id: i64, album_id: i64) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM images WHERE iid = ?1 AND album_id = ?2",
        params![id, album_id],
    )?;
    Ok(rows)
}

pub fn update_image_title(conn: &Connection, id: i64, album_id: i64, title: &str) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE images SET title = ?1 WHERE iid = ?2 AND album_id = ?3",
        params![title, id, album_id],
    )?;
    Ok(rows)
}

/// Images of an album in display order (creation time, then id)
pub fn list_album_images(conn: &Connection, album_id: i64) -> Result<Vec<Image>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM images WHERE album_id = ?1 ORDER BY created, iid",
        IMAGE_COLUMNS
    ))?;
    let images = stmt.query_map(params![album_id], image_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(images)
}

/// Earliest-created image of an album: (id, is_portrait)
pub fn first_album_image(conn: &Connection, album_id: i64) -> Result<Option<(i64, bool)>> {
    let result = conn.query_row(
        "SELECT iid, is_portrait FROM images WHERE album_id = ?1 ORDER BY created, iid LIMIT 1",
        params![album_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ).optional()?;
    Ok(result)
}

/// Whether any image row, in any album, still references the blob
pub fn hash_is_referenced(conn: &Connection, hash: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM images WHERE sha256sum = ?1 LIMIT 1)",
        params![hash],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Every distinct content hash in the catalog, oldest image first
pub fn list_distinct_hashes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sha256sum FROM images GROUP BY sha256sum ORDER BY MIN(iid)"
    )?;
    let hashes = stmt.query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn new_image(album_id: i64, hash: &str, created: &str) -> NewImage {
        NewImage {
            album_id,
            sha256sum: hash.to_string(),
            title: String::new(),
            is_portrait: false,
            created: created.to_string(),
            owner_file_name: "photo.jpg".to_string(),
        }
    }

    #[test]
    fn test_album_roundtrip_and_cover() {
        let conn = open_in_memory().unwrap();
        let aid = insert_album(&conn, 7, "Trip", "2024-01-01T00:00:00Z").unwrap();
        let iid = insert_image(&conn, &new_image(aid, "a", "2024-01-01T00:00:00Z")).unwrap();
        set_album_cover(&conn, aid, iid, true).unwrap();

        let album = get_album(&conn, aid).unwrap().unwrap();
        assert_eq!(album.owner_id, 7);
        assert_eq!(album.image_id, Some(iid));
        assert!(album.is_portrait);
        assert_eq!(album.created, album.modified);
    }

    #[test]
    fn test_first_image_orders_by_created_then_id() {
        let conn = open_in_memory().unwrap();
        let aid = insert_album(&conn, 1, "A", "2024-01-01T00:00:00Z").unwrap();
        let late = insert_image(&conn, &new_image(aid, "a", "2024-05-01T00:00:00Z")).unwrap();
        let tie1 = insert_image(&conn, &new_image(aid, "b", "2024-02-01T00:00:00Z")).unwrap();
        let _tie2 = insert_image(&conn, &new_image(aid, "c", "2024-02-01T00:00:00Z")).unwrap();

        assert_eq!(first_album_image(&conn, aid).unwrap(), Some((tie1, false)));
        let ids: Vec<i64> = list_album_images(&conn, aid).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids.last(), Some(&late));
    }

    #[test]
    fn test_hash_reference_spans_albums() {
        let conn = open_in_memory().unwrap();
        let a1 = insert_album(&conn, 1, "A", "2024-01-01T00:00:00Z").unwrap();
        let a2 = insert_album(&conn, 2, "B", "2024-01-01T00:00:00Z").unwrap();
        let i1 = insert_image(&conn, &new_image(a1, "shared", "2024-01-01T00:00:00Z")).unwrap();
        insert_image(&conn, &new_image(a2, "shared", "2024-01-01T00:00:00Z")).unwrap();

        assert_eq!(delete_image_in_album(&conn, i1, a2).unwrap(), 0, "wrong album must not match");
        assert_eq!(delete_image_in_album(&conn, i1, a1).unwrap(), 1);
        assert!(hash_is_referenced(&conn, "shared").unwrap());
        assert_eq!(list_distinct_hashes(&conn).unwrap(), vec!["shared".to_string()]);
    }

    #[test]
    fn test_list_albums_by_owner() {
        let conn = open_in_memory().unwrap();
        insert_album(&conn, 1, "Mine", "2024-01-01T00:00:00Z").unwrap();
        insert_album(&conn, 2, "Theirs", "2024-01-02T00:00:00Z").unwrap();

        assert_eq!(list_albums(&conn, None).unwrap().len(), 2);
        let mine = list_albums(&conn, Some(1)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Mine");
    }
}
