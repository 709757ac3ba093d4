// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Albums. image_id is the cover image; not a foreign key because the
    -- cover is chosen after the album row exists.
    CREATE TABLE albums (
        aid INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        image_id INTEGER,
        is_portrait INTEGER NOT NULL DEFAULT 0,
        created TEXT NOT NULL,
        modified TEXT NOT NULL,
        name TEXT NOT NULL
    );

    -- Images. sha256sum names the blob in the content store.
    CREATE TABLE images (
        iid INTEGER PRIMARY KEY AUTOINCREMENT,
        album_id INTEGER NOT NULL REFERENCES albums(aid),
        sha256sum TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        is_portrait INTEGER NOT NULL DEFAULT 0,
        created TEXT NOT NULL,
        owner_file_name TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX idx_albums_owner ON albums(owner_id);
    CREATE INDEX idx_images_sha256 ON images(sha256sum);
    CREATE INDEX idx_images_album_created ON images(album_id, created);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0)
    )?;
    Ok(version)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a DB created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports (max {}).",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        // Schema change and version bump commit together
        let batch = format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        );
        conn.execute_batch(&batch)?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}
