// Database module

pub mod migrations;
pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use anyhow::Result;

use crate::constants::FILES_DIR_SUFFIX;

/// Open or create a catalog database at the given path
pub fn open_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_connection(&conn)?;

    // Enable WAL mode for better concurrency
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Open an in-memory catalog with all migrations applied
#[cfg(test)]
pub(crate) fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    Ok(())
}

/// Files directory for a database: `<db file>.mpa`
pub fn get_files_dir(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(FILES_DIR_SUFFIX);
    PathBuf::from(name)
}
