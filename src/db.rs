use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// Default warehouse file name under the warehouse root.
pub const DB_FILE_NAME: &str = "songplays.sqlite";

/// Environment override for the warehouse location, checked when no
/// `--db-path` flag is given.
pub const DB_PATH_ENV: &str = "SONGPLAYS_DB";

pub fn resolve_db_path(explicit: Option<PathBuf>, warehouse_root: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Ok(value) = std::env::var(DB_PATH_ENV) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }

    warehouse_root.join(DB_FILE_NAME)
}

pub fn open_warehouse(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    Ok(connection)
}

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to set foreign_keys=ON")?;
    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
