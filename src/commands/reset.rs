use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::cli::ResetArgs;
use crate::db::{self, DB_SCHEMA_VERSION};
use crate::util::{ensure_directory, now_utc_string};

/// Fact table first so no DROP ever leaves a dangling foreign-key reference.
const DROP_TABLE_STATEMENTS: [&str; 6] = [
    "DROP TABLE IF EXISTS songplays",
    "DROP TABLE IF EXISTS time",
    "DROP TABLE IF EXISTS users",
    "DROP TABLE IF EXISTS songs",
    "DROP TABLE IF EXISTS artists",
    "DROP TABLE IF EXISTS metadata",
];

/// Dimension tables before the fact table that references them.
///
/// Conflict policy lives in the insert statements, not here: artists, songs
/// and time rows are insert-or-ignore, users upsert their subscription
/// level. Missing artist coordinates are stored as the -1 sentinel, so the
/// latitude/longitude columns stay NOT NULL.
const CREATE_TABLE_STATEMENTS: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS metadata (
       key TEXT PRIMARY KEY,
       value TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS artists (
       artist_id TEXT PRIMARY KEY,
       name TEXT NOT NULL,
       location TEXT,
       latitude REAL NOT NULL DEFAULT -1,
       longitude REAL NOT NULL DEFAULT -1
     )",
    "CREATE TABLE IF NOT EXISTS songs (
       song_id TEXT PRIMARY KEY,
       title TEXT NOT NULL,
       artist_id TEXT NOT NULL,
       year INTEGER,
       duration REAL,
       FOREIGN KEY(artist_id) REFERENCES artists(artist_id)
     )",
    "CREATE TABLE IF NOT EXISTS users (
       user_id INTEGER PRIMARY KEY,
       first_name TEXT,
       last_name TEXT,
       gender TEXT,
       level TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS time (
       start_time INTEGER PRIMARY KEY,
       hour INTEGER NOT NULL,
       day INTEGER NOT NULL,
       week INTEGER NOT NULL,
       month INTEGER NOT NULL,
       year INTEGER NOT NULL,
       weekday INTEGER NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS songplays (
       songplay_id INTEGER PRIMARY KEY AUTOINCREMENT,
       start_time INTEGER NOT NULL,
       user_id INTEGER NOT NULL,
       level TEXT,
       song_id TEXT,
       artist_id TEXT,
       session_id INTEGER,
       location TEXT,
       user_agent TEXT,
       FOREIGN KEY(start_time) REFERENCES time(start_time),
       FOREIGN KEY(user_id) REFERENCES users(user_id),
       FOREIGN KEY(song_id) REFERENCES songs(song_id),
       FOREIGN KEY(artist_id) REFERENCES artists(artist_id)
     )",
    "CREATE INDEX IF NOT EXISTS idx_songs_title ON songs(title)",
    "CREATE INDEX IF NOT EXISTS idx_artists_name ON artists(name)",
];

pub fn run(args: ResetArgs) -> Result<()> {
    let db_path = db::resolve_db_path(args.db_path, &args.warehouse_root);

    info!(db_path = %db_path.display(), "resetting warehouse");

    let connection = reset_warehouse(&db_path)?;
    drop_tables(&connection)?;
    create_tables(&connection)?;

    info!(
        db_path = %db_path.display(),
        schema_version = DB_SCHEMA_VERSION,
        "warehouse reset complete"
    );

    Ok(())
}

/// Removes any existing warehouse database and opens a fresh one.
///
/// The encoding pragma must run before the first object is created, after
/// which SQLite pins it for the lifetime of the file.
pub(crate) fn reset_warehouse(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    remove_database_files(db_path)?;

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to create {}", db_path.display()))?;
    connection
        .pragma_update(None, "encoding", "UTF-8")
        .context("failed to set encoding=UTF-8")?;
    db::configure_connection(&connection)?;

    Ok(connection)
}

fn remove_database_files(db_path: &Path) -> Result<()> {
    let mut targets = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }

    for path in targets {
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }

    Ok(())
}

pub(crate) fn drop_tables(connection: &Connection) -> Result<()> {
    for statement in DROP_TABLE_STATEMENTS {
        connection
            .execute(statement, [])
            .with_context(|| format!("failed to execute: {statement}"))?;
    }
    Ok(())
}

pub(crate) fn create_tables(connection: &Connection) -> Result<()> {
    for statement in CREATE_TABLE_STATEMENTS {
        connection
            .execute(statement, [])
            .with_context(|| format!("failed to execute: {statement}"))?;
    }

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}
