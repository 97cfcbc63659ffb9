use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::db;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = db::resolve_db_path(args.db_path, &args.warehouse_root);

    if !db_path.exists() {
        warn!(path = %db_path.display(), "warehouse database missing");
        return Ok(());
    }

    let connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let schema_version = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("failed to read schema version")?;

    let artists = db::count_rows(&connection, "SELECT COUNT(*) FROM artists").unwrap_or(0);
    let songs = db::count_rows(&connection, "SELECT COUNT(*) FROM songs").unwrap_or(0);
    let users = db::count_rows(&connection, "SELECT COUNT(*) FROM users").unwrap_or(0);
    let time_rows = db::count_rows(&connection, "SELECT COUNT(*) FROM time").unwrap_or(0);
    let songplays = db::count_rows(&connection, "SELECT COUNT(*) FROM songplays").unwrap_or(0);

    info!(
        path = %db_path.display(),
        schema_version = %schema_version.unwrap_or_default(),
        artists,
        songs,
        users,
        time_rows,
        songplays,
        "warehouse status"
    );

    Ok(())
}
