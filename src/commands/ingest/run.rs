use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::cli::IngestArgs;
use crate::db::{self, DB_SCHEMA_VERSION};
use crate::model::{EtlCounts, EtlPaths, EtlRunManifest, SourceFileEntry};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

use super::discover::find_json_files;
use super::log_files::process_log_file;
use super::song_files::process_song_file;

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("etl-{}", utc_compact_string(started_ts));

    let db_path = db::resolve_db_path(args.db_path.clone(), &args.warehouse_root);
    if !db_path.exists() {
        bail!(
            "warehouse database {} does not exist, run `songplays reset` first",
            db_path.display()
        );
    }

    let manifest_dir = args.warehouse_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("etl_run_{}.json", utc_compact_string(started_ts)))
    });

    info!(db_path = %db_path.display(), run_id = %run_id, "starting ingest");

    let mut connection = db::open_warehouse(&db_path)?;
    let mut counts = EtlCounts::default();
    let mut source_hashes = Vec::new();

    let (found, processed) = process_tree(
        &mut connection,
        &args.song_data,
        process_song_file,
        &mut counts,
        &mut source_hashes,
    )?;
    counts.song_files_found = found;
    counts.song_files_processed = processed;

    let (found, processed) = process_tree(
        &mut connection,
        &args.log_data,
        process_log_file,
        &mut counts,
        &mut source_hashes,
    )?;
    counts.log_files_found = found;
    counts.log_files_processed = processed;

    counts.artists_total = db::count_rows(&connection, "SELECT COUNT(*) FROM artists")?;
    counts.songs_total = db::count_rows(&connection, "SELECT COUNT(*) FROM songs")?;
    counts.users_total = db::count_rows(&connection, "SELECT COUNT(*) FROM users")?;
    counts.time_total = db::count_rows(&connection, "SELECT COUNT(*) FROM time")?;
    counts.songplays_total = db::count_rows(&connection, "SELECT COUNT(*) FROM songplays")?;

    let updated_at = now_utc_string();
    let manifest = EtlRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at,
        paths: EtlPaths {
            warehouse_root: args.warehouse_root.display().to_string(),
            db_path: db_path.display().to_string(),
            song_data: args.song_data.display().to_string(),
            log_data: args.log_data.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        counts: counts.clone(),
        source_hashes,
        notes: vec![
            "Playback events without a catalog match are dropped from the fact table."
                .to_string(),
        ],
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote etl run manifest");
    info!(
        songplays = counts.songplays_total,
        unmatched = counts.events_unmatched,
        "ingest completed"
    );

    Ok(())
}

/// Walks one directory tree and feeds every JSON file to `per_file`,
/// committing after each file.
fn process_tree<F>(
    connection: &mut Connection,
    root: &Path,
    mut per_file: F,
    counts: &mut EtlCounts,
    source_hashes: &mut Vec<SourceFileEntry>,
) -> Result<(usize, usize)>
where
    F: FnMut(&Connection, &Path, &mut EtlCounts) -> Result<()>,
{
    let files = find_json_files(root)?;
    let total = files.len();
    info!(total, root = %root.display(), "json files found");

    let mut processed = 0;
    for path in &files {
        let tx = connection.transaction()?;
        per_file(&tx, path, counts)?;
        tx.commit()
            .with_context(|| format!("failed to commit {}", path.display()))?;

        source_hashes.push(SourceFileEntry {
            path: path.display().to_string(),
            sha256: sha256_file(path)?,
        });

        processed += 1;
        info!(processed, total, path = %path.display(), "file processed");
    }

    Ok((total, processed))
}
