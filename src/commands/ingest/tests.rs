use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::discover::find_json_files;
use super::log_files::process_log_file;
use super::song_files::process_song_file;
use crate::cli::IngestArgs;
use crate::commands::reset;
use crate::model::{EtlCounts, LogEvent, TimeRow};

const SONG_FIXTURE: &str = r#"{"num_songs": 1, "song_id": "S1", "artist_id": "A1", "artist_name": "X", "artist_location": "", "artist_latitude": null, "artist_longitude": null, "title": "T", "year": 2000, "duration": 180.0}"#;

fn fresh_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("open in-memory db");
    reset::drop_tables(&connection).expect("drop tables");
    reset::create_tables(&connection).expect("create tables");
    connection
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(path, contents).expect("write fixture");
}

fn log_line(ts: i64, user_id: &str, song: &str, artist: &str, length: f64) -> String {
    format!(
        r#"{{"ts": {ts}, "page": "NextSong", "userId": "{user_id}", "firstName": "Ada", "lastName": "Lovelace", "gender": "F", "level": "paid", "song": "{song}", "artist": "{artist}", "length": {length}, "sessionId": 42, "location": "London", "userAgent": "Mozilla/5.0"}}"#
    )
}

#[test]
fn time_row_decomposition_matches_calendar() {
    let row = TimeRow::from_epoch_ms(1_540_000_000_000).expect("decompose");
    assert_eq!(row.start_time, 1_540_000_000_000);
    assert_eq!(row.hour, 1);
    assert_eq!(row.day, 20);
    assert_eq!(row.week, 42);
    assert_eq!(row.month, 10);
    assert_eq!(row.year, 2018);
    // 2018-10-20 is a Saturday, five days from Monday.
    assert_eq!(row.weekday, 5);

    let epoch = TimeRow::from_epoch_ms(0).expect("decompose epoch");
    assert_eq!(epoch.hour, 0);
    assert_eq!(epoch.day, 1);
    assert_eq!(epoch.week, 1);
    assert_eq!(epoch.month, 1);
    assert_eq!(epoch.year, 1970);
    assert_eq!(epoch.weekday, 3);
}

#[test]
fn user_id_accepts_number_string_and_empty_forms() {
    let numeric: LogEvent =
        serde_json::from_str(r#"{"ts": 1, "page": "Home", "userId": 52}"#).expect("numeric");
    assert_eq!(numeric.user_id, Some(52));

    let text: LogEvent =
        serde_json::from_str(r#"{"ts": 1, "page": "Home", "userId": "39"}"#).expect("text");
    assert_eq!(text.user_id, Some(39));

    let anonymous: LogEvent =
        serde_json::from_str(r#"{"ts": 1, "page": "Home", "userId": ""}"#).expect("anonymous");
    assert_eq!(anonymous.user_id, None);

    let absent: LogEvent =
        serde_json::from_str(r#"{"ts": 1, "page": "Home"}"#).expect("absent");
    assert_eq!(absent.user_id, None);
}

#[test]
fn song_file_yields_one_artist_and_song_with_sentinel_coordinates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("song1.json");
    write_file(&path, SONG_FIXTURE);

    let connection = fresh_connection();
    let mut counts = EtlCounts::default();
    process_song_file(&connection, &path, &mut counts).expect("process song file");

    assert_eq!(counts.artists_inserted, 1);
    assert_eq!(counts.songs_inserted, 1);

    let (latitude, longitude): (f64, f64) = connection
        .query_row(
            "SELECT latitude, longitude FROM artists WHERE artist_id = 'A1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("artist row");
    assert_eq!(latitude, -1.0);
    assert_eq!(longitude, -1.0);

    let artist_id: String = connection
        .query_row("SELECT artist_id FROM songs WHERE song_id = 'S1'", [], |row| {
            row.get(0)
        })
        .expect("song row");
    assert_eq!(artist_id, "A1");
}

#[test]
fn song_file_with_unexpected_record_count_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let connection = fresh_connection();
    let mut counts = EtlCounts::default();

    let empty = dir.path().join("empty.json");
    write_file(&empty, "\n");
    let err = process_song_file(&connection, &empty, &mut counts).expect_err("empty file");
    assert!(err.to_string().contains("no records"));

    let doubled = dir.path().join("doubled.json");
    write_file(&doubled, &format!("{SONG_FIXTURE}\n{SONG_FIXTURE}\n"));
    let err = process_song_file(&connection, &doubled, &mut counts).expect_err("two records");
    assert!(err.to_string().contains("expected exactly one"));
}

#[test]
fn find_json_files_returns_sorted_absolute_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(&dir.path().join("b.JSON"), "{}");
    write_file(&dir.path().join("sub/a.json"), "{}");
    write_file(&dir.path().join("sub/deeper/c.json"), "{}");
    write_file(&dir.path().join("notes.txt"), "not json");

    let found = find_json_files(dir.path()).expect("discover");

    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|path| path.is_absolute()));

    let names: Vec<&str> = found
        .iter()
        .map(|path| path.file_name().and_then(|name| name.to_str()).expect("name"))
        .collect();
    assert_eq!(names, vec!["b.JSON", "a.json", "c.json"]);

    let mut sorted = found.clone();
    sorted.sort();
    assert_eq!(found, sorted);
}

#[test]
fn log_file_dedupes_users_and_timestamps_and_drops_unmatched_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.json");

    let lines = [
        log_line(1_540_000_000_000, "7", "T", "X", 180.0),
        log_line(1_540_000_000_000, "7", "T", "X", 180.0),
        log_line(1_540_000_060_000, "8", "U", "Y", 95.5),
        r#"{"ts": 1540000100000, "page": "Home", "userId": ""}"#.to_string(),
    ];
    write_file(&path, &lines.join("\n"));

    // Empty catalog: every playback event misses the lookup.
    let connection = fresh_connection();
    let mut counts = EtlCounts::default();
    process_log_file(&connection, &path, &mut counts).expect("process log file");

    assert_eq!(counts.events_kept, 3);
    assert_eq!(counts.time_rows_inserted, 2);
    assert_eq!(counts.users_inserted, 2);
    assert_eq!(counts.events_unmatched, 3);
    assert_eq!(counts.songplays_inserted, 0);

    let time_rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM time", [], |row| row.get(0))
        .expect("time count");
    assert_eq!(time_rows, 2);

    let users: i64 = connection
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("user count");
    assert_eq!(users, 2);

    let songplays: i64 = connection
        .query_row("SELECT COUNT(*) FROM songplays", [], |row| row.get(0))
        .expect("songplay count");
    assert_eq!(songplays, 0);
}

#[test]
fn malformed_log_line_aborts_with_line_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.json");
    write_file(
        &path,
        &format!("{}\nnot json at all\n", log_line(1_540_000_000_000, "7", "T", "X", 180.0)),
    );

    let connection = fresh_connection();
    let mut counts = EtlCounts::default();
    let err = process_log_file(&connection, &path, &mut counts).expect_err("malformed line");
    assert!(err.to_string().contains("line 2"));
}

fn fixture_tree(root: &Path) -> (PathBuf, PathBuf) {
    let song_data = root.join("data/song_data");
    let log_data = root.join("data/log_data");

    write_file(&song_data.join("A/song1.json"), SONG_FIXTURE);
    write_file(
        &log_data.join("2018/11/events.json"),
        &format!(
            "{}\n{}\n",
            log_line(1_540_000_000_000, "7", "T", "X", 180.0),
            r#"{"ts": 1540000100000, "page": "Home", "userId": ""}"#
        ),
    );

    (song_data, log_data)
}

fn reset_warehouse_file(db_path: &Path) {
    let connection = reset::reset_warehouse(db_path).expect("reset warehouse");
    reset::drop_tables(&connection).expect("drop tables");
    reset::create_tables(&connection).expect("create tables");
}

fn warehouse_counts(db_path: &Path) -> (i64, i64, i64, i64, i64) {
    let connection = Connection::open(db_path).expect("open warehouse");
    let count = |sql: &str| -> i64 {
        connection.query_row(sql, [], |row| row.get(0)).expect("count")
    };
    (
        count("SELECT COUNT(*) FROM artists"),
        count("SELECT COUNT(*) FROM songs"),
        count("SELECT COUNT(*) FROM users"),
        count("SELECT COUNT(*) FROM time"),
        count("SELECT COUNT(*) FROM songplays"),
    )
}

#[test]
fn end_to_end_fixture_loads_all_five_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (song_data, log_data) = fixture_tree(dir.path());
    let db_path = dir.path().join("warehouse.sqlite");
    let manifest_path = dir.path().join("manifest.json");

    reset_warehouse_file(&db_path);

    super::run::run(IngestArgs {
        warehouse_root: dir.path().join("wh"),
        db_path: Some(db_path.clone()),
        song_data,
        log_data,
        manifest_path: Some(manifest_path.clone()),
    })
    .expect("ingest run");

    assert_eq!(warehouse_counts(&db_path), (1, 1, 1, 1, 1));

    let connection = Connection::open(&db_path).expect("open warehouse");
    let (song_id, artist_id, start_time, user_id): (String, String, i64, i64) = connection
        .query_row(
            "SELECT song_id, artist_id, start_time, user_id FROM songplays",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("songplay row");
    assert_eq!(song_id, "S1");
    assert_eq!(artist_id, "A1");
    assert_eq!(start_time, 1_540_000_000_000);
    assert_eq!(user_id, 7);

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).expect("read manifest"))
            .expect("parse manifest");
    assert_eq!(manifest["status"], "completed");
    assert_eq!(manifest["counts"]["songplays_inserted"], 1);
    assert_eq!(manifest["counts"]["song_files_processed"], 1);
    assert_eq!(manifest["counts"]["log_files_processed"], 1);
    assert_eq!(manifest["source_hashes"].as_array().expect("hashes").len(), 2);
}

#[test]
fn reingest_after_reset_repeats_row_counts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (song_data, log_data) = fixture_tree(dir.path());
    let db_path = dir.path().join("warehouse.sqlite");

    let mut observed = Vec::new();
    for cycle in 0..2 {
        reset_warehouse_file(&db_path);
        super::run::run(IngestArgs {
            warehouse_root: dir.path().join("wh"),
            db_path: Some(db_path.clone()),
            song_data: song_data.clone(),
            log_data: log_data.clone(),
            manifest_path: Some(dir.path().join(format!("manifest_{cycle}.json"))),
        })
        .expect("ingest run");
        observed.push(warehouse_counts(&db_path));
    }

    assert_eq!(observed[0], observed[1]);
    assert_eq!(observed[0], (1, 1, 1, 1, 1));
}

#[test]
fn reingest_without_reset_leaves_dimensions_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (song_data, log_data) = fixture_tree(dir.path());
    let db_path = dir.path().join("warehouse.sqlite");

    reset_warehouse_file(&db_path);
    for cycle in 0..2 {
        super::run::run(IngestArgs {
            warehouse_root: dir.path().join("wh"),
            db_path: Some(db_path.clone()),
            song_data: song_data.clone(),
            log_data: log_data.clone(),
            manifest_path: Some(dir.path().join(format!("manifest_{cycle}.json"))),
        })
        .expect("ingest run");
    }

    // Dimension inserts are idempotent; only the fact table, which has no
    // natural key, accumulates a second copy of the event.
    assert_eq!(warehouse_counts(&db_path), (1, 1, 1, 1, 2));
}
