use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};

use crate::model::{EtlCounts, SongRecord};

/// Coordinates missing from the source feed are stored as -1, never NULL.
const MISSING_COORDINATE: f64 = -1.0;

const ARTIST_INSERT: &str = "
    INSERT INTO artists(artist_id, name, location, latitude, longitude)
    VALUES(?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(artist_id) DO NOTHING
";

const SONG_INSERT: &str = "
    INSERT INTO songs(song_id, title, artist_id, year, duration)
    VALUES(?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(song_id) DO NOTHING
";

/// Loads the single catalog record of one song file: the artist row first,
/// then the song row referencing it.
pub(super) fn process_song_file(
    connection: &Connection,
    path: &Path,
    counts: &mut EtlCounts,
) -> Result<()> {
    let record = read_song_record(path)?;

    let latitude = record.artist_latitude.unwrap_or(MISSING_COORDINATE);
    let longitude = record.artist_longitude.unwrap_or(MISSING_COORDINATE);

    let artist_changed = connection
        .execute(
            ARTIST_INSERT,
            params![
                record.artist_id,
                record.artist_name,
                record.artist_location,
                latitude,
                longitude
            ],
        )
        .with_context(|| format!("failed to insert artist from {}", path.display()))?;
    counts.artists_inserted += artist_changed;

    let song_changed = connection
        .execute(
            SONG_INSERT,
            params![
                record.song_id,
                record.title,
                record.artist_id,
                record.year,
                record.duration
            ],
        )
        .with_context(|| format!("failed to insert song from {}", path.display()))?;
    counts.songs_inserted += song_changed;

    Ok(())
}

/// Song files carry exactly one record; any other count is an error.
fn read_song_record(path: &Path) -> Result<SongRecord> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: SongRecord = serde_json::from_str(line)
            .with_context(|| format!("failed to parse {} line {}", path.display(), index + 1))?;
        records.push(record);
    }

    match records.len() {
        0 => bail!("song file {} contains no records", path.display()),
        1 => Ok(records.swap_remove(0)),
        n => bail!(
            "song file {} contains {} records, expected exactly one",
            path.display(),
            n
        ),
    }
}
