use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::model::{EtlCounts, LogEvent, TimeRow, UserRow};

/// Only these events are actual playbacks; everything else in the log
/// (page views, auth traffic) is ignored.
const PLAYBACK_PAGE: &str = "NextSong";

const TIME_INSERT: &str = "
    INSERT INTO time(start_time, hour, day, week, month, year, weekday)
    VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(start_time) DO NOTHING
";

const USER_UPSERT: &str = "
    INSERT INTO users(user_id, first_name, last_name, gender, level)
    VALUES(?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(user_id) DO UPDATE SET level=excluded.level
";

const SONG_SELECT: &str = "
    SELECT s.song_id, s.artist_id
    FROM songs s
    JOIN artists a ON s.artist_id = a.artist_id
    WHERE s.title = ?1 AND a.name = ?2 AND s.duration = ?3
";

const SONGPLAY_INSERT: &str = "
    INSERT INTO songplays(start_time, user_id, level, song_id, artist_id,
                          session_id, location, user_agent)
    VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
";

pub(super) fn process_log_file(
    connection: &Connection,
    path: &Path,
    counts: &mut EtlCounts,
) -> Result<()> {
    let events = read_playback_events(path)?;
    counts.events_kept += events.len();

    insert_time_rows(connection, &events, counts)?;
    insert_user_rows(connection, path, &events, counts)?;
    insert_songplay_rows(connection, path, &events, counts)?;

    Ok(())
}

fn read_playback_events(path: &Path) -> Result<Vec<LogEvent>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line =
            line.with_context(|| format!("failed to read {} line {}", path.display(), index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: LogEvent = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse {} line {}", path.display(), index + 1))?;

        if event.page == PLAYBACK_PAGE {
            events.push(event);
        }
    }

    Ok(events)
}

/// One time row per distinct timestamp among the file's playback events.
fn insert_time_rows(
    connection: &Connection,
    events: &[LogEvent],
    counts: &mut EtlCounts,
) -> Result<()> {
    let timestamps: BTreeSet<i64> = events.iter().map(|event| event.ts).collect();

    let mut statement = connection.prepare(TIME_INSERT)?;
    for ts in timestamps {
        let row = TimeRow::from_epoch_ms(ts)?;
        let changed = statement.execute(params![
            row.start_time,
            row.hour,
            row.day,
            row.week,
            row.month,
            row.year,
            row.weekday
        ])?;
        counts.time_rows_inserted += changed;
    }

    Ok(())
}

/// Deduplicates by full tuple identity within the file, preserving
/// first-seen order. Cross-file conflicts resolve through the level upsert.
fn insert_user_rows(
    connection: &Connection,
    path: &Path,
    events: &[LogEvent],
    counts: &mut EtlCounts,
) -> Result<()> {
    let mut seen = HashSet::new();
    let mut statement = connection.prepare(USER_UPSERT)?;

    for event in events {
        let user = user_row(event, path)?;
        if !seen.insert(user.clone()) {
            continue;
        }

        let changed = statement.execute(params![
            user.user_id,
            user.first_name,
            user.last_name,
            user.gender,
            user.level
        ])?;
        counts.users_inserted += changed;
    }

    Ok(())
}

fn user_row(event: &LogEvent, path: &Path) -> Result<UserRow> {
    let user_id = event
        .user_id
        .with_context(|| format!("playback event without user id in {}", path.display()))?;

    Ok(UserRow {
        user_id,
        first_name: event.first_name.clone().unwrap_or_default(),
        last_name: event.last_name.clone().unwrap_or_default(),
        gender: event.gender.clone().unwrap_or_default(),
        level: event.level.clone().unwrap_or_default(),
    })
}

/// Writes one fact row per playback event whose (title, artist, duration)
/// triple matches the catalog. Events with no match are dropped, not
/// errors.
fn insert_songplay_rows(
    connection: &Connection,
    path: &Path,
    events: &[LogEvent],
    counts: &mut EtlCounts,
) -> Result<()> {
    let mut lookup = connection.prepare(SONG_SELECT)?;
    let mut insert = connection.prepare(SONGPLAY_INSERT)?;

    for event in events {
        let matched = lookup
            .query_row(params![event.song, event.artist, event.length], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .with_context(|| format!("song lookup failed for {}", path.display()))?;

        let Some((song_id, artist_id)) = matched else {
            counts.events_unmatched += 1;
            debug!(
                song = event.song.as_deref().unwrap_or(""),
                artist = event.artist.as_deref().unwrap_or(""),
                "no catalog match for playback event"
            );
            continue;
        };

        let user_id = event
            .user_id
            .with_context(|| format!("playback event without user id in {}", path.display()))?;

        insert.execute(params![
            event.ts,
            user_id,
            event.level,
            song_id,
            artist_id,
            event.session_id,
            event.location,
            event.user_agent
        ])?;
        counts.songplays_inserted += 1;
    }

    Ok(())
}
