use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One catalog record as found in a song file. Song files carry exactly one
/// of these per file.
#[derive(Debug, Clone, Deserialize)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    #[serde(default)]
    pub artist_location: Option<String>,
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    pub year: i64,
    pub duration: f64,
}

/// One activity event as found on a log-file line.
///
/// Logged-out rows carry an empty `userId` and null name fields, so
/// everything past the timestamp and page is optional at parse time. The
/// processors enforce presence where a table actually requires a value.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEvent {
    pub ts: i64,
    pub page: String,
    #[serde(rename = "userId", default, deserialize_with = "user_id_field")]
    pub user_id: Option<i64>,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(rename = "userAgent", default)]
    pub user_agent: Option<String>,
}

/// The feed writes `userId` as a number, a numeric string, or an empty
/// string for anonymous sessions; all three must parse.
fn user_id_field<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed.parse::<i64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Calendar decomposition of a millisecond epoch timestamp, one row per
/// distinct `start_time`. `weekday` counts days from Monday (0 = Monday)
/// and `week` is the ISO week number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
}

impl TimeRow {
    pub fn from_epoch_ms(ts: i64) -> Result<Self> {
        let moment = DateTime::<Utc>::from_timestamp_millis(ts)
            .with_context(|| format!("timestamp out of range: {ts}"))?;

        Ok(Self {
            start_time: ts,
            hour: moment.hour(),
            day: moment.day(),
            week: moment.iso_week().week(),
            month: moment.month(),
            year: moment.year(),
            weekday: moment.weekday().num_days_from_monday(),
        })
    }
}

/// One users-table row; hashed for within-file deduplication by full tuple
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRow {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFileEntry {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EtlPaths {
    pub warehouse_root: String,
    pub db_path: String,
    pub song_data: String,
    pub log_data: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EtlCounts {
    pub song_files_found: usize,
    pub song_files_processed: usize,
    pub log_files_found: usize,
    pub log_files_processed: usize,
    pub artists_inserted: usize,
    pub songs_inserted: usize,
    pub time_rows_inserted: usize,
    pub users_inserted: usize,
    pub events_kept: usize,
    pub events_unmatched: usize,
    pub songplays_inserted: usize,
    pub artists_total: i64,
    pub songs_total: i64,
    pub users_total: i64,
    pub time_total: i64,
    pub songplays_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EtlRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: EtlPaths,
    pub counts: EtlCounts,
    pub source_hashes: Vec<SourceFileEntry>,
    pub notes: Vec<String>,
}
