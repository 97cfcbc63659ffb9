use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "songplays",
    version,
    about = "Song-play warehouse schema and ingestion tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drop and recreate the warehouse database and all tables.
    Reset(ResetArgs),
    /// Walk the song and log trees and load them into the warehouse.
    Ingest(IngestArgs),
    /// Report schema version and per-table row counts.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    #[arg(long, default_value = ".cache/songplays")]
    pub warehouse_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/songplays")]
    pub warehouse_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = "data/song_data")]
    pub song_data: PathBuf,

    #[arg(long, default_value = "data/log_data")]
    pub log_data: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/songplays")]
    pub warehouse_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
