use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use shared::domain::{SessionId, TrackId, UserId, DEFAULT_GENRE};
use storage::{Storage, StoredTrack};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/brutality.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListSessions {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    ShowSession {
        session_id: SessionId,
    },
    ImportTrack {
        #[arg(long)]
        name: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        duration_ms: u64,
        #[arg(long, default_value = DEFAULT_GENRE)]
        genre: String,
    },
    ListTracks {
        #[arg(long)]
        genre: Option<String>,
    },
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::ListSessions { user_id, limit } => {
            let sessions = storage
                .list_sessions_for_user(&UserId(user_id), limit)
                .await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for session in sessions {
                println!(
                    "{} started={} rounds={}/{} closed={}",
                    session.id,
                    session.start_time.to_rfc3339(),
                    session.rounds_completed,
                    session.total_rounds,
                    session.is_closed()
                );
            }
        }
        Command::ShowSession { session_id } => {
            let Some(session) = storage.load_session(session_id).await? else {
                bail!("session {session_id} not found");
            };
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Command::ImportTrack {
            name,
            artist,
            file,
            duration_ms,
            genre,
        } => {
            let track = read_track(&file, name, artist, duration_ms, genre).await?;
            storage.insert_audio_track(&track).await?;
            println!("imported track_id={} bytes={}", track.id, track.audio.len());
        }
        Command::ListTracks { genre } => {
            for track in storage.list_audio_tracks(genre.as_deref(), 100).await? {
                println!(
                    "{} {} - {} [{}] {}ms",
                    track.id, track.artist, track.name, track.genre, track.duration_ms
                );
            }
        }
        Command::Stats => {
            let stats = storage.stats().await?;
            println!(
                "sessions={} open_sessions={} speech_records={} audio_tracks={}",
                stats.sessions, stats.open_sessions, stats.speech_records, stats.audio_tracks
            );
        }
    }

    Ok(())
}

async fn read_track(
    file: &Path,
    name: String,
    artist: String,
    duration_ms: u64,
    genre: String,
) -> Result<StoredTrack> {
    if name.trim().is_empty() || artist.trim().is_empty() {
        bail!("track name and artist are required");
    }
    if duration_ms == 0 {
        bail!("track duration must be positive");
    }
    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    if audio.is_empty() {
        bail!("'{}' is empty", file.display());
    }
    Ok(StoredTrack {
        id: TrackId::new(),
        name: name.trim().to_string(),
        artist: artist.trim().to_string(),
        audio,
        duration_ms,
        genre,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
