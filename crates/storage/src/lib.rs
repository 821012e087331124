use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{SessionId, SpeechRecordId, TrackId, UserId, Voice, WorkoutSession};

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredSpeech {
    pub id: SpeechRecordId,
    pub text: String,
    pub voice: Voice,
    pub speed: f64,
    pub audio: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrack {
    pub id: TrackId,
    pub name: String,
    pub artist: String,
    pub audio: Vec<u8>,
    pub duration_ms: u64,
    pub genre: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    pub sessions: i64,
    pub open_sessions: i64,
    pub speech_records: i64,
    pub audio_tracks: i64,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a distinct database.
        let pool_options = if database_url.starts_with(MEMORY_URL) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_session(&self, session: &WorkoutSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO workout_sessions
                (id, user_id, start_time, end_time, rounds_completed, total_rounds,
                 complexity_progression, intensity_progression)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.user_id.as_str())
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(i64::from(session.rounds_completed))
        .bind(i64::from(session.total_rounds))
        .bind(serde_json::to_string(&session.complexity_progression)?)
        .bind(serde_json::to_string(&session.intensity_progression)?)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert workout session {}", session.id))?;
        Ok(())
    }

    pub async fn load_session(&self, session_id: SessionId) -> Result<Option<WorkoutSession>> {
        let row = sqlx::query("SELECT * FROM workout_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    pub async fn list_sessions_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<WorkoutSession>> {
        let rows = sqlx::query(
            "SELECT * FROM workout_sessions WHERE user_id = ?
             ORDER BY start_time DESC LIMIT ?",
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Writes the round progression of an open session. The write only lands
    /// when the stored row still has `expected_rounds_completed` rounds, so two
    /// racing writers cannot both append. Returns whether the row was updated.
    pub async fn save_round_progress(
        &self,
        session: &WorkoutSession,
        expected_rounds_completed: u8,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE workout_sessions
             SET rounds_completed = ?, complexity_progression = ?, intensity_progression = ?
             WHERE id = ? AND rounds_completed = ? AND end_time IS NULL",
        )
        .bind(i64::from(session.rounds_completed))
        .bind(serde_json::to_string(&session.complexity_progression)?)
        .bind(serde_json::to_string(&session.intensity_progression)?)
        .bind(session.id.to_string())
        .bind(i64::from(expected_rounds_completed))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    /// Sets `end_time` unless it is already set. Returns false for unknown sessions.
    pub async fn complete_session(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<bool> {
        let matched = sqlx::query(
            "UPDATE workout_sessions SET end_time = COALESCE(end_time, ?) WHERE id = ?",
        )
        .bind(at)
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(matched > 0)
    }

    pub async fn insert_speech_record(&self, record: &StoredSpeech) -> Result<()> {
        sqlx::query(
            "INSERT INTO tts_requests (id, text, voice, speed, audio, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.text)
        .bind(record.voice.as_str())
        .bind(record.speed)
        .bind(&record.audio)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert speech record")?;
        Ok(())
    }

    pub async fn insert_audio_track(&self, track: &StoredTrack) -> Result<()> {
        sqlx::query(
            "INSERT INTO audio_tracks (id, name, artist, audio, duration_ms, genre, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(track.id.to_string())
        .bind(&track.name)
        .bind(&track.artist)
        .bind(&track.audio)
        .bind(i64::try_from(track.duration_ms).context("track duration overflows")?)
        .bind(&track.genre)
        .bind(track.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert audio track {}", track.id))?;
        Ok(())
    }

    pub async fn list_audio_tracks(&self, genre: Option<&str>, limit: u32) -> Result<Vec<StoredTrack>> {
        let rows = match genre {
            Some(genre) => {
                sqlx::query(
                    "SELECT * FROM audio_tracks WHERE genre = ?
                     ORDER BY created_at ASC LIMIT ?",
                )
                .bind(genre)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM audio_tracks ORDER BY created_at ASC LIMIT ?")
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(track_from_row).collect()
    }

    pub async fn load_audio_track(&self, track_id: TrackId) -> Result<Option<StoredTrack>> {
        let row = sqlx::query("SELECT * FROM audio_tracks WHERE id = ?")
            .bind(track_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(track_from_row).transpose()
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM workout_sessions) AS sessions,
                (SELECT COUNT(*) FROM workout_sessions WHERE end_time IS NULL) AS open_sessions,
                (SELECT COUNT(*) FROM tts_requests) AS speech_records,
                (SELECT COUNT(*) FROM audio_tracks) AS audio_tracks",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StorageStats {
            sessions: row.try_get("sessions")?,
            open_sessions: row.try_get("open_sessions")?,
            speech_records: row.try_get("speech_records")?,
            audio_tracks: row.try_get("audio_tracks")?,
        })
    }
}

fn session_from_row(row: &SqliteRow) -> Result<WorkoutSession> {
    let id: String = row.try_get("id")?;
    let complexity: String = row.try_get("complexity_progression")?;
    let intensity: String = row.try_get("intensity_progression")?;
    Ok(WorkoutSession {
        id: id
            .parse()
            .with_context(|| format!("invalid session id '{id}'"))?,
        user_id: UserId(row.try_get("user_id")?),
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        rounds_completed: u8::try_from(row.try_get::<i64, _>("rounds_completed")?)?,
        total_rounds: u8::try_from(row.try_get::<i64, _>("total_rounds")?)?,
        complexity_progression: serde_json::from_str(&complexity)
            .context("invalid complexity progression")?,
        intensity_progression: serde_json::from_str(&intensity)
            .context("invalid intensity progression")?,
    })
}

fn track_from_row(row: &SqliteRow) -> Result<StoredTrack> {
    let id: String = row.try_get("id")?;
    Ok(StoredTrack {
        id: id
            .parse()
            .with_context(|| format!("invalid track id '{id}'"))?,
        name: row.try_get("name")?,
        artist: row.try_get("artist")?,
        audio: row.try_get("audio")?,
        duration_ms: u64::try_from(row.try_get::<i64, _>("duration_ms")?)?,
        genre: row.try_get("genre")?,
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
