use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use engine::RandomSource;
use shared::{
    domain::{
        is_valid_round, AudioTrack, MoveCommand, SessionId, SpeechRecordId, TrackId,
        UserId, WorkoutSession, DEFAULT_GENRE, TOTAL_ROUNDS,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        MoveCommandRequest, RecordRoundRequest, SpeechRequest, SpeechResponse,
        StartWorkoutRequest, StatusMessage, UploadTrackRequest, WORKOUT_COMPLETED_MESSAGE,
    },
};
use speech::{SpeechError, SpeechSynthesizer};
use storage::{Storage, StoredSpeech, StoredTrack};
use tracing::{info, warn};

pub const MAX_LISTED_TRACKS: u32 = 100;
const MAX_USER_ID_BYTES: usize = 128;
const MAX_TRACK_FIELD_BYTES: usize = 200;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

pub async fn start_workout(
    ctx: &ApiContext,
    request: StartWorkoutRequest,
) -> Result<WorkoutSession, ApiError> {
    let user_id = request.user_id.as_str().trim();
    if user_id.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "user_id must not be empty"));
    }
    if user_id.len() > MAX_USER_ID_BYTES {
        return Err(ApiError::new(ErrorCode::Validation, "user_id is too long"));
    }

    let session = WorkoutSession::new(UserId(user_id.to_string()));
    ctx.storage
        .create_session(&session)
        .await
        .map_err(internal)?;
    info!(session_id = %session.id, user_id = %session.user_id, "workout session started");
    Ok(session)
}

pub async fn get_workout(ctx: &ApiContext, session_id: SessionId) -> Result<WorkoutSession, ApiError> {
    ctx.storage
        .load_session(session_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "Workout session not found"))
}

pub async fn record_round(
    ctx: &ApiContext,
    session_id: SessionId,
    request: RecordRoundRequest,
) -> Result<WorkoutSession, ApiError> {
    let mut session = get_workout(ctx, session_id).await?;
    let expected = session.rounds_completed;
    session.record_round(request.complexity, request.intensity)?;

    let saved = ctx
        .storage
        .save_round_progress(&session, expected)
        .await
        .map_err(internal)?;
    if !saved {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            "workout session changed while recording the round; reload and retry",
        ));
    }
    info!(
        %session_id,
        rounds_completed = session.rounds_completed,
        "workout round recorded"
    );
    Ok(session)
}

pub async fn complete_workout(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<StatusMessage, ApiError> {
    let matched = ctx
        .storage
        .complete_session(session_id, Utc::now())
        .await
        .map_err(internal)?;
    if !matched {
        return Err(ApiError::new(ErrorCode::NotFound, "Workout session not found"));
    }
    info!(%session_id, "workout session completed");
    Ok(StatusMessage::new(WORKOUT_COMPLETED_MESSAGE))
}

pub fn generate_move_command<R: RandomSource + ?Sized>(
    rng: &mut R,
    request: &MoveCommandRequest,
) -> Result<MoveCommand, ApiError> {
    if !is_valid_round(request.round_number) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("round_number must be between 1 and {TOTAL_ROUNDS}"),
        ));
    }
    Ok(engine::generate(
        rng,
        request.complexity,
        request.intensity,
        request.round_number,
    ))
}

pub async fn generate_speech(
    ctx: &ApiContext,
    request: SpeechRequest,
) -> Result<SpeechResponse, ApiError> {
    let clip = ctx
        .speech
        .synthesize(&request)
        .await
        .map_err(speech_error)?;

    let record = StoredSpeech {
        id: SpeechRecordId::new(),
        text: request.text.clone(),
        voice: request.voice,
        speed: request.speed,
        audio: clip.audio.clone(),
        created_at: Utc::now(),
    };
    if let Err(err) = ctx.storage.insert_speech_record(&record).await {
        warn!(error = %err, "failed to record speech request");
    }

    Ok(SpeechResponse {
        audio_base64: STANDARD.encode(&clip.audio),
        text: clip.text,
        voice: clip.voice,
    })
}

pub async fn upload_audio_track(
    ctx: &ApiContext,
    request: UploadTrackRequest,
) -> Result<AudioTrack, ApiError> {
    let name = require_field("name", &request.name)?;
    let artist = require_field("artist", &request.artist)?;
    if request.duration_ms == 0 {
        return Err(ApiError::new(ErrorCode::Validation, "duration_ms must be positive"));
    }
    let audio = STANDARD
        .decode(request.audio_base64.trim())
        .map_err(|_| ApiError::new(ErrorCode::Validation, "invalid base64 audio"))?;
    if audio.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "audio must not be empty"));
    }

    let track = StoredTrack {
        id: TrackId::new(),
        name,
        artist,
        audio,
        duration_ms: request.duration_ms,
        genre: DEFAULT_GENRE.to_string(),
        created_at: Utc::now(),
    };
    ctx.storage
        .insert_audio_track(&track)
        .await
        .map_err(internal)?;
    info!(track_id = %track.id, bytes = track.audio.len(), "audio track uploaded");
    Ok(track_payload(track))
}

pub async fn list_audio_tracks(
    ctx: &ApiContext,
    genre: Option<&str>,
) -> Result<Vec<AudioTrack>, ApiError> {
    let genre = genre.map(str::trim).filter(|genre| !genre.is_empty());
    let tracks = ctx
        .storage
        .list_audio_tracks(genre, MAX_LISTED_TRACKS)
        .await
        .map_err(internal)?;
    Ok(tracks.into_iter().map(track_payload).collect())
}

pub async fn get_audio_track(ctx: &ApiContext, track_id: TrackId) -> Result<AudioTrack, ApiError> {
    ctx.storage
        .load_audio_track(track_id)
        .await
        .map_err(internal)?
        .map(track_payload)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "Track not found"))
}

pub fn track_payload(track: StoredTrack) -> AudioTrack {
    AudioTrack {
        id: track.id,
        name: track.name,
        artist: track.artist,
        audio_base64: STANDARD.encode(&track.audio),
        duration_ms: track.duration_ms,
        genre: track.genre,
        created_at: track.created_at,
    }
}

pub fn speech_error(err: SpeechError) -> ApiError {
    let code = match &err {
        SpeechError::InvalidRequest(_) => ErrorCode::Validation,
        SpeechError::Timeout => ErrorCode::Timeout,
        SpeechError::Unavailable(_) => ErrorCode::Unavailable,
        SpeechError::Upstream { .. } | SpeechError::Malformed(_) => ErrorCode::Upstream,
    };
    if code != ErrorCode::Validation {
        warn!(error = %err, "speech synthesis failed");
    }
    ApiError::new(code, err.to_string())
}

fn require_field(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} must not be empty"),
        ));
    }
    if value.len() > MAX_TRACK_FIELD_BYTES {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} is too long"),
        ));
    }
    Ok(value.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
