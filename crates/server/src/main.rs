use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{AudioTrack, MoveCommand, SessionId, TrackId, WorkoutSession},
    error::{ApiError, ErrorCode},
    protocol::{
        MoveCommandRequest, RecordRoundRequest, SpeechRequest, SpeechResponse,
        StartWorkoutRequest, StatusMessage, TrackQuery, UploadTrackRequest, ROOT_MESSAGE,
    },
};
use speech::{MissingSpeech, OpenAiSpeech, OpenAiSpeechConfig, SpeechSynthesizer};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, Settings};

type HttpResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        speech: speech_backend(&settings)?,
    };

    let app = build_router(Arc::new(AppState { api }), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn speech_backend(settings: &Settings) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
    let Some(api_key) = settings.tts_api_key.clone() else {
        warn!("no TTS api key configured; speech requests will report unavailable");
        return Ok(Arc::new(MissingSpeech));
    };
    let client = OpenAiSpeech::new(OpenAiSpeechConfig {
        api_key,
        base_url: settings.tts_base_url.clone(),
        model: settings.tts_model.clone(),
        timeout: settings.tts_timeout(),
    })?;
    info!(endpoint = client.endpoint(), model = %settings.tts_model, "speech backend configured");
    Ok(Arc::new(client))
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api", get(root))
        .route("/api/", get(root))
        .route("/api/workout/start", post(http_start_workout))
        .route("/api/workout/move-command", post(http_move_command))
        .route("/api/workout/:session_id", get(http_get_workout))
        .route("/api/workout/:session_id/rounds", post(http_record_round))
        .route("/api/workout/:session_id/complete", post(http_complete_workout))
        .route("/api/tts/generate", post(http_generate_speech))
        .route("/api/audio/upload", post(http_upload_track))
        .route("/api/audio/tracks", get(http_list_tracks))
        .route("/api/audio/track/:track_id", get(http_get_track))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            error!(error = %err, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn root() -> Json<StatusMessage> {
    Json(StatusMessage::new(ROOT_MESSAGE))
}

async fn http_start_workout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartWorkoutRequest>,
) -> HttpResult<WorkoutSession> {
    server_api::start_workout(&state.api, req)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_get_workout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> HttpResult<WorkoutSession> {
    let session_id = parse_session_id(&session_id)?;
    server_api::get_workout(&state.api, session_id)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_record_round(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RecordRoundRequest>,
) -> HttpResult<WorkoutSession> {
    let session_id = parse_session_id(&session_id)?;
    server_api::record_round(&state.api, session_id, req)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_complete_workout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> HttpResult<StatusMessage> {
    let session_id = parse_session_id(&session_id)?;
    server_api::complete_workout(&state.api, session_id)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_move_command(Json(req): Json<MoveCommandRequest>) -> HttpResult<MoveCommand> {
    let mut rng = rand::rng();
    server_api::generate_move_command(&mut rng, &req)
        .map(Json)
        .map_err(into_response_error)
}

async fn http_generate_speech(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeechRequest>,
) -> HttpResult<SpeechResponse> {
    server_api::generate_speech(&state.api, req)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_upload_track(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadTrackRequest>,
) -> HttpResult<AudioTrack> {
    server_api::upload_audio_track(&state.api, req)
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_list_tracks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrackQuery>,
) -> HttpResult<Vec<AudioTrack>> {
    server_api::list_audio_tracks(&state.api, query.genre.as_deref())
        .await
        .map(Json)
        .map_err(into_response_error)
}

async fn http_get_track(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<String>,
) -> HttpResult<AudioTrack> {
    let track_id: TrackId = track_id.parse().map_err(|_| {
        into_response_error(ApiError::new(ErrorCode::Validation, "invalid track id"))
    })?;
    server_api::get_audio_track(&state.api, track_id)
        .await
        .map(Json)
        .map_err(into_response_error)
}

fn parse_session_id(raw: &str) -> Result<SessionId, (StatusCode, Json<ApiError>)> {
    raw.parse().map_err(|_| {
        into_response_error(ApiError::new(ErrorCode::Validation, "invalid session id"))
    })
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn into_response_error(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
