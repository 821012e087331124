use super::*;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::Request,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::domain::Voice;
use speech::{SpeechClip, SpeechError};
use tower::ServiceExt;

struct ToneSpeech;

#[async_trait]
impl SpeechSynthesizer for ToneSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        speech::validate_request(request)?;
        if request.text == "slow" {
            return Err(SpeechError::Timeout);
        }
        Ok(SpeechClip {
            text: request.text.clone(),
            voice: request.voice,
            audio: b"ID3-tone".to_vec(),
        })
    }
}

async fn test_app() -> (Router, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage: storage.clone(),
        speech: Arc::new(ToneSpeech),
    };
    let app = build_router(Arc::new(AppState { api }), 1024 * 1024);
    (app, storage)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage) = test_app().await;
    let response = app.oneshot(get_request("/healthz")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn root_returns_ready_message() {
    let (app, _storage) = test_app().await;
    for uri in ["/api", "/api/"] {
        let response = app.clone().oneshot(get_request(uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let message: StatusMessage = read_json(response).await;
        assert_eq!(message.message, ROOT_MESSAGE);
    }
}

#[tokio::test]
async fn workout_lifecycle_routes_work() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workout/start",
            serde_json::json!({ "user_id": "route-user" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let session: WorkoutSession = read_json(response).await;
    assert_eq!(session.total_rounds, 7);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/workout/{}/rounds", session.id),
            serde_json::json!({ "complexity": 0.9, "intensity": 0.1 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: WorkoutSession = read_json(response).await;
    assert_eq!(updated.rounds_completed, 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/workout/{}/complete", session.id),
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let status: StatusMessage = read_json(response).await;
    assert_eq!(status.message, "Workout completed successfully");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/workout/{}", session.id)))
        .await
        .expect("response");
    let stored: WorkoutSession = read_json(response).await;
    assert!(stored.end_time.is_some());

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/workout/{}/rounds", session.id),
            serde_json::json!({ "complexity": 0.9, "intensity": 0.2 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_and_malformed_session_ids_are_rejected() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/workout/{}", SessionId::new())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::NotFound);

    let response = app
        .oneshot(get_request("/api/workout/not-a-uuid"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn move_command_route_returns_generated_command() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workout/move-command",
            serde_json::json!({ "complexity": 0.0, "intensity": 0.4, "round_number": 3 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let command: MoveCommand = read_json(response).await;
    assert_eq!(command.round_number, 3);
    assert_eq!(command.complexity_score, 0.0);
    assert!(command.is_playable());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/workout/move-command",
            serde_json::json!({ "complexity": 0.5, "intensity": 0.4, "round_number": 9 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn speech_route_encodes_audio_and_maps_timeouts() {
    let (app, storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tts/generate",
            serde_json::json!({ "text": "Round 1", "voice": "onyx" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let speech: SpeechResponse = read_json(response).await;
    assert_eq!(speech.voice, Voice::Onyx);
    assert_eq!(
        STANDARD.decode(speech.audio_base64).expect("base64"),
        b"ID3-tone".to_vec()
    );
    assert_eq!(storage.stats().await.expect("stats").speech_records, 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tts/generate",
            serde_json::json!({ "text": "slow" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/tts/generate",
            serde_json::json!({ "text": "Round 2", "speed": 10.0 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audio_track_routes_upload_list_and_fetch() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/audio/upload",
            serde_json::json!({
                "name": "Pressure",
                "artist": "DJ Jab",
                "audio_base64": STANDARD.encode(b"mp3"),
                "duration_ms": 200000
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let track: AudioTrack = read_json(response).await;
    assert_eq!(track.genre, "techno_house");

    let response = app
        .clone()
        .oneshot(get_request("/api/audio/tracks?genre=techno_house"))
        .await
        .expect("response");
    let tracks: Vec<AudioTrack> = read_json(response).await;
    assert_eq!(tracks.len(), 1);

    let response = app
        .clone()
        .oneshot(get_request("/api/audio/tracks?genre=ambient"))
        .await
        .expect("response");
    let tracks: Vec<AudioTrack> = read_json(response).await;
    assert!(tracks.is_empty());

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/audio/track/{}", track.id)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/api/audio/track/{}", TrackId::new())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let (app, _storage) = test_app().await;
    let payload = serde_json::json!({
        "name": "Big",
        "artist": "DJ Jab",
        "audio_base64": "A".repeat(2 * 1024 * 1024),
        "duration_ms": 1
    })
    .to_string();
    let request = Request::post("/api/audio/upload")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .expect("request");
    let response = app
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn error_codes_map_to_http_statuses() {
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCode::Timeout), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(status_for(ErrorCode::Upstream), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for(ErrorCode::Internal), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn missing_api_key_falls_back_to_unavailable_speech() {
    let settings = Settings::default();
    assert!(settings.tts_api_key.is_none());
    assert!(speech_backend(&settings).is_ok());
}
