use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::StdRng, SeedableRng};
use shared::domain::{score_from_steps, Voice};
use speech::{MissingSpeech, SpeechClip};

use super::*;

struct EchoSpeech;

#[async_trait]
impl SpeechSynthesizer for EchoSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        speech::validate_request(request)?;
        Ok(SpeechClip {
            text: request.text.clone(),
            voice: request.voice,
            audio: b"ID3".to_vec(),
        })
    }
}

struct FailingSpeech(SpeechError);

#[async_trait]
impl SpeechSynthesizer for FailingSpeech {
    async fn synthesize(&self, _request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        Err(self.0.clone())
    }
}

async fn context_with(speech: Arc<dyn SpeechSynthesizer>) -> ApiContext {
    ApiContext {
        storage: Storage::new("sqlite::memory:").await.expect("db"),
        speech,
    }
}

async fn context() -> ApiContext {
    context_with(Arc::new(EchoSpeech)).await
}

fn start_request(user: &str) -> StartWorkoutRequest {
    StartWorkoutRequest {
        user_id: UserId(user.to_string()),
    }
}

#[tokio::test]
async fn start_workout_creates_open_session() {
    let ctx = context().await;
    let session = start_workout(&ctx, start_request("  alice "))
        .await
        .expect("start");
    assert_eq!(session.user_id.as_str(), "alice");
    assert_eq!(session.rounds_completed, 0);
    assert_eq!(session.total_rounds, TOTAL_ROUNDS);

    let loaded = get_workout(&ctx, session.id).await.expect("load");
    assert_eq!(loaded.id, session.id);
    assert!(!loaded.is_closed());
}

#[tokio::test]
async fn start_workout_rejects_blank_user() {
    let ctx = context().await;
    let err = start_workout(&ctx, start_request("   "))
        .await
        .expect_err("blank user");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let ctx = context().await;
    let err = get_workout(&ctx, SessionId::new())
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = complete_workout(&ctx, SessionId::new())
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn rounds_accumulate_until_limit_then_complete() {
    let ctx = context().await;
    let session = start_workout(&ctx, start_request("bob")).await.expect("start");

    for round in 1..=TOTAL_ROUNDS {
        let updated = record_round(
            &ctx,
            session.id,
            RecordRoundRequest {
                complexity: 0.9,
                intensity: score_from_steps(round),
            },
        )
        .await
        .expect("record");
        assert_eq!(updated.rounds_completed, round);
    }

    let err = record_round(
        &ctx,
        session.id,
        RecordRoundRequest {
            complexity: 0.9,
            intensity: 0.8,
        },
    )
    .await
    .expect_err("eighth round");
    assert_eq!(err.code, ErrorCode::Validation);

    let status = complete_workout(&ctx, session.id).await.expect("complete");
    assert_eq!(status.message, WORKOUT_COMPLETED_MESSAGE);

    let stored = get_workout(&ctx, session.id).await.expect("load");
    assert!(stored.is_closed());
    assert_eq!(stored.intensity_progression.len(), usize::from(TOTAL_ROUNDS));
}

#[tokio::test]
async fn completed_session_rejects_new_rounds() {
    let ctx = context().await;
    let session = start_workout(&ctx, start_request("carol"))
        .await
        .expect("start");
    complete_workout(&ctx, session.id).await.expect("complete");

    let err = record_round(
        &ctx,
        session.id,
        RecordRoundRequest {
            complexity: 0.2,
            intensity: 0.1,
        },
    )
    .await
    .expect_err("closed");
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn recorded_scores_are_clamped() {
    let ctx = context().await;
    let session = start_workout(&ctx, start_request("dana")).await.expect("start");
    let updated = record_round(
        &ctx,
        session.id,
        RecordRoundRequest {
            complexity: 3.5,
            intensity: -1.0,
        },
    )
    .await
    .expect("record");
    assert_eq!(updated.complexity_progression, vec![1.0]);
    assert_eq!(updated.intensity_progression, vec![0.0]);
}

#[test]
fn move_command_validates_round_number() {
    let mut rng = StdRng::seed_from_u64(7);
    for round_number in [0, TOTAL_ROUNDS + 1] {
        let err = generate_move_command(
            &mut rng,
            &MoveCommandRequest {
                complexity: 0.5,
                intensity: 0.5,
                round_number,
            },
        )
        .expect_err("out of range");
        assert_eq!(err.code, ErrorCode::Validation);
    }
}

#[test]
fn move_command_at_zero_complexity_is_single_numeral() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let command = generate_move_command(
            &mut rng,
            &MoveCommandRequest {
                complexity: 0.0,
                intensity: 0.3,
                round_number: 2,
            },
        )
        .expect("command");
        let index: u64 = command.command.parse().expect("numeral");
        assert!((1..=4).contains(&index));
        assert_eq!(command.duration_ms, index * 1000 + 1500);
        assert_eq!(command.round_number, 2);
        assert_eq!(command.intensity_score, 0.3);
    }
}

#[tokio::test]
async fn speech_is_encoded_and_recorded() {
    let ctx = context().await;
    let response = generate_speech(&ctx, SpeechRequest::new("Round 1", Voice::Nova, 1.0))
        .await
        .expect("speech");
    assert_eq!(response.audio_base64, STANDARD.encode(b"ID3"));
    assert_eq!(response.text, "Round 1");
    assert_eq!(response.voice, Voice::Nova);

    let stats = ctx.storage.stats().await.expect("stats");
    assert_eq!(stats.speech_records, 1);
}

#[tokio::test]
async fn speech_failures_map_to_error_codes() {
    let cases = [
        (SpeechError::Timeout, ErrorCode::Timeout),
        (
            SpeechError::Upstream {
                status: 401,
                body: "invalid api key".into(),
            },
            ErrorCode::Upstream,
        ),
        (
            SpeechError::Malformed("empty audio body".into()),
            ErrorCode::Upstream,
        ),
        (
            SpeechError::InvalidRequest("text must not be empty".into()),
            ErrorCode::Validation,
        ),
    ];
    for (failure, expected) in cases {
        let ctx = context_with(Arc::new(FailingSpeech(failure))).await;
        let err = generate_speech(&ctx, SpeechRequest::new("Round 4", Voice::Alloy, 1.0))
            .await
            .expect_err("failure");
        assert_eq!(err.code, expected);
    }

    let ctx = context_with(Arc::new(MissingSpeech)).await;
    let err = generate_speech(&ctx, SpeechRequest::new("Round 4", Voice::Alloy, 1.0))
        .await
        .expect_err("missing backend");
    assert_eq!(err.code, ErrorCode::Unavailable);
    assert_eq!(ctx.storage.stats().await.expect("stats").speech_records, 0);
}

#[tokio::test]
async fn uploaded_track_defaults_genre_and_round_trips_audio() {
    let ctx = context().await;
    let track = upload_audio_track(
        &ctx,
        UploadTrackRequest {
            name: "Pressure".into(),
            artist: "DJ Jab".into(),
            audio_base64: STANDARD.encode(b"mp3-bytes"),
            duration_ms: 210_000,
        },
    )
    .await
    .expect("upload");
    assert_eq!(track.genre, DEFAULT_GENRE);

    let listed = list_audio_tracks(&ctx, Some(DEFAULT_GENRE))
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert!(list_audio_tracks(&ctx, Some("jazz"))
        .await
        .expect("list")
        .is_empty());
    assert_eq!(list_audio_tracks(&ctx, Some("  ")).await.expect("list").len(), 1);

    let loaded = get_audio_track(&ctx, track.id).await.expect("get");
    assert_eq!(
        STANDARD.decode(loaded.audio_base64).expect("base64"),
        b"mp3-bytes".to_vec()
    );

    let err = get_audio_track(&ctx, TrackId::new())
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn upload_rejects_bad_payloads() {
    let ctx = context().await;
    let valid = UploadTrackRequest {
        name: "Pressure".into(),
        artist: "DJ Jab".into(),
        audio_base64: STANDARD.encode(b"mp3-bytes"),
        duration_ms: 1_000,
    };

    let bad = [
        UploadTrackRequest {
            audio_base64: "not base64!!".into(),
            ..valid.clone()
        },
        UploadTrackRequest {
            audio_base64: String::new(),
            ..valid.clone()
        },
        UploadTrackRequest {
            name: " ".into(),
            ..valid.clone()
        },
        UploadTrackRequest {
            duration_ms: 0,
            ..valid.clone()
        },
    ];
    for request in bad {
        let err = upload_audio_track(&ctx, request)
            .await
            .expect_err("rejected");
        assert_eq!(err.code, ErrorCode::Validation);
    }
    assert_eq!(ctx.storage.stats().await.expect("stats").audio_tracks, 0);
}
