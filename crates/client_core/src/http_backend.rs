use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{AudioTrack, MoveCommand, SessionId, UserId, WorkoutSession},
    error::ApiError,
    protocol::{
        MoveCommandRequest, RecordRoundRequest, SpeechRequest, SpeechResponse,
        StartWorkoutRequest, StatusMessage, TrackQuery,
    },
};
use speech::{map_transport_error, SpeechClip, SpeechError, SpeechSynthesizer};
use tracing::debug;
use url::Url;

use crate::{MoveSource, SessionRecorder};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

/// Client for the workout HTTP API. Implements every collaborator the
/// workout controller needs.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_timeout(server_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = server_url.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid api path '{path}'"))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.endpoint(path)?).send().await?;
        decode(response).await
    }

    pub async fn fetch_session(&self, session_id: SessionId) -> Result<WorkoutSession> {
        self.get_json(&format!("api/workout/{session_id}")).await
    }

    pub async fn list_audio_tracks(&self, genre: Option<&str>) -> Result<Vec<AudioTrack>> {
        let query = TrackQuery {
            genre: genre.map(str::to_string),
        };
        let response = self
            .http
            .get(self.endpoint("api/audio/tracks")?)
            .query(&query)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("server returned {status}: {}", error_message(&body)))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|err| err.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl SessionRecorder for HttpBackend {
    async fn start_session(&self, user_id: &UserId) -> Result<WorkoutSession> {
        self.post_json(
            "api/workout/start",
            &StartWorkoutRequest {
                user_id: user_id.clone(),
            },
        )
        .await
    }

    async fn record_round(
        &self,
        session_id: SessionId,
        complexity: f64,
        intensity: f64,
    ) -> Result<WorkoutSession> {
        self.post_json(
            &format!("api/workout/{session_id}/rounds"),
            &RecordRoundRequest {
                complexity,
                intensity,
            },
        )
        .await
    }

    async fn complete_session(&self, session_id: SessionId) -> Result<()> {
        let status: StatusMessage = self
            .post_json(
                &format!("api/workout/{session_id}/complete"),
                &serde_json::json!({}),
            )
            .await?;
        debug!(%session_id, message = %status.message, "session completed remotely");
        Ok(())
    }
}

#[async_trait]
impl MoveSource for HttpBackend {
    async fn next_move(&self, complexity: f64, intensity: f64, round: u8) -> Result<MoveCommand> {
        self.post_json(
            "api/workout/move-command",
            &MoveCommandRequest {
                complexity,
                intensity,
                round_number: round,
            },
        )
        .await
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpBackend {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        speech::validate_request(request)?;
        let url = self
            .endpoint("api/tts/generate")
            .map_err(|err| SpeechError::Unavailable(err.to_string()))?;
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            return Err(match status {
                StatusCode::REQUEST_TIMEOUT => SpeechError::Timeout,
                StatusCode::BAD_REQUEST => SpeechError::InvalidRequest(message),
                StatusCode::SERVICE_UNAVAILABLE => SpeechError::Unavailable(message),
                _ => SpeechError::Upstream {
                    status: status.as_u16(),
                    body: message,
                },
            });
        }

        let payload: SpeechResponse = response.json().await.map_err(map_transport_error)?;
        let audio = STANDARD
            .decode(payload.audio_base64.as_bytes())
            .map_err(|err| SpeechError::Malformed(format!("invalid base64 audio: {err}")))?;
        Ok(SpeechClip {
            text: payload.text,
            voice: payload.voice,
            audio,
        })
    }
}

#[cfg(test)]
#[path = "tests/http_backend_tests.rs"]
mod tests;
