use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use shared::{
    domain::Voice,
    protocol::{SpeechRequest, MAX_SPEECH_SPEED, MIN_SPEECH_SPEED},
};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "tts-1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SPEECH_ROUTE: &str = "/v1/audio/speech";
const RESPONSE_FORMAT: &str = "mp3";

/// Synthesised audio for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    pub text: String,
    pub voice: Voice,
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("invalid speech request: {0}")]
    InvalidRequest(String),
    #[error("speech service unavailable: {0}")]
    Unavailable(String),
    #[error("speech request timed out")]
    Timeout,
    #[error("speech service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("malformed speech response: {0}")]
    Malformed(String),
}

impl SpeechError {
    /// Errors that say nothing about the request itself, only about reaching the service.
    pub fn is_transient(&self) -> bool {
        matches!(self, SpeechError::Unavailable(_) | SpeechError::Timeout)
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip, SpeechError>;
}

/// Stand-in used when no speech backend is configured; every call reports unavailability.
pub struct MissingSpeech;

#[async_trait]
impl SpeechSynthesizer for MissingSpeech {
    async fn synthesize(&self, _request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        Err(SpeechError::Unavailable(
            "no speech backend configured".to_string(),
        ))
    }
}

pub fn validate_request(request: &SpeechRequest) -> Result<(), SpeechError> {
    if request.text.trim().is_empty() {
        return Err(SpeechError::InvalidRequest(
            "text must not be empty".to_string(),
        ));
    }
    if !request.speed.is_finite() || !(MIN_SPEECH_SPEED..=MAX_SPEECH_SPEED).contains(&request.speed)
    {
        return Err(SpeechError::InvalidRequest(format!(
            "speed must be between {MIN_SPEECH_SPEED} and {MAX_SPEECH_SPEED}, got {}",
            request.speed
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiSpeechConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpstreamSpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: Voice,
    speed: f64,
    response_format: &'a str,
}

/// Client for OpenAI-compatible `/v1/audio/speech` endpoints.
pub struct OpenAiSpeech {
    http: Client,
    endpoint: String,
    config: OpenAiSpeechConfig,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiSpeechConfig) -> Result<Self, SpeechError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| SpeechError::Unavailable(format!("failed to build http client: {err}")))?;
        let endpoint = format!("{}{SPEECH_ROUTE}", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip, SpeechError> {
        validate_request(request)?;

        let body = UpstreamSpeechBody {
            model: &self.config.model,
            input: &request.text,
            voice: request.voice,
            speed: request.speed,
            response_format: RESPONSE_FORMAT,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "speech upstream rejected request");
            return Err(SpeechError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await.map_err(map_transport_error)?;
        if audio.is_empty() {
            return Err(SpeechError::Malformed("empty audio body".to_string()));
        }
        debug!(bytes = audio.len(), voice = %request.voice, "speech synthesised");

        Ok(SpeechClip {
            text: request.text.clone(),
            voice: request.voice,
            audio: audio.to_vec(),
        })
    }
}

pub fn map_transport_error(err: reqwest::Error) -> SpeechError {
    if err.is_timeout() {
        SpeechError::Timeout
    } else if err.is_decode() || err.is_body() {
        SpeechError::Malformed(err.to_string())
    } else {
        SpeechError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
