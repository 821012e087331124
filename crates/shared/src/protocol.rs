use serde::{Deserialize, Serialize};

use crate::domain::{UserId, Voice};

pub const ROOT_MESSAGE: &str = "Brutality Fitness API - Ready to train!";
pub const WORKOUT_COMPLETED_MESSAGE: &str = "Workout completed successfully";

pub const MIN_SPEECH_SPEED: f64 = 0.25;
pub const MAX_SPEECH_SPEED: f64 = 4.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkoutRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRoundRequest {
    pub complexity: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveCommandRequest {
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default = "default_round_number")]
    pub round_number: u8,
}

fn default_round_number() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice, speed: f64) -> Self {
        Self {
            text: text.into(),
            voice,
            speed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    pub audio_base64: String,
    pub text: String,
    pub voice: Voice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTrackRequest {
    pub name: String,
    pub artist: String,
    pub audio_base64: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
