use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiException, ErrorCode};

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_newtype!(SessionId);
uuid_newtype!(TrackId);
uuid_newtype!(SpeechRecordId);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rounds per workout. Completing this round ends the session instead of starting a break.
pub const TOTAL_ROUNDS: u8 = 7;
pub const ROUND_SECONDS: u32 = 300;
pub const BREAK_SECONDS: u32 = 180;
pub const COMPLEXITY_RAMP_SECONDS: u32 = 30;

/// Scores move in whole tenths; `SCORE_STEPS` tenths is the ceiling of 1.0.
pub const SCORE_STEPS: u8 = 10;
pub const INTENSITY_SEED_STEPS: u8 = 1;

pub const DEFAULT_GENRE: &str = "techno_house";

/// Clamps a complexity or intensity score into `[0.0, 1.0]`. NaN collapses to 0.0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn score_from_steps(steps: u8) -> f64 {
    f64::from(steps.min(SCORE_STEPS)) / f64::from(SCORE_STEPS)
}

pub fn is_valid_round(round: u8) -> bool {
    (1..=TOTAL_ROUNDS).contains(&round)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub rounds_completed: u8,
    pub total_rounds: u8,
    #[serde(default)]
    pub complexity_progression: Vec<f64>,
    #[serde(default)]
    pub intensity_progression: Vec<f64>,
}

impl WorkoutSession {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            start_time: Utc::now(),
            end_time: None,
            rounds_completed: 0,
            total_rounds: TOTAL_ROUNDS,
            complexity_progression: Vec::new(),
            intensity_progression: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Appends the scores reached in the round that just finished.
    pub fn record_round(&mut self, complexity: f64, intensity: f64) -> Result<(), ApiException> {
        if self.is_closed() {
            return Err(ApiException::new(
                ErrorCode::Conflict,
                format!("workout session {} is already closed", self.id),
            ));
        }
        if self.rounds_completed >= self.total_rounds {
            return Err(ApiException::new(
                ErrorCode::Validation,
                format!("all {} rounds are already recorded", self.total_rounds),
            ));
        }
        self.complexity_progression.push(clamp_score(complexity));
        self.intensity_progression.push(clamp_score(intensity));
        self.rounds_completed += 1;
        Ok(())
    }

    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(at);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub command: String,
    pub complexity_score: f64,
    pub intensity_score: f64,
    pub duration_ms: u64,
    pub round_number: u8,
}

impl MoveCommand {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// A command the performer can act on: spoken text and a positive duration.
    pub fn is_playable(&self) -> bool {
        !self.command.trim().is_empty() && self.duration_ms > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Voice::ALL
            .into_iter()
            .find(|voice| voice.as_str() == wanted)
            .ok_or_else(|| format!("unknown voice '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: TrackId,
    pub name: String,
    pub artist: String,
    pub audio_base64: String,
    pub duration_ms: u64,
    pub genre: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
