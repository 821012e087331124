use anyhow::{anyhow, Result};
use async_trait::async_trait;
use engine::MoveGenerator;
use shared::domain::{MoveCommand, SessionId, UserId, WorkoutSession};
use tokio::sync::Mutex;

pub mod controller;
pub mod error;
mod http_backend;

pub use controller::{
    ControllerEvent, RoundState, VoiceSettings, WorkoutController, WorkoutDependencies,
    WorkoutPhase, WorkoutPlan, WorkoutSnapshot, WorkoutSummary,
};
pub use error::WorkoutError;
pub use http_backend::HttpBackend;

/// Remote bookkeeping for a workout. The controller never waits on these
/// calls to advance the round clock.
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn start_session(&self, user_id: &UserId) -> Result<WorkoutSession>;
    async fn record_round(
        &self,
        session_id: SessionId,
        complexity: f64,
        intensity: f64,
    ) -> Result<WorkoutSession>;
    async fn complete_session(&self, session_id: SessionId) -> Result<()>;
}

pub struct MissingSessionRecorder;

#[async_trait]
impl SessionRecorder for MissingSessionRecorder {
    async fn start_session(&self, _user_id: &UserId) -> Result<WorkoutSession> {
        Err(anyhow!("session recorder is unavailable"))
    }

    async fn record_round(
        &self,
        _session_id: SessionId,
        _complexity: f64,
        _intensity: f64,
    ) -> Result<WorkoutSession> {
        Err(anyhow!("session recorder is unavailable"))
    }

    async fn complete_session(&self, _session_id: SessionId) -> Result<()> {
        Err(anyhow!("session recorder is unavailable"))
    }
}

#[async_trait]
pub trait MoveSource: Send + Sync {
    async fn next_move(&self, complexity: f64, intensity: f64, round: u8) -> Result<MoveCommand>;
}

/// Generates moves in-process with the same policy the server uses.
pub struct LocalMoveSource {
    generator: Mutex<MoveGenerator>,
}

impl LocalMoveSource {
    pub fn from_entropy() -> Self {
        Self {
            generator: Mutex::new(MoveGenerator::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            generator: Mutex::new(MoveGenerator::seeded(seed)),
        }
    }
}

#[async_trait]
impl MoveSource for LocalMoveSource {
    async fn next_move(&self, complexity: f64, intensity: f64, round: u8) -> Result<MoveCommand> {
        Ok(self
            .generator
            .lock()
            .await
            .generate(complexity, intensity, round))
    }
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// `Ok(false)` means the user refused.
    async fn request_audio_permission(&self) -> Result<bool>;
}

pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn request_audio_permission(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
