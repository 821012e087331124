use thiserror::Error;

/// Failures a workout surfaces to its observers. Only `PermissionDenied` and
/// `Closed` stop a workout from running; the rest are reported while the
/// round clock keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkoutError {
    #[error("audio permission was denied")]
    PermissionDenied,
    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },
    #[error("move generation failed after retrying: {0}")]
    GenerationFailure(String),
    #[error("workout already started or finished")]
    Closed,
}

impl WorkoutError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        WorkoutError::ServiceUnavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkoutError::PermissionDenied | WorkoutError::Closed)
    }
}
