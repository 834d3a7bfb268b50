use carpark_storage::StoreError;
use uuid::Uuid;

/// All failures surfaced by the parking engine.
///
/// The engine never retries and never partially applies: every variant
/// means the registry and history are exactly as they were before the call
/// (modulo other writers).
#[derive(Debug, thiserror::Error)]
pub enum ParkingError {
    /// No space with the given number.
    #[error("space not found: {number}")]
    SpaceNotFound { number: String },

    /// No session with the given id.
    #[error("session not found: {id}")]
    SessionNotFound { id: Uuid },

    /// No alert with the given id.
    #[error("alert not found: {id}")]
    AlertNotFound { id: Uuid },

    /// A transition precondition failed, or a concurrent writer moved the
    /// space first. The caller may re-read and retry.
    #[error("invalid transition for space {number}: {reason}")]
    InvalidTransition { number: String, reason: String },

    /// Malformed input: out-of-range counts, bad pagination, and so on.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backing store is unreachable or timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ParkingError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost OCC race means the precondition snapshot went stale.
            StoreError::Conflict { number, .. } => ParkingError::InvalidTransition {
                number,
                reason: "space was modified concurrently".to_string(),
            },
            StoreError::SpaceNotFound { number } => ParkingError::SpaceNotFound { number },
            StoreError::SessionNotFound { id } => ParkingError::SessionNotFound { id },
            StoreError::AlertNotFound { id } => ParkingError::AlertNotFound { id },
            StoreError::Backend(msg) => ParkingError::StoreUnavailable(msg),
        }
    }
}
