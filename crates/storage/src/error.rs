use uuid::Uuid;

/// All errors that can be returned by a ParkStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency control conflict -- another transaction moved
    /// the space past the expected version.
    #[error("concurrent conflict on space {number}: expected version {expected_version}")]
    Conflict { number: String, expected_version: i64 },

    /// No space with the given number.
    #[error("space not found: {number}")]
    SpaceNotFound { number: String },

    /// No session with the given id.
    #[error("session not found: {id}")]
    SessionNotFound { id: Uuid },

    /// No alert with the given id.
    #[error("alert not found: {id}")]
    AlertNotFound { id: Uuid },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
