//! Write and query shapes passed across the [`ParkStore`](crate::ParkStore)
//! boundary. The persisted records themselves (spaces, history entries,
//! sessions, alerts) are the carpark-core types.

use carpark_core::{Reservation, SessionStatus, SpaceStatus};
use time::OffsetDateTime;
use uuid::Uuid;

/// Wholesale replacement of a space's mutable fields, applied by a
/// version-checked update. The immutable identity fields (`number`, `zone`,
/// `vehicle_type`, `created_at`) never change after generation.
#[derive(Debug, Clone)]
pub struct SpaceUpdate {
    pub status: SpaceStatus,
    pub reservation: Option<Reservation>,
    pub current_session_id: Option<Uuid>,
    pub updated_at: OffsetDateTime,
}

/// Mutable session fields. `amount` is `None` to leave the stored amount
/// untouched.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub status: SessionStatus,
    pub end_time: Option<OffsetDateTime>,
    pub amount: Option<f64>,
}

/// Filter for listing spaces. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SpaceFilter {
    pub zone: Option<char>,
    pub status: Option<SpaceStatus>,
}

/// Filter for listing sessions. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub user_id: Option<String>,
    /// Keep only sessions with `start_time >= started_after`.
    pub started_after: Option<OffsetDateTime>,
}
