//! Parking sessions: one vehicle occupying one space for a span of time.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::space::VehicleType;

/// The vehicle attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    /// Normalized (upper-cased) license plate.
    pub plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One stay: created active alongside the occupation of its space, ended
/// alongside the liberation. `amount` is settled by an external billing
/// collaborator; it is carried here and only written when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub vehicle: Vehicle,
    pub space_number: String,
    pub user_id: String,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub amount: f64,
}
