//! Parking spaces, their status, and reservations.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// How long a reservation holds a space before it may be swept.
pub const RESERVATION_TTL: Duration = Duration::minutes(30);

/// The vehicle class a space accepts. Fixed when the lot is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Truck,
    Motorcycle,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Truck => "truck",
            VehicleType::Motorcycle => "motorcycle",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occupancy status of a parking space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpaceStatus {
    Free,
    Reserved,
    Occupied,
    OutOfService,
}

impl SpaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceStatus::Free => "free",
            SpaceStatus::Reserved => "reserved",
            SpaceStatus::Occupied => "occupied",
            SpaceStatus::OutOfService => "out-of-service",
        }
    }
}

impl fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An active hold on a space, created by a reserve call and cleared by
/// occupation, cancellation, or expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Normalized (upper-cased) license plate.
    pub plate: String,
    pub vehicle_type: VehicleType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Reservation {
    /// Build a reservation starting at `now`, expiring after [`RESERVATION_TTL`].
    pub fn new(plate: &str, vehicle_type: VehicleType, now: OffsetDateTime) -> Self {
        Self {
            plate: normalize_plate(plate),
            vehicle_type,
            created_at: now,
            expires_at: now + RESERVATION_TTL,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}

/// A single parking space.
///
/// `number` is the immutable primary key (`"A001"`: zone letter plus a
/// 3-digit per-zone index). `reservation` is `Some` exactly while `status`
/// is [`SpaceStatus::Reserved`]; `current_session_id` is cleared whenever
/// the space leaves [`SpaceStatus::Occupied`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpace {
    pub number: String,
    /// Single upper-case zone letter (`'A'..='Z'`).
    pub zone: char,
    pub vehicle_type: VehicleType,
    pub status: SpaceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Storage-level version counter for optimistic concurrency checks.
    pub version: i64,
}

impl ParkingSpace {
    /// Build a fresh free space at version 0.
    pub fn new(number: String, zone: char, vehicle_type: VehicleType, now: OffsetDateTime) -> Self {
        Self {
            number,
            zone,
            vehicle_type,
            status: SpaceStatus::Free,
            reservation: None,
            current_session_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// True when the space holds a reservation that lapsed before `now`.
    pub fn has_expired_reservation(&self, now: OffsetDateTime) -> bool {
        self.status == SpaceStatus::Reserved
            && self.reservation.as_ref().is_some_and(|r| r.is_expired(now))
    }
}

/// Normalize a raw license plate: trim surrounding whitespace, upper-case.
pub fn normalize_plate(raw: &str) -> String {
    raw.trim().to_uppercase()
}
