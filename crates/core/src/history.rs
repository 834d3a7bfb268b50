//! Append-only status history records.
//!
//! Every successful space transition produces exactly one [`HistoryEntry`],
//! written in the same storage transaction as the space update. Entries are
//! immutable facts: they are never updated or deleted, and the recorder
//! never re-validates transition legality.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::space::{Reservation, SpaceStatus, VehicleType};

/// What kind of transition produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Creation,
    Reservation,
    Occupation,
    Liberation,
    ReservationCancelled,
    ReservationExpired,
    OutOfService,
    InService,
}

/// Who initiated a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangedBy {
    System,
    User,
}

/// Denormalized space attributes captured with each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub vehicle_type: VehicleType,
    pub zone: char,
}

/// One recorded status change. `previous_status` is `None` only for the
/// creation entry written when the lot is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub space_number: String,
    pub previous_status: Option<SpaceStatus>,
    pub new_status: SpaceStatus,
    pub action: HistoryAction,
    pub reason: String,
    pub changed_by: ChangedBy,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_info: Option<Reservation>,
    pub metadata: HistoryMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn actions_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&HistoryAction::ReservationCancelled).unwrap(),
            "\"reservation_cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&HistoryAction::OutOfService).unwrap(),
            "\"out_of_service\""
        );
        assert_eq!(serde_json::to_string(&ChangedBy::System).unwrap(), "\"system\"");
    }

    #[test]
    fn creation_entry_serializes_null_previous_status() {
        let entry = HistoryEntry {
            id: Uuid::nil(),
            space_number: "A001".to_string(),
            previous_status: None,
            new_status: SpaceStatus::Free,
            action: HistoryAction::Creation,
            reason: "Space created".to_string(),
            changed_by: ChangedBy::System,
            timestamp: datetime!(2026-03-01 10:00 UTC),
            reservation_info: None,
            metadata: HistoryMetadata {
                vehicle_type: VehicleType::Car,
                zone: 'A',
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["previousStatus"].is_null());
        assert_eq!(json["newStatus"], "free");
        assert_eq!(json["action"], "creation");
        assert_eq!(json["changedBy"], "system");
        assert_eq!(json["metadata"]["vehicleType"], "car");
        assert!(json.get("reservationInfo").is_none());
    }
}
