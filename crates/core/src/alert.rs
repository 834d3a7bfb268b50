//! Operator alerts raised by the system (currently: expired reservations).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
}

/// A notification for lot operators. `read` is the only mutable field;
/// everything else is fixed at insert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub title: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub read: bool,
    pub priority: AlertPriority,
    /// Free-form payload, e.g. `{plate, spaceNumber, vehicleType}` for
    /// expired reservations.
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn alert_wire_shape() {
        let alert = Alert {
            id: Uuid::nil(),
            alert_type: "reservation_expired".to_string(),
            title: "Reservation expired".to_string(),
            message: "The reservation for AB-123 has expired.".to_string(),
            timestamp: datetime!(2026-03-01 11:00 UTC),
            read: false,
            priority: AlertPriority::Low,
            data: serde_json::json!({"plate": "AB-123", "spaceNumber": "A001"}),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "reservation_expired");
        assert_eq!(json["priority"], "low");
        assert_eq!(json["read"], false);
        assert_eq!(json["data"]["spaceNumber"], "A001");
    }
}
