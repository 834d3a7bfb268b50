//! Expiry sweeper: frees reserved spaces whose reservation lapsed.
//!
//! The sweeper is just another writer through the shared transition path.
//! Each expired space is freed in its own transaction together with one
//! `reservation_expired` history entry and one low-priority alert; a space
//! that loses its version race (e.g. a concurrent occupy arrived between
//! scan and update) is logged and skipped so the rest of the sweep
//! proceeds.

use carpark_core::{Alert, AlertPriority, ChangedBy, HistoryAction, SpaceStatus};
use carpark_storage::ParkStore;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ParkingError;
use crate::service::ParkingService;
use crate::transition::TransitionPlan;

/// What a sweep accomplished.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    /// Spaces actually freed in this sweep.
    pub freed: usize,
    /// Expired reservations found but skipped because another writer got
    /// to the space first.
    pub skipped: usize,
}

impl<S: ParkStore> ParkingService<S> {
    /// Free every reserved space whose reservation expired before `now`.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> Result<SweepOutcome, ParkingError> {
        let reserved = self
            .list_spaces(None, Some(SpaceStatus::Reserved))
            .await?;

        let mut freed = 0usize;
        let mut skipped = 0usize;
        for space in reserved {
            if !space.has_expired_reservation(now) {
                continue;
            }
            match self.expire_one(&space.number, now).await {
                Ok(()) => freed += 1,
                // Per-space failures must not abort the sweep.
                Err(ParkingError::InvalidTransition { number, reason }) => {
                    tracing::warn!(space = %number, %reason, "sweep skipped space");
                    skipped += 1;
                }
                Err(ParkingError::SpaceNotFound { number }) => {
                    tracing::warn!(space = %number, "sweep skipped vanished space");
                    skipped += 1;
                }
                // Store unavailability affects every remaining space alike;
                // abort instead of burning a timeout per space.
                Err(e) => return Err(e),
            }
        }

        if freed > 0 || skipped > 0 {
            tracing::info!(freed, skipped, "expired reservations swept");
        }
        Ok(SweepOutcome { freed, skipped })
    }

    /// Run the cancel-equivalent transition for one expired reservation,
    /// recording `reservation_expired` and emitting the alert in the same
    /// transaction.
    async fn expire_one(&self, number: &str, now: OffsetDateTime) -> Result<(), ParkingError> {
        self.apply_transition(number, move |space, txn_now| {
            // Re-check against the locked snapshot: the reservation may have
            // been taken, cancelled, or renewed since the scan.
            let Some(reservation) = space
                .reservation
                .clone()
                .filter(|r| space.status == SpaceStatus::Reserved && r.is_expired(now))
            else {
                return Err(ParkingError::InvalidTransition {
                    number: space.number.clone(),
                    reason: "reservation no longer expired".to_string(),
                });
            };

            let alert = Alert {
                id: Uuid::new_v4(),
                alert_type: "reservation_expired".to_string(),
                title: "Reservation expired".to_string(),
                message: format!(
                    "Reservation for {} on space {} has expired",
                    reservation.plate, space.number
                ),
                timestamp: txn_now,
                read: false,
                priority: AlertPriority::Low,
                data: serde_json::json!({
                    "plate": reservation.plate,
                    "spaceNumber": space.number,
                    "vehicleType": reservation.vehicle_type,
                }),
            };

            Ok(TransitionPlan {
                new_status: SpaceStatus::Free,
                reservation: None,
                current_session_id: None,
                action: HistoryAction::ReservationExpired,
                reason: "Reservation expired automatically".to_string(),
                changed_by: ChangedBy::System,
                reservation_info: Some(reservation),
                alert: Some(alert),
            })
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carpark_core::{ParkingSpace, VehicleType, RESERVATION_TTL};
    use carpark_storage::MemoryStore;
    use time::Duration;

    async fn lot(numbers: &[&str]) -> ParkingService<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut txn = store.begin_txn().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let spaces = numbers
            .iter()
            .map(|n| ParkingSpace::new(n.to_string(), 'A', VehicleType::Car, now))
            .collect();
        store.replace_all_spaces(&mut txn, spaces).await.unwrap();
        store.commit_txn(txn).await.unwrap();
        ParkingService::new(store)
    }

    #[tokio::test]
    async fn sweep_frees_only_expired_reservations() {
        let svc = lot(&["A001", "A002", "A003"]).await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();
        svc.reserve("A002", "BB-222", VehicleType::Car).await.unwrap();
        // A003 stays free.

        // Before the TTL elapses nothing is expired.
        let outcome = svc.sweep_expired(OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(outcome.freed, 0);

        // After the TTL both reservations are stale.
        let later = OffsetDateTime::now_utc() + RESERVATION_TTL + Duration::minutes(1);
        let outcome = svc.sweep_expired(later).await.unwrap();
        assert_eq!(outcome.freed, 2);
        assert_eq!(outcome.skipped, 0);

        for number in ["A001", "A002"] {
            let space = svc.get_space(number).await.unwrap();
            assert_eq!(space.status, SpaceStatus::Free);
            assert!(space.reservation.is_none());
        }
    }

    #[tokio::test]
    async fn each_freed_space_gets_one_history_entry_and_one_alert() {
        let svc = lot(&["A001", "A002"]).await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();
        svc.reserve("A002", "BB-222", VehicleType::Car).await.unwrap();

        let later = OffsetDateTime::now_utc() + RESERVATION_TTL + Duration::minutes(1);
        svc.sweep_expired(later).await.unwrap();

        for (number, plate) in [("A001", "AA-111"), ("A002", "BB-222")] {
            let history = svc.history_for_space(number, 50).await.unwrap();
            let expired: Vec<_> = history
                .iter()
                .filter(|e| e.action == HistoryAction::ReservationExpired)
                .collect();
            assert_eq!(expired.len(), 1, "space {number}");
            assert_eq!(expired[0].changed_by, ChangedBy::System);
            assert_eq!(
                expired[0].reservation_info.as_ref().map(|r| r.plate.as_str()),
                Some(plate)
            );
        }

        let alerts = svc.alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 2);
        for alert in &alerts {
            assert_eq!(alert.alert_type, "reservation_expired");
            assert_eq!(alert.priority, AlertPriority::Low);
            assert!(!alert.read);
        }
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let svc = lot(&["A001"]).await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();

        let later = OffsetDateTime::now_utc() + RESERVATION_TTL + Duration::minutes(1);
        assert_eq!(svc.sweep_expired(later).await.unwrap().freed, 1);
        assert_eq!(svc.sweep_expired(later).await.unwrap().freed, 0);
        assert_eq!(svc.alerts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_skips_space_occupied_since_scan() {
        let svc = lot(&["A001"]).await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();
        // The occupy wins before the sweep runs; the stale reservation is
        // gone, so the sweep has nothing to free.
        svc.occupy("A001", None, None, None).await.unwrap();

        let later = OffsetDateTime::now_utc() + RESERVATION_TTL + Duration::minutes(1);
        let outcome = svc.sweep_expired(later).await.unwrap();
        assert_eq!(outcome.freed, 0);
        assert_eq!(svc.get_space("A001").await.unwrap().status, SpaceStatus::Occupied);
        assert!(svc.alerts(10).await.unwrap().is_empty());
    }
}
