//! The reservation/occupation state machine.
//!
//! Every public operation follows the same path: read the space inside a
//! transaction, check the precondition against that snapshot, apply a
//! version-checked update, and append exactly one history entry -- all
//! committed as a single atomic unit. A failed precondition aborts before
//! anything is staged; a lost version race surfaces as
//! [`ParkingError::InvalidTransition`] and applies nothing.

use carpark_core::{
    normalize_plate, Alert, ChangedBy, HistoryAction, HistoryEntry, HistoryMetadata, ParkingSpace,
    Reservation, SpaceStatus, VehicleType,
};
use carpark_storage::{ParkStore, SpaceUpdate};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ParkingError;
use crate::service::ParkingService;

/// Everything a transition stages once its precondition holds.
pub(crate) struct TransitionPlan {
    pub new_status: SpaceStatus,
    pub reservation: Option<Reservation>,
    pub current_session_id: Option<Uuid>,
    pub action: HistoryAction,
    pub reason: String,
    pub changed_by: ChangedBy,
    /// Reservation snapshot recorded on the history entry (the new one for
    /// a reserve, the cleared one for a cancellation or expiry).
    pub reservation_info: Option<Reservation>,
    /// Side-effect alert committed in the same transaction (sweeper only).
    pub alert: Option<Alert>,
}

impl<S: ParkStore> ParkingService<S> {
    /// Reserve a free space for a plate. The plate is normalized to upper
    /// case; the reservation expires [`carpark_core::RESERVATION_TTL`] after
    /// creation.
    pub async fn reserve(
        &self,
        number: &str,
        plate: &str,
        vehicle_type: VehicleType,
    ) -> Result<ParkingSpace, ParkingError> {
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(ParkingError::Validation("plate must not be empty".to_string()));
        }

        self.apply_transition(number, move |space, now| {
            if space.status != SpaceStatus::Free {
                return Err(ParkingError::InvalidTransition {
                    number: space.number.clone(),
                    reason: format!("space is {}, not free", space.status),
                });
            }
            if vehicle_type != space.vehicle_type {
                return Err(ParkingError::InvalidTransition {
                    number: space.number.clone(),
                    reason: format!(
                        "vehicle type {vehicle_type} does not match space type {}",
                        space.vehicle_type
                    ),
                });
            }

            let reservation = Reservation::new(&plate, vehicle_type, now);
            let reason = format!(
                "Reserved for {} ({}), expires at {}",
                reservation.plate,
                vehicle_type,
                rfc3339(reservation.expires_at)
            );
            Ok(TransitionPlan {
                new_status: SpaceStatus::Reserved,
                reservation: Some(reservation.clone()),
                current_session_id: None,
                action: HistoryAction::Reservation,
                reason,
                changed_by: ChangedBy::User,
                reservation_info: Some(reservation),
                alert: None,
            })
        })
        .await
    }

    /// Occupy a space, clearing any reservation. Any current status is
    /// accepted; an optional session id links the space to its session.
    pub async fn occupy(
        &self,
        number: &str,
        session_id: Option<Uuid>,
        plate: Option<&str>,
        vehicle_type: Option<VehicleType>,
    ) -> Result<ParkingSpace, ParkingError> {
        let plate = plate.map(normalize_plate);
        self.apply_transition(number, move |space, _now| {
            let reason = match &plate {
                Some(p) => format!(
                    "Vehicle arrival - {p} ({})",
                    vehicle_type.unwrap_or(space.vehicle_type)
                ),
                None => "Manual occupation".to_string(),
            };
            Ok(TransitionPlan {
                new_status: SpaceStatus::Occupied,
                reservation: None,
                current_session_id: session_id,
                action: HistoryAction::Occupation,
                reason,
                changed_by: ChangedBy::System,
                reservation_info: None,
                alert: None,
            })
        })
        .await
    }

    /// Free a space, clearing any session link.
    pub async fn release(
        &self,
        number: &str,
        session_id: Option<Uuid>,
    ) -> Result<ParkingSpace, ParkingError> {
        self.apply_transition(number, move |_space, _now| {
            let reason = if session_id.is_some() {
                "Vehicle departure (session)".to_string()
            } else {
                "Manual release".to_string()
            };
            Ok(TransitionPlan {
                new_status: SpaceStatus::Free,
                reservation: None,
                current_session_id: None,
                action: HistoryAction::Liberation,
                reason,
                changed_by: ChangedBy::System,
                reservation_info: None,
                alert: None,
            })
        })
        .await
    }

    /// Cancel an active reservation, freeing the space.
    pub async fn cancel_reservation(&self, number: &str) -> Result<ParkingSpace, ParkingError> {
        self.apply_transition(number, |space, _now| {
            let Some(reservation) = space
                .reservation
                .clone()
                .filter(|_| space.status == SpaceStatus::Reserved)
            else {
                return Err(ParkingError::InvalidTransition {
                    number: space.number.clone(),
                    reason: "no active reservation to cancel".to_string(),
                });
            };
            Ok(TransitionPlan {
                new_status: SpaceStatus::Free,
                reservation: None,
                current_session_id: None,
                action: HistoryAction::ReservationCancelled,
                reason: format!("Reservation cancelled for {}", reservation.plate),
                changed_by: ChangedBy::User,
                reservation_info: Some(reservation),
                alert: None,
            })
        })
        .await
    }

    /// Take a space out of service. Occupied spaces cannot be withdrawn.
    pub async fn set_out_of_service(&self, number: &str) -> Result<ParkingSpace, ParkingError> {
        self.apply_transition(number, |space, _now| {
            if space.status == SpaceStatus::Occupied {
                return Err(ParkingError::InvalidTransition {
                    number: space.number.clone(),
                    reason: "cannot take an occupied space out of service".to_string(),
                });
            }
            Ok(TransitionPlan {
                new_status: SpaceStatus::OutOfService,
                reservation: None,
                current_session_id: None,
                action: HistoryAction::OutOfService,
                reason: "Marked out of service".to_string(),
                changed_by: ChangedBy::User,
                reservation_info: None,
                alert: None,
            })
        })
        .await
    }

    /// Return a space to service as free, whatever its current status.
    pub async fn set_in_service(&self, number: &str) -> Result<ParkingSpace, ParkingError> {
        self.apply_transition(number, |_space, _now| {
            Ok(TransitionPlan {
                new_status: SpaceStatus::Free,
                reservation: None,
                current_session_id: None,
                action: HistoryAction::InService,
                reason: "Returned to service".to_string(),
                changed_by: ChangedBy::User,
                reservation_info: None,
                alert: None,
            })
        })
        .await
    }

    /// The shared transition path: read with lock, validate, versioned
    /// update, history append (and optional alert), atomic commit.
    pub(crate) async fn apply_transition(
        &self,
        number: &str,
        plan_for: impl FnOnce(&ParkingSpace, OffsetDateTime) -> Result<TransitionPlan, ParkingError>,
    ) -> Result<ParkingSpace, ParkingError> {
        let now = OffsetDateTime::now_utc();
        let mut txn = self.bounded(self.store.begin_txn()).await?;

        let staged: Result<ParkingSpace, ParkingError> = async {
            let current = self
                .bounded(self.store.get_space_for_update(&mut txn, number))
                .await?;
            let plan = plan_for(&current, now)?;

            let new_version = self
                .bounded(self.store.update_space(
                    &mut txn,
                    number,
                    current.version,
                    SpaceUpdate {
                        status: plan.new_status,
                        reservation: plan.reservation.clone(),
                        current_session_id: plan.current_session_id,
                        updated_at: now,
                    },
                ))
                .await?;

            let entry = HistoryEntry {
                id: Uuid::new_v4(),
                space_number: current.number.clone(),
                previous_status: Some(current.status),
                new_status: plan.new_status,
                action: plan.action,
                reason: plan.reason,
                changed_by: plan.changed_by,
                timestamp: now,
                reservation_info: plan.reservation_info,
                metadata: HistoryMetadata {
                    vehicle_type: current.vehicle_type,
                    zone: current.zone,
                },
            };
            self.bounded(self.store.append_history(&mut txn, entry))
                .await?;

            if let Some(alert) = plan.alert {
                self.bounded(self.store.insert_alert(&mut txn, alert))
                    .await?;
            }

            let mut updated = current;
            updated.status = plan.new_status;
            updated.reservation = plan.reservation;
            updated.current_session_id = plan.current_session_id;
            updated.updated_at = now;
            updated.version = new_version;
            Ok(updated)
        }
        .await;

        match staged {
            Ok(updated) => {
                self.bounded(self.store.commit_txn(txn)).await?;
                Ok(updated)
            }
            Err(e) => {
                let _ = self.store.abort_txn(txn).await;
                Err(e)
            }
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carpark_core::RESERVATION_TTL;
    use carpark_storage::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn lot_of(types: &[(&str, char, VehicleType)]) -> ParkingService<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut txn = store.begin_txn().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let spaces = types
            .iter()
            .map(|(number, zone, vt)| ParkingSpace::new(number.to_string(), *zone, *vt, now))
            .collect();
        store.replace_all_spaces(&mut txn, spaces).await.unwrap();
        store.commit_txn(txn).await.unwrap();
        ParkingService::new(store)
    }

    async fn car_lot() -> ParkingService<MemoryStore> {
        lot_of(&[
            ("A001", 'A', VehicleType::Car),
            ("A002", 'A', VehicleType::Truck),
        ])
        .await
    }

    #[tokio::test]
    async fn reserve_normalizes_plate_and_sets_expiry() {
        let svc = car_lot().await;
        let space = svc.reserve("A001", "ab-123", VehicleType::Car).await.unwrap();

        assert_eq!(space.status, SpaceStatus::Reserved);
        let reservation = space.reservation.expect("reservation attached");
        assert_eq!(reservation.plate, "AB-123");
        assert_eq!(reservation.expires_at, reservation.created_at + RESERVATION_TTL);

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Reservation);
        assert_eq!(history[0].previous_status, Some(SpaceStatus::Free));
        assert_eq!(history[0].new_status, SpaceStatus::Reserved);
        assert_eq!(history[0].changed_by, ChangedBy::User);
        assert_eq!(
            history[0].reservation_info.as_ref().map(|r| r.plate.as_str()),
            Some("AB-123")
        );
    }

    #[tokio::test]
    async fn reserve_non_free_space_fails_without_history() {
        let svc = car_lot().await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();

        let err = svc.reserve("A001", "BB-222", VehicleType::Car).await.unwrap_err();
        assert!(matches!(err, ParkingError::InvalidTransition { .. }));

        // The failed attempt left no trace: still the first reservation,
        // still exactly one history entry.
        let space = svc.get_space("A001").await.unwrap();
        assert_eq!(space.reservation.unwrap().plate, "AA-111");
        assert_eq!(svc.history_for_space("A001", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserve_with_mismatched_vehicle_type_fails() {
        let svc = car_lot().await;
        let err = svc.reserve("A002", "AA-111", VehicleType::Car).await.unwrap_err();
        assert!(matches!(err, ParkingError::InvalidTransition { .. }));
        assert!(svc.history_for_space("A002", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reserve_rejects_blank_plate() {
        let svc = car_lot().await;
        assert!(matches!(
            svc.reserve("A001", "   ", VehicleType::Car).await,
            Err(ParkingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn occupy_reserved_space_clears_reservation() {
        let svc = car_lot().await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();

        let space = svc.occupy("A001", None, Some("aa-111"), None).await.unwrap();
        assert_eq!(space.status, SpaceStatus::Occupied);
        assert!(space.reservation.is_none());

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Occupation);
        assert_eq!(history[0].previous_status, Some(SpaceStatus::Reserved));
        assert_eq!(history[0].reason, "Vehicle arrival - AA-111 (car)");
    }

    #[tokio::test]
    async fn occupy_links_session_and_release_clears_it() {
        let svc = car_lot().await;
        let session_id = Uuid::new_v4();

        let space = svc.occupy("A001", Some(session_id), None, None).await.unwrap();
        assert_eq!(space.current_session_id, Some(session_id));

        let space = svc.release("A001", Some(session_id)).await.unwrap();
        assert_eq!(space.status, SpaceStatus::Free);
        assert_eq!(space.current_session_id, None);

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history[0].action, HistoryAction::Liberation);
        assert_eq!(history[0].reason, "Vehicle departure (session)");
    }

    #[tokio::test]
    async fn cancel_reservation_frees_and_records_cleared_reservation() {
        let svc = car_lot().await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();

        let space = svc.cancel_reservation("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::Free);
        assert!(space.reservation.is_none());

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history[0].action, HistoryAction::ReservationCancelled);
        assert_eq!(
            history[0].reservation_info.as_ref().map(|r| r.plate.as_str()),
            Some("AA-111")
        );
    }

    #[tokio::test]
    async fn cancel_without_reservation_fails() {
        let svc = car_lot().await;
        assert!(matches!(
            svc.cancel_reservation("A001").await,
            Err(ParkingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn out_of_service_rejected_while_occupied() {
        let svc = car_lot().await;
        svc.occupy("A001", None, None, None).await.unwrap();

        let err = svc.set_out_of_service("A001").await.unwrap_err();
        assert!(matches!(err, ParkingError::InvalidTransition { .. }));
        assert_eq!(svc.get_space("A001").await.unwrap().status, SpaceStatus::Occupied);
    }

    #[tokio::test]
    async fn out_of_service_clears_reservation_and_in_service_restores() {
        let svc = car_lot().await;
        svc.reserve("A001", "AA-111", VehicleType::Car).await.unwrap();

        let space = svc.set_out_of_service("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::OutOfService);
        assert!(space.reservation.is_none());

        let space = svc.set_in_service("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::Free);

        let actions: Vec<HistoryAction> = svc
            .history_for_space("A001", 50)
            .await
            .unwrap()
            .iter()
            .map(|e| e.action)
            .collect();
        // Newest first.
        assert_eq!(
            actions,
            [
                HistoryAction::InService,
                HistoryAction::OutOfService,
                HistoryAction::Reservation
            ]
        );
    }

    #[tokio::test]
    async fn transitions_on_unknown_space_are_not_found() {
        let svc = car_lot().await;
        assert!(matches!(
            svc.reserve("Z999", "AA-111", VehicleType::Car).await,
            Err(ParkingError::SpaceNotFound { .. })
        ));
        assert!(matches!(
            svc.release("Z999", None).await,
            Err(ParkingError::SpaceNotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn racing_reserves_on_one_space_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let svc = ParkingService::new(store);
        svc.generate_with_rng(1, 1, &mut StdRng::seed_from_u64(3))
            .await
            .unwrap();
        let vehicle_type = svc.get_space("A001").await.unwrap().vehicle_type;

        let mut handles = Vec::new();
        for i in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.reserve("A001", &format!("AA-{i:03}"), vehicle_type).await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(ParkingError::InvalidTransition { .. }) => losers += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(losers, 7);

        // One reservation, one non-creation history entry.
        let space = svc.get_space("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::Reserved);
        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history.len(), 2); // creation + the winning reservation
    }
}
