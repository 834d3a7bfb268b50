//! Session lifecycle: one vehicle occupying one space for a span of time.
//!
//! Starting a session inserts the session record AND occupies its space in
//! one transaction; ending it closes the record and liberates the space the
//! same way. The pairing is atomic: there is never a committed session
//! whose occupation (or liberation) history entry is missing.

use carpark_core::{
    normalize_plate, ChangedBy, HistoryAction, HistoryEntry, HistoryMetadata, Session,
    SessionStatus, SpaceStatus, Vehicle,
};
use carpark_storage::{ParkStore, SessionFilter, SessionUpdate, SpaceUpdate};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ParkingError;
use crate::service::{validate_page, ParkingService, SessionPage};

impl<S: ParkStore> ParkingService<S> {
    /// Start a session: insert the active session and occupy its space,
    /// atomically. The space may be in any status; a reservation on it is
    /// cleared by the occupation.
    pub async fn start_session(
        &self,
        vehicle: Vehicle,
        space_number: &str,
        user_id: &str,
    ) -> Result<Session, ParkingError> {
        let plate = normalize_plate(&vehicle.plate);
        if plate.is_empty() {
            return Err(ParkingError::Validation("plate must not be empty".to_string()));
        }
        if user_id.trim().is_empty() {
            return Err(ParkingError::Validation("userId must not be empty".to_string()));
        }

        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: Uuid::new_v4(),
            vehicle: Vehicle { plate, ..vehicle },
            space_number: space_number.to_string(),
            user_id: user_id.to_string(),
            status: SessionStatus::Active,
            start_time: now,
            end_time: None,
            amount: 0.0,
        };

        let mut txn = self.bounded(self.store.begin_txn()).await?;
        let staged: Result<(), ParkingError> = async {
            let space = self
                .bounded(self.store.get_space_for_update(&mut txn, space_number))
                .await?;

            self.bounded(self.store.insert_session(&mut txn, session.clone()))
                .await?;
            self.bounded(self.store.update_space(
                &mut txn,
                space_number,
                space.version,
                SpaceUpdate {
                    status: SpaceStatus::Occupied,
                    reservation: None,
                    current_session_id: Some(session.id),
                    updated_at: now,
                },
            ))
            .await?;

            let entry = HistoryEntry {
                id: Uuid::new_v4(),
                space_number: space.number.clone(),
                previous_status: Some(space.status),
                new_status: SpaceStatus::Occupied,
                action: HistoryAction::Occupation,
                reason: format!(
                    "Vehicle arrival - {} ({})",
                    session.vehicle.plate, session.vehicle.vehicle_type
                ),
                changed_by: ChangedBy::System,
                timestamp: now,
                reservation_info: None,
                metadata: HistoryMetadata {
                    vehicle_type: space.vehicle_type,
                    zone: space.zone,
                },
            };
            self.bounded(self.store.append_history(&mut txn, entry))
                .await
        }
        .await;

        if let Err(e) = staged {
            let _ = self.store.abort_txn(txn).await;
            return Err(e);
        }
        self.bounded(self.store.commit_txn(txn)).await?;

        tracing::info!(
            session = %session.id,
            space = %space_number,
            plate = %session.vehicle.plate,
            "session started"
        );
        Ok(session)
    }

    /// End an active session and liberate its space, atomically. If the
    /// registry was regenerated underneath the session its space may no
    /// longer exist; the session still ends and the liberation is skipped.
    pub async fn end_session(
        &self,
        id: Uuid,
        amount: Option<f64>,
    ) -> Result<Session, ParkingError> {
        let mut session = self.bounded(self.store.get_session(id)).await?;
        if session.status == SessionStatus::Ended {
            return Err(ParkingError::Validation(format!("session {id} already ended")));
        }

        let now = OffsetDateTime::now_utc();
        let mut txn = self.bounded(self.store.begin_txn()).await?;
        let staged: Result<(), ParkingError> = async {
            self.bounded(self.store.update_session(
                &mut txn,
                id,
                SessionUpdate {
                    status: SessionStatus::Ended,
                    end_time: Some(now),
                    amount,
                },
            ))
            .await?;

            let space = match self
                .bounded(self.store.get_space_for_update(&mut txn, &session.space_number))
                .await
            {
                Ok(space) => space,
                Err(ParkingError::SpaceNotFound { number }) => {
                    tracing::warn!(
                        session = %id,
                        space = %number,
                        "session's space vanished (registry regenerated); skipping liberation"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            self.bounded(self.store.update_space(
                &mut txn,
                &space.number,
                space.version,
                SpaceUpdate {
                    status: SpaceStatus::Free,
                    reservation: None,
                    current_session_id: None,
                    updated_at: now,
                },
            ))
            .await?;

            let entry = HistoryEntry {
                id: Uuid::new_v4(),
                space_number: space.number.clone(),
                previous_status: Some(space.status),
                new_status: SpaceStatus::Free,
                action: HistoryAction::Liberation,
                reason: "Vehicle departure (session)".to_string(),
                changed_by: ChangedBy::System,
                timestamp: now,
                reservation_info: None,
                metadata: HistoryMetadata {
                    vehicle_type: space.vehicle_type,
                    zone: space.zone,
                },
            };
            self.bounded(self.store.append_history(&mut txn, entry))
                .await
        }
        .await;

        if let Err(e) = staged {
            let _ = self.store.abort_txn(txn).await;
            return Err(e);
        }
        self.bounded(self.store.commit_txn(txn)).await?;

        session.status = SessionStatus::Ended;
        session.end_time = Some(now);
        if let Some(amount) = amount {
            session.amount = amount;
        }
        tracing::info!(session = %id, amount = session.amount, "session ended");
        Ok(session)
    }

    /// Read a session by id.
    pub async fn get_session(&self, id: Uuid) -> Result<Session, ParkingError> {
        self.bounded(self.store.get_session(id)).await
    }

    /// One page of sessions, newest start time first.
    pub async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        page: usize,
        limit: usize,
    ) -> Result<SessionPage, ParkingError> {
        validate_page(page, limit)?;
        let (sessions, total) = self
            .bounded(self.store.list_sessions(
                &SessionFilter {
                    status,
                    ..SessionFilter::default()
                },
                page,
                limit,
            ))
            .await?;
        Ok(SessionPage {
            sessions,
            page,
            limit,
            total,
            pages: total.div_ceil(limit as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carpark_core::{ParkingSpace, VehicleType};
    use carpark_storage::MemoryStore;

    fn vehicle(plate: &str) -> Vehicle {
        Vehicle {
            plate: plate.to_string(),
            vehicle_type: VehicleType::Car,
            model: "Model 3".to_string(),
            color: "blue".to_string(),
        }
    }

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
    async fn start_session_occupies_space_atomically() {
        let svc = lot(&["A001"]).await;
        let session = svc
            .start_session(vehicle("ab-123"), "A001", "user-7")
            .await
            .unwrap();

        assert_eq!(session.vehicle.plate, "AB-123");
        assert_eq!(session.status, SessionStatus::Active);

        let space = svc.get_space("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::Occupied);
        assert_eq!(space.current_session_id, Some(session.id));

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Occupation);
        assert_eq!(history[0].reason, "Vehicle arrival - AB-123 (car)");
    }

    #[tokio::test]
    async fn start_session_on_unknown_space_stores_nothing() {
        let svc = lot(&["A001"]).await;
        let err = svc
            .start_session(vehicle("AB-123"), "Z999", "user-7")
            .await
            .unwrap_err();
        assert!(matches!(err, ParkingError::SpaceNotFound { .. }));

        let page = svc.list_sessions(None, 1, 10).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn end_session_frees_space_and_settles_amount() {
        let svc = lot(&["A001"]).await;
        let session = svc
            .start_session(vehicle("AB-123"), "A001", "user-7")
            .await
            .unwrap();

        let ended = svc.end_session(session.id, Some(12.5)).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.end_time.is_some());
        assert_eq!(ended.amount, 12.5);

        let space = svc.get_space("A001").await.unwrap();
        assert_eq!(space.status, SpaceStatus::Free);
        assert_eq!(space.current_session_id, None);

        let history = svc.history_for_space("A001", 50).await.unwrap();
        assert_eq!(history[0].action, HistoryAction::Liberation);

        // The stored record matches what the call returned.
        let stored = svc.get_session(session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);
        assert_eq!(stored.amount, 12.5);
    }

    #[tokio::test]
    async fn end_session_twice_is_a_validation_error() {
        let svc = lot(&["A001"]).await;
        let session = svc
            .start_session(vehicle("AB-123"), "A001", "user-7")
            .await
            .unwrap();
        svc.end_session(session.id, None).await.unwrap();

        assert!(matches!(
            svc.end_session(session.id, None).await,
            Err(ParkingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn end_session_survives_registry_regeneration() {
        let svc = lot(&["B001"]).await;
        let session = svc
            .start_session(vehicle("AB-123"), "B001", "user-7")
            .await
            .unwrap();

        // Regenerate underneath the live session: the new single-zone lot
        // only has A-numbered spaces, so B001 is gone and the liberation is
        // skipped.
        use rand::SeedableRng;
        svc.generate_with_rng(2, 1, &mut rand::rngs::StdRng::seed_from_u64(5))
            .await
            .unwrap();

        let ended = svc.end_session(session.id, None).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(matches!(
            svc.get_space("B001").await,
            Err(ParkingError::SpaceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_sessions_filters_by_status_and_paginates() {
        let svc = lot(&["A001", "A002", "A003"]).await;
        let s1 = svc
            .start_session(vehicle("AA-001"), "A001", "user-1")
            .await
            .unwrap();
        svc.start_session(vehicle("AA-002"), "A002", "user-1")
            .await
            .unwrap();
        svc.start_session(vehicle("AA-003"), "A003", "user-2")
            .await
            .unwrap();
        svc.end_session(s1.id, None).await.unwrap();

        let active = svc
            .list_sessions(Some(SessionStatus::Active), 1, 10)
            .await
            .unwrap();
        assert_eq!(active.total, 2);

        let all = svc.list_sessions(None, 1, 2).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.pages, 2);
        assert_eq!(all.sessions.len(), 2);
    }

    #[tokio::test]
    async fn session_input_is_validated() {
        let svc = lot(&["A001"]).await;
        assert!(matches!(
            svc.start_session(vehicle("  "), "A001", "user-1").await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.start_session(vehicle("AB-123"), "A001", " ").await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.get_session(Uuid::new_v4()).await,
            Err(ParkingError::SessionNotFound { .. })
        ));
    }
}
