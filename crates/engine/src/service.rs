//! The parking engine service.
//!
//! [`ParkingService`] owns nothing but a handle to a [`ParkStore`]; all
//! state lives in the store and every mutation goes through a store
//! transaction. The service is constructed once at process startup with an
//! explicitly injected store handle and shared behind an `Arc` by the API
//! layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use carpark_core::{
    generate_layout, Alert, ChangedBy, HistoryAction, HistoryEntry, HistoryMetadata, ParkingSpace,
    SessionStatus, SpaceStatus,
};
use carpark_storage::{ParkStore, SessionFilter, SpaceFilter, StoreError};
use rand::{Rng, SeedableRng};
use serde::Serialize;
use time::{OffsetDateTime, Time};
use uuid::Uuid;

use crate::error::ParkingError;

/// Deadline for a single store round trip.
pub(crate) const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest page size accepted by the paginated queries.
pub const MAX_PAGE_LIMIT: usize = 500;

/// One page of global history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    /// `ceil(total / limit)`.
    pub pages: u64,
}

/// One page of sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<carpark_core::Session>,
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub pages: u64,
}

/// Occupancy counts across the lot, plus session activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingStats {
    pub total: usize,
    pub free: usize,
    pub reserved: usize,
    pub occupied: usize,
    pub out_of_service: usize,
    /// `round(100 * occupied / total)`, 0 for an empty lot.
    pub occupancy_rate: u32,
    pub active_sessions: u64,
    pub sessions_started_today: u64,
}

/// The parking engine: registry, state machine, history recorder, expiry
/// sweeper, and session lifecycle over a [`ParkStore`].
pub struct ParkingService<S: ParkStore> {
    pub(crate) store: Arc<S>,
    pub(crate) store_timeout: Duration,
}

impl<S: ParkStore> Clone for ParkingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            store_timeout: self.store_timeout,
        }
    }
}

impl<S: ParkStore> ParkingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            store_timeout: STORE_TIMEOUT,
        }
    }

    /// Run one store round trip under the configured deadline. A timeout is
    /// a transient store failure, distinct from any transition error.
    pub(crate) async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ParkingError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ParkingError::StoreUnavailable(
                "store operation timed out".to_string(),
            )),
        }
    }

    // ── Space registry ───────────────────────────────────────────────────

    /// Replace the whole lot with a freshly generated layout.
    ///
    /// Atomic: the old registry, the new spaces, and one `creation` history
    /// entry per space land in a single transaction. Existing history,
    /// alerts, and sessions are untouched.
    pub async fn generate(
        &self,
        total_spaces: usize,
        zone_count: usize,
    ) -> Result<Vec<ParkingSpace>, ParkingError> {
        // StdRng rather than ThreadRng: the RNG is held across store awaits
        // and must be Send.
        let mut rng = rand::rngs::StdRng::from_entropy();
        self.generate_with_rng(total_spaces, zone_count, &mut rng)
            .await
    }

    /// [`generate`](Self::generate) with a caller-supplied RNG for the
    /// vehicle-type draw, so tests can seed it.
    pub async fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        total_spaces: usize,
        zone_count: usize,
        rng: &mut R,
    ) -> Result<Vec<ParkingSpace>, ParkingError> {
        let now = OffsetDateTime::now_utc();
        let spaces = generate_layout(total_spaces, zone_count, rng, now)
            .map_err(|e| ParkingError::Validation(e.to_string()))?;

        let mut txn = self.bounded(self.store.begin_txn()).await?;
        let result: Result<(), ParkingError> = async {
            self.bounded(self.store.replace_all_spaces(&mut txn, spaces.clone()))
                .await?;
            for space in &spaces {
                let entry = HistoryEntry {
                    id: Uuid::new_v4(),
                    space_number: space.number.clone(),
                    previous_status: None,
                    new_status: SpaceStatus::Free,
                    action: HistoryAction::Creation,
                    reason: "Space created".to_string(),
                    changed_by: ChangedBy::System,
                    timestamp: now,
                    reservation_info: None,
                    metadata: HistoryMetadata {
                        vehicle_type: space.vehicle_type,
                        zone: space.zone,
                    },
                };
                self.bounded(self.store.append_history(&mut txn, entry))
                    .await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            let _ = self.store.abort_txn(txn).await;
            return Err(e);
        }
        self.bounded(self.store.commit_txn(txn)).await?;

        tracing::info!(
            total = spaces.len(),
            zones = zone_count,
            "parking lot regenerated"
        );
        Ok(spaces)
    }

    /// Read one space.
    pub async fn get_space(&self, number: &str) -> Result<ParkingSpace, ParkingError> {
        self.bounded(self.store.get_space(number)).await
    }

    /// List spaces, optionally filtered by zone and/or status, ordered by
    /// number ascending.
    pub async fn list_spaces(
        &self,
        zone: Option<char>,
        status: Option<SpaceStatus>,
    ) -> Result<Vec<ParkingSpace>, ParkingError> {
        self.bounded(self.store.list_spaces(&SpaceFilter { zone, status }))
            .await
    }

    // ── History recorder queries ─────────────────────────────────────────

    /// History for one space, newest first.
    pub async fn history_for_space(
        &self,
        number: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, ParkingError> {
        validate_limit(limit)?;
        self.bounded(self.store.history_for_space(number, limit))
            .await
    }

    /// One page of the global history, newest first.
    pub async fn history_page(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<HistoryPage, ParkingError> {
        validate_page(page, limit)?;
        let (entries, total) = self.bounded(self.store.list_history(page, limit)).await?;
        Ok(HistoryPage {
            entries,
            page,
            limit,
            total,
            pages: total.div_ceil(limit as u64),
        })
    }

    // ── Alerts ───────────────────────────────────────────────────────────

    /// Most recent alerts, newest first.
    pub async fn alerts(&self, limit: usize) -> Result<Vec<Alert>, ParkingError> {
        validate_limit(limit)?;
        self.bounded(self.store.list_alerts(limit)).await
    }

    /// Mark an alert as read. `read` is the only mutable alert field.
    pub async fn mark_alert_read(&self, id: Uuid) -> Result<(), ParkingError> {
        let mut txn = self.bounded(self.store.begin_txn()).await?;
        if let Err(e) = self.bounded(self.store.mark_alert_read(&mut txn, id)).await {
            let _ = self.store.abort_txn(txn).await;
            return Err(e);
        }
        self.bounded(self.store.commit_txn(txn)).await
    }

    // ── Stats ────────────────────────────────────────────────────────────

    /// Occupancy counts by status plus session activity.
    pub async fn stats(&self) -> Result<ParkingStats, ParkingError> {
        let spaces = self
            .bounded(self.store.list_spaces(&SpaceFilter::default()))
            .await?;

        let total = spaces.len();
        let count = |status: SpaceStatus| spaces.iter().filter(|s| s.status == status).count();
        let occupied = count(SpaceStatus::Occupied);
        let occupancy_rate = if total == 0 {
            0
        } else {
            ((occupied as f64 / total as f64) * 100.0).round() as u32
        };

        let (_, active_sessions) = self
            .bounded(self.store.list_sessions(
                &SessionFilter {
                    status: Some(SessionStatus::Active),
                    ..SessionFilter::default()
                },
                1,
                1,
            ))
            .await?;

        let midnight = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);
        let (_, sessions_started_today) = self
            .bounded(self.store.list_sessions(
                &SessionFilter {
                    started_after: Some(midnight),
                    ..SessionFilter::default()
                },
                1,
                1,
            ))
            .await?;

        Ok(ParkingStats {
            total,
            free: count(SpaceStatus::Free),
            reserved: count(SpaceStatus::Reserved),
            occupied,
            out_of_service: count(SpaceStatus::OutOfService),
            occupancy_rate,
            active_sessions,
            sessions_started_today,
        })
    }
}

pub(crate) fn validate_limit(limit: usize) -> Result<(), ParkingError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ParkingError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_page(page: usize, limit: usize) -> Result<(), ParkingError> {
    if page == 0 {
        return Err(ParkingError::Validation("page must be at least 1".to_string()));
    }
    validate_limit(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpark_storage::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service() -> ParkingService<MemoryStore> {
        ParkingService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn generate_creates_spaces_with_one_creation_entry_each() {
        let svc = service();
        let spaces = svc
            .generate_with_rng(10, 5, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(spaces.len(), 10);

        let listed = svc.list_spaces(None, None).await.unwrap();
        assert_eq!(listed.len(), 10);
        for zone in ['A', 'B', 'C', 'D', 'E'] {
            assert_eq!(listed.iter().filter(|s| s.zone == zone).count(), 2);
        }

        for space in &listed {
            let history = svc.history_for_space(&space.number, 50).await.unwrap();
            assert_eq!(history.len(), 1, "space {}", space.number);
            assert_eq!(history[0].action, HistoryAction::Creation);
            assert_eq!(history[0].previous_status, None);
            assert_eq!(history[0].new_status, SpaceStatus::Free);
            assert_eq!(history[0].changed_by, ChangedBy::System);
        }
    }

    #[tokio::test]
    async fn generate_replaces_previous_registry() {
        let svc = service();
        svc.generate_with_rng(10, 5, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        svc.generate_with_rng(4, 2, &mut StdRng::seed_from_u64(2))
            .await
            .unwrap();

        let listed = svc.list_spaces(None, None).await.unwrap();
        assert_eq!(listed.len(), 4);
        // Creation entries from both generations accumulate: history is
        // append-only and survives regeneration.
        let page = svc.history_page(1, 100).await.unwrap();
        assert_eq!(page.total, 14);
    }

    #[tokio::test]
    async fn generate_rejects_out_of_range_arguments() {
        let svc = service();
        assert!(matches!(
            svc.generate(0, 5).await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.generate(10, 27).await,
            Err(ParkingError::Validation(_))
        ));
        assert!(svc.list_spaces(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_space_unknown_number_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.get_space("Z999").await,
            Err(ParkingError::SpaceNotFound { number }) if number == "Z999"
        ));
    }

    #[tokio::test]
    async fn history_page_computes_page_count() {
        let svc = service();
        svc.generate_with_rng(7, 1, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        let page = svc.history_page(1, 3).await.unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.pages, 3); // ceil(7/3)
        assert_eq!(page.entries.len(), 3);

        let last = svc.history_page(3, 3).await.unwrap();
        assert_eq!(last.entries.len(), 1);
    }

    #[tokio::test]
    async fn history_page_far_past_the_end_is_empty() {
        let svc = service();
        svc.generate_with_rng(3, 1, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        // The largest page number must not overflow the page offset.
        let page = svc.history_page(usize::MAX, MAX_PAGE_LIMIT).await.unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.total, 3);

        let sessions = svc
            .list_sessions(None, usize::MAX, MAX_PAGE_LIMIT)
            .await
            .unwrap();
        assert!(sessions.sessions.is_empty());
        assert_eq!(sessions.total, 0);
    }

    #[tokio::test]
    async fn pagination_arguments_validated() {
        let svc = service();
        assert!(matches!(
            svc.history_page(0, 10).await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.history_page(1, 0).await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.history_for_space("A001", 501).await,
            Err(ParkingError::Validation(_))
        ));
        assert!(matches!(
            svc.alerts(0).await,
            Err(ParkingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn stats_on_empty_lot_are_all_zero() {
        let svc = service();
        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.occupancy_rate, 0);
        assert_eq!(stats.active_sessions, 0);
    }

    #[tokio::test]
    async fn mark_alert_read_unknown_id_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.mark_alert_read(Uuid::new_v4()).await,
            Err(ParkingError::AlertNotFound { .. })
        ));
    }
}
