use async_trait::async_trait;
use carpark_core::{Alert, HistoryEntry, ParkingSpace, Session};
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{SessionFilter, SessionUpdate, SpaceFilter, SpaceUpdate};

/// The storage trait for carpark backends.
///
/// A `ParkStore` implementation provides transactional storage for parking
/// spaces, their append-only status history, operator alerts, and parking
/// sessions.
///
/// ## Transaction semantics
///
/// All mutating operations take `&mut Self::Txn`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_txn()` -- start a transaction, returns a `Txn`
/// 2. Call mutating methods with `&mut txn`
/// 3. `commit_txn(txn)` -- commit and consume the transaction
///    OR `abort_txn(txn)` -- roll back and consume the transaction
///
/// If a `Txn` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// ## OCC conflict detection
///
/// `update_space` is conditional on `version == expected_version`. A stale
/// expected version yields `Err(StoreError::Conflict)` -- either at the call
/// itself or, when a racing transaction commits first, at `commit_txn`.
/// Exactly one of a set of racing writers wins.
///
/// ## History coupling
///
/// The history entry for a transition must be appended in the SAME
/// transaction as its `update_space` call. No state change without a
/// history record.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` to be shared behind an
/// `Arc` across async task boundaries.
#[async_trait]
pub trait ParkStore: Send + Sync + 'static {
    /// The transaction type used by this backend. Must be `Send` to allow
    /// passing across await points.
    type Txn: Send;

    // ── Transaction lifecycle ─────────────────────────────────────────────────

    /// Begin a new transaction.
    async fn begin_txn(&self) -> Result<Self::Txn, StoreError>;

    /// Commit a transaction, making all staged mutations durable atomically.
    ///
    /// Re-validates every staged version check; a lost race surfaces here as
    /// `StoreError::Conflict` and nothing is applied.
    async fn commit_txn(&self, txn: Self::Txn) -> Result<(), StoreError>;

    /// Abort a transaction, discarding all staged mutations.
    async fn abort_txn(&self, txn: Self::Txn) -> Result<(), StoreError>;

    // ── Space operations (within a transaction) ───────────────────────────────

    /// Atomically replace the whole registry with a fresh set of spaces.
    ///
    /// History, alerts, and sessions are untouched.
    async fn replace_all_spaces(
        &self,
        txn: &mut Self::Txn,
        spaces: Vec<ParkingSpace>,
    ) -> Result<(), StoreError>;

    /// Read a space's current record ahead of a versioned update.
    ///
    /// Returns `Err(StoreError::SpaceNotFound)` if the space does not exist.
    async fn get_space_for_update(
        &self,
        txn: &mut Self::Txn,
        number: &str,
    ) -> Result<ParkingSpace, StoreError>;

    /// Apply a version-validated update to a space (OCC).
    ///
    /// Conditional on `version == expected_version`; a mismatch returns
    /// `Err(StoreError::Conflict)`. Returns the new version on success.
    async fn update_space(
        &self,
        txn: &mut Self::Txn,
        number: &str,
        expected_version: i64,
        update: SpaceUpdate,
    ) -> Result<i64, StoreError>;

    // ── Recording operations (within a transaction) ───────────────────────────

    /// Append a history entry. Append-only; the store never validates the
    /// transition it describes.
    async fn append_history(
        &self,
        txn: &mut Self::Txn,
        entry: HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Insert an operator alert.
    async fn insert_alert(&self, txn: &mut Self::Txn, alert: Alert) -> Result<(), StoreError>;

    /// Flip an alert's `read` flag to true.
    ///
    /// Returns `Err(StoreError::AlertNotFound)` if the alert does not exist.
    async fn mark_alert_read(&self, txn: &mut Self::Txn, id: Uuid) -> Result<(), StoreError>;

    /// Insert a new session.
    async fn insert_session(
        &self,
        txn: &mut Self::Txn,
        session: Session,
    ) -> Result<(), StoreError>;

    /// Update a session's mutable fields.
    ///
    /// Returns `Err(StoreError::SessionNotFound)` if the session does not exist.
    async fn update_session(
        &self,
        txn: &mut Self::Txn,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<(), StoreError>;

    // ── Query operations (outside transactions, committed state) ──────────────

    /// Read a space without locking.
    ///
    /// Returns `Err(StoreError::SpaceNotFound)` if the space does not exist.
    async fn get_space(&self, number: &str) -> Result<ParkingSpace, StoreError>;

    /// List spaces matching the filter, ordered by number ascending.
    async fn list_spaces(&self, filter: &SpaceFilter) -> Result<Vec<ParkingSpace>, StoreError>;

    /// History entries for one space, newest first, at most `limit`.
    async fn history_for_space(
        &self,
        number: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    /// One page of the global history, newest first, with the total entry
    /// count. `page` is 1-based.
    async fn list_history(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<HistoryEntry>, u64), StoreError>;

    /// Most recent alerts, newest first, at most `limit`.
    async fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Read a session by id.
    ///
    /// Returns `Err(StoreError::SessionNotFound)` if the session does not exist.
    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError>;

    /// One page of sessions matching the filter, newest start time first,
    /// with the total matching count. `page` is 1-based.
    async fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Session>, u64), StoreError>;
}
