//! In-memory `ParkStore` backend.
//!
//! Tables live behind a single async mutex; the critical sections never
//! hold the lock across an await. Transactions stage their writes in a
//! [`MemoryTxn`] op log. `update_space` validates the expected version
//! against the transaction's effective view when it is called, and
//! `commit_txn` re-validates the whole log under the table lock before
//! applying anything, so of a set of racing transactions exactly one wins
//! and the losers leave no trace.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use carpark_core::{Alert, HistoryEntry, ParkingSpace, Session};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{SessionFilter, SessionUpdate, SpaceFilter, SpaceUpdate};
use crate::traits::ParkStore;

/// In-memory backend. Cheap to clone handles via `Arc` at the call site;
/// the store itself owns the tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    /// Keyed by space number; BTreeMap iteration gives number-ascending order.
    spaces: BTreeMap<String, ParkingSpace>,
    /// Append order; newest entries at the end.
    history: Vec<HistoryEntry>,
    alerts: Vec<Alert>,
    sessions: Vec<Session>,
}

/// Staged write log for one in-flight transaction. Dropping it uncommitted
/// discards every staged op.
pub struct MemoryTxn {
    ops: Vec<WriteOp>,
}

enum WriteOp {
    ReplaceAllSpaces(Vec<ParkingSpace>),
    UpdateSpace {
        number: String,
        expected_version: i64,
        update: SpaceUpdate,
    },
    AppendHistory(HistoryEntry),
    InsertAlert(Alert),
    MarkAlertRead(Uuid),
    InsertSession(Session),
    UpdateSession { id: Uuid, update: SessionUpdate },
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The committed record for `number` overlaid with the ops already staged
/// in this transaction, so a transaction reads its own writes.
fn effective_space(tables: &Tables, ops: &[WriteOp], number: &str) -> Option<ParkingSpace> {
    let mut current = tables.spaces.get(number).cloned();
    for op in ops {
        match op {
            WriteOp::ReplaceAllSpaces(spaces) => {
                current = spaces.iter().find(|s| s.number == number).cloned();
            }
            WriteOp::UpdateSpace {
                number: n, update, ..
            } if n == number => {
                if let Some(space) = current.as_mut() {
                    apply_space_update(space, update);
                }
            }
            _ => {}
        }
    }
    current
}

fn apply_space_update(space: &mut ParkingSpace, update: &SpaceUpdate) {
    space.status = update.status;
    space.reservation = update.reservation.clone();
    space.current_session_id = update.current_session_id;
    space.updated_at = update.updated_at;
    space.version += 1;
}

fn apply_session_update(session: &mut Session, update: &SessionUpdate) {
    session.status = update.status;
    session.end_time = update.end_time;
    if let Some(amount) = update.amount {
        session.amount = amount;
    }
}

/// Check that every staged op still applies against the current tables.
/// Runs under the table lock immediately before [`apply`], so a passing
/// validation cannot be invalidated by another writer.
fn validate(tables: &Tables, ops: &[WriteOp]) -> Result<(), StoreError> {
    // Effective space versions as the op log replays: either from the last
    // staged ReplaceAllSpaces or from the committed table, plus one bump per
    // staged update.
    let mut replaced: Option<HashMap<String, i64>> = None;
    let mut bumps: HashMap<String, i64> = HashMap::new();
    let mut staged_alerts: HashSet<Uuid> = HashSet::new();
    let mut staged_sessions: HashSet<Uuid> = HashSet::new();

    for op in ops {
        match op {
            WriteOp::ReplaceAllSpaces(spaces) => {
                replaced = Some(spaces.iter().map(|s| (s.number.clone(), s.version)).collect());
                bumps.clear();
            }
            WriteOp::UpdateSpace {
                number,
                expected_version,
                ..
            } => {
                let base = match &replaced {
                    Some(map) => map.get(number).copied(),
                    None => tables.spaces.get(number).map(|s| s.version),
                };
                let Some(base) = base else {
                    return Err(StoreError::SpaceNotFound {
                        number: number.clone(),
                    });
                };
                let effective = base + bumps.get(number).copied().unwrap_or(0);
                if effective != *expected_version {
                    return Err(StoreError::Conflict {
                        number: number.clone(),
                        expected_version: *expected_version,
                    });
                }
                *bumps.entry(number.clone()).or_insert(0) += 1;
            }
            WriteOp::MarkAlertRead(id) => {
                let exists =
                    staged_alerts.contains(id) || tables.alerts.iter().any(|a| a.id == *id);
                if !exists {
                    return Err(StoreError::AlertNotFound { id: *id });
                }
            }
            WriteOp::UpdateSession { id, .. } => {
                let exists =
                    staged_sessions.contains(id) || tables.sessions.iter().any(|s| s.id == *id);
                if !exists {
                    return Err(StoreError::SessionNotFound { id: *id });
                }
            }
            WriteOp::InsertAlert(alert) => {
                staged_alerts.insert(alert.id);
            }
            WriteOp::InsertSession(session) => {
                staged_sessions.insert(session.id);
            }
            WriteOp::AppendHistory(_) => {}
        }
    }

    Ok(())
}

/// Apply a validated op log in order. Only reachable after [`validate`]
/// under the same lock hold, so lookups cannot miss; a miss is reported as
/// a backend error rather than panicking.
fn apply(tables: &mut Tables, ops: Vec<WriteOp>) -> Result<(), StoreError> {
    for op in ops {
        match op {
            WriteOp::ReplaceAllSpaces(spaces) => {
                tables.spaces = spaces.into_iter().map(|s| (s.number.clone(), s)).collect();
            }
            WriteOp::UpdateSpace { number, update, .. } => {
                let space = tables.spaces.get_mut(&number).ok_or_else(|| {
                    StoreError::Backend(format!("validated update lost space {number}"))
                })?;
                apply_space_update(space, &update);
            }
            WriteOp::AppendHistory(entry) => tables.history.push(entry),
            WriteOp::InsertAlert(alert) => tables.alerts.push(alert),
            WriteOp::MarkAlertRead(id) => {
                let alert = tables
                    .alerts
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or(StoreError::AlertNotFound { id })?;
                alert.read = true;
            }
            WriteOp::InsertSession(session) => tables.sessions.push(session),
            WriteOp::UpdateSession { id, update } => {
                let session = tables
                    .sessions
                    .iter_mut()
                    .find(|s| s.id == id)
                    .ok_or(StoreError::SessionNotFound { id })?;
                apply_session_update(session, &update);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ParkStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin_txn(&self) -> Result<MemoryTxn, StoreError> {
        Ok(MemoryTxn { ops: Vec::new() })
    }

    async fn commit_txn(&self, txn: MemoryTxn) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        validate(&tables, &txn.ops)?;
        apply(&mut tables, txn.ops)
    }

    async fn abort_txn(&self, txn: MemoryTxn) -> Result<(), StoreError> {
        drop(txn);
        Ok(())
    }

    async fn replace_all_spaces(
        &self,
        txn: &mut MemoryTxn,
        spaces: Vec<ParkingSpace>,
    ) -> Result<(), StoreError> {
        txn.ops.push(WriteOp::ReplaceAllSpaces(spaces));
        Ok(())
    }

    async fn get_space_for_update(
        &self,
        txn: &mut MemoryTxn,
        number: &str,
    ) -> Result<ParkingSpace, StoreError> {
        let tables = self.tables.lock().await;
        effective_space(&tables, &txn.ops, number).ok_or_else(|| StoreError::SpaceNotFound {
            number: number.to_string(),
        })
    }

    async fn update_space(
        &self,
        txn: &mut MemoryTxn,
        number: &str,
        expected_version: i64,
        update: SpaceUpdate,
    ) -> Result<i64, StoreError> {
        // Early conflict detection against the transaction's effective view.
        // The authoritative check re-runs at commit under the table lock.
        let tables = self.tables.lock().await;
        let current =
            effective_space(&tables, &txn.ops, number).ok_or_else(|| StoreError::SpaceNotFound {
                number: number.to_string(),
            })?;
        drop(tables);

        if current.version != expected_version {
            return Err(StoreError::Conflict {
                number: number.to_string(),
                expected_version,
            });
        }

        txn.ops.push(WriteOp::UpdateSpace {
            number: number.to_string(),
            expected_version,
            update,
        });
        Ok(expected_version + 1)
    }

    async fn append_history(
        &self,
        txn: &mut MemoryTxn,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        txn.ops.push(WriteOp::AppendHistory(entry));
        Ok(())
    }

    async fn insert_alert(&self, txn: &mut MemoryTxn, alert: Alert) -> Result<(), StoreError> {
        txn.ops.push(WriteOp::InsertAlert(alert));
        Ok(())
    }

    async fn mark_alert_read(&self, txn: &mut MemoryTxn, id: Uuid) -> Result<(), StoreError> {
        let tables = self.tables.lock().await;
        let staged = txn.ops.iter().any(|op| match op {
            WriteOp::InsertAlert(a) => a.id == id,
            _ => false,
        });
        if !staged && !tables.alerts.iter().any(|a| a.id == id) {
            return Err(StoreError::AlertNotFound { id });
        }
        drop(tables);

        txn.ops.push(WriteOp::MarkAlertRead(id));
        Ok(())
    }

    async fn insert_session(
        &self,
        txn: &mut MemoryTxn,
        session: Session,
    ) -> Result<(), StoreError> {
        txn.ops.push(WriteOp::InsertSession(session));
        Ok(())
    }

    async fn update_session(
        &self,
        txn: &mut MemoryTxn,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<(), StoreError> {
        let tables = self.tables.lock().await;
        let staged = txn.ops.iter().any(|op| match op {
            WriteOp::InsertSession(s) => s.id == id,
            _ => false,
        });
        if !staged && !tables.sessions.iter().any(|s| s.id == id) {
            return Err(StoreError::SessionNotFound { id });
        }
        drop(tables);

        txn.ops.push(WriteOp::UpdateSession { id, update });
        Ok(())
    }

    async fn get_space(&self, number: &str) -> Result<ParkingSpace, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .spaces
            .get(number)
            .cloned()
            .ok_or_else(|| StoreError::SpaceNotFound {
                number: number.to_string(),
            })
    }

    async fn list_spaces(&self, filter: &SpaceFilter) -> Result<Vec<ParkingSpace>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .spaces
            .values()
            .filter(|s| filter.zone.map_or(true, |z| s.zone == z))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .cloned()
            .collect())
    }

    async fn history_for_space(
        &self,
        number: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .history
            .iter()
            .rev()
            .filter(|e| e.space_number == number)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_history(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<HistoryEntry>, u64), StoreError> {
        let tables = self.tables.lock().await;
        let total = tables.history.len() as u64;
        let entries = tables
            .history
            .iter()
            .rev()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();
        Ok((entries, total))
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::SessionNotFound { id })
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Session>, u64), StoreError> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<&Session> = tables
            .sessions
            .iter()
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| filter.user_id.as_deref().map_or(true, |u| s.user_id == u))
            .filter(|s| filter.started_after.map_or(true, |t| s.start_time >= t))
            .collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let total = matching.len() as u64;
        let sessions = matching
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();
        Ok((sessions, total))
    }
}
