//! Conformance test suite for `ParkStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `ParkStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Initialization**: registry replacement, read-back, ordering
//! - **Transaction isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-record transactions
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Queries**: history/alert/session ordering, filtering, pagination
//! - **Error handling**: correct error variants for missing records
//! - **Concurrency**: racing writers, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store instance for each test:
//!
//! ```ignore
//! use carpark_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod init;
mod occ;
mod query;
mod txn;

use std::fmt;
use std::future::Future;

use carpark_core::{
    Alert, AlertPriority, ChangedBy, HistoryAction, HistoryEntry, HistoryMetadata, ParkingSpace,
    Session, SessionStatus, SpaceStatus, Vehicle, VehicleType,
};
use time::macros::datetime;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::record::SpaceUpdate;
use crate::ParkStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "txn", "commit").
    pub category: String,
    /// Test name (e.g. "replace_all_spaces_visible_after_commit").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(txn::run_txn_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(occ::run_occ_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn t0() -> OffsetDateTime {
    datetime!(2026-01-01 00:00 UTC)
}

fn make_space(number: &str, zone: char) -> ParkingSpace {
    ParkingSpace::new(number.to_string(), zone, VehicleType::Car, t0())
}

fn make_update(status: SpaceStatus, at: OffsetDateTime) -> SpaceUpdate {
    SpaceUpdate {
        status,
        reservation: None,
        current_session_id: None,
        updated_at: at,
    }
}

fn make_history(space_number: &str, from: SpaceStatus, to: SpaceStatus) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4(),
        space_number: space_number.to_string(),
        previous_status: Some(from),
        new_status: to,
        action: HistoryAction::Occupation,
        reason: "conformance".to_string(),
        changed_by: ChangedBy::System,
        timestamp: t0(),
        reservation_info: None,
        metadata: HistoryMetadata {
            vehicle_type: VehicleType::Car,
            zone: 'A',
        },
    }
}

fn make_alert(title: &str) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        alert_type: "reservation_expired".to_string(),
        title: title.to_string(),
        message: "conformance".to_string(),
        timestamp: t0(),
        read: false,
        priority: AlertPriority::Low,
        data: serde_json::json!({}),
    }
}

fn make_session(space_number: &str, user_id: &str, start: OffsetDateTime) -> Session {
    Session {
        id: Uuid::new_v4(),
        vehicle: Vehicle {
            plate: "AA-000".to_string(),
            vehicle_type: VehicleType::Car,
            model: String::new(),
            color: String::new(),
        },
        space_number: space_number.to_string(),
        user_id: user_id.to_string(),
        status: SessionStatus::Active,
        start_time: start,
        end_time: None,
        amount: 0.0,
    }
}

/// Seed a store with the given spaces through a committed transaction.
async fn seed_spaces<S: ParkStore>(store: &S, spaces: Vec<ParkingSpace>) -> Result<(), String> {
    let mut txn = store.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    store
        .replace_all_spaces(&mut txn, spaces)
        .await
        .map_err(|e| format!("replace: {e}"))?;
    store
        .commit_txn(txn)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
