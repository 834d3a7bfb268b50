use std::future::Future;

use carpark_core::{SessionStatus, SpaceStatus};
use uuid::Uuid;

use super::{make_space, make_update, seed_spaces, t0, TestResult};
use crate::record::{SessionUpdate, SpaceFilter};
use crate::{ParkStore, StoreError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_space_nonexistent",
        get_space_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "space_not_found_carries_number",
        space_not_found_carries_number(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_space_for_update_nonexistent",
        get_space_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_space_nonexistent",
        update_space_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_session_nonexistent",
        get_session_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_session_nonexistent",
        update_session_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "mark_alert_read_nonexistent",
        mark_alert_read_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "empty_queries_return_empty_not_error",
        empty_queries_return_empty_not_error(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// get_space on an empty store returns SpaceNotFound.
async fn get_space_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_space("A001").await {
        Err(StoreError::SpaceNotFound { .. }) => Ok(()),
        other => Err(format!("expected SpaceNotFound, got {other:?}")),
    }
}

/// SpaceNotFound names the missing space.
async fn space_not_found_carries_number<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;
    match s.get_space("Z999").await {
        Err(StoreError::SpaceNotFound { number }) => {
            if number != "Z999" {
                return Err(format!("expected number \"Z999\", got \"{number}\""));
            }
            Ok(())
        }
        other => Err(format!("expected SpaceNotFound, got {other:?}")),
    }
}

/// get_space_for_update on a missing number also returns SpaceNotFound.
async fn get_space_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut txn = s.begin_txn().await.map_err(|e| e.to_string())?;
    let result = s.get_space_for_update(&mut txn, "A001").await;
    let _ = s.abort_txn(txn).await;
    match result {
        Err(StoreError::SpaceNotFound { .. }) => Ok(()),
        other => Err(format!("expected SpaceNotFound, got {other:?}")),
    }
}

/// update_space on a missing number returns SpaceNotFound, not Conflict.
async fn update_space_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut txn = s.begin_txn().await.map_err(|e| e.to_string())?;
    let result = s
        .update_space(
            &mut txn,
            "A001",
            0,
            make_update(SpaceStatus::Occupied, t0()),
        )
        .await;
    let _ = s.abort_txn(txn).await;
    match result {
        Err(StoreError::SpaceNotFound { .. }) => Ok(()),
        other => Err(format!("expected SpaceNotFound, got {other:?}")),
    }
}

/// get_session for an unknown id returns SessionNotFound carrying that id.
async fn get_session_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let missing = Uuid::new_v4();
    match s.get_session(missing).await {
        Err(StoreError::SessionNotFound { id }) => {
            if id != missing {
                return Err(format!("expected id {missing}, got {id}"));
            }
            Ok(())
        }
        other => Err(format!("expected SessionNotFound, got {other:?}")),
    }
}

/// update_session for an unknown id returns SessionNotFound.
async fn update_session_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut txn = s.begin_txn().await.map_err(|e| e.to_string())?;
    let result = s
        .update_session(
            &mut txn,
            Uuid::new_v4(),
            SessionUpdate {
                status: SessionStatus::Ended,
                end_time: Some(t0()),
                amount: None,
            },
        )
        .await;
    let _ = s.abort_txn(txn).await;
    match result {
        Err(StoreError::SessionNotFound { .. }) => Ok(()),
        other => Err(format!("expected SessionNotFound, got {other:?}")),
    }
}

/// mark_alert_read for an unknown id returns AlertNotFound.
async fn mark_alert_read_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut txn = s.begin_txn().await.map_err(|e| e.to_string())?;
    let result = s.mark_alert_read(&mut txn, Uuid::new_v4()).await;
    let _ = s.abort_txn(txn).await;
    match result {
        Err(StoreError::AlertNotFound { .. }) => Ok(()),
        other => Err(format!("expected AlertNotFound, got {other:?}")),
    }
}

/// List-shaped reads on an empty store succeed with empty results.
async fn empty_queries_return_empty_not_error<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let spaces = s
        .list_spaces(&SpaceFilter::default())
        .await
        .map_err(|e| format!("list_spaces: {e}"))?;
    if !spaces.is_empty() {
        return Err(format!("expected no spaces, got {}", spaces.len()));
    }

    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history_for_space: {e}"))?;
    if !history.is_empty() {
        return Err(format!("expected no history, got {}", history.len()));
    }

    let (entries, total) = s
        .list_history(1, 10)
        .await
        .map_err(|e| format!("list_history: {e}"))?;
    if !entries.is_empty() || total != 0 {
        return Err(format!("expected empty history page, got {total} total"));
    }

    let alerts = s
        .list_alerts(10)
        .await
        .map_err(|e| format!("list_alerts: {e}"))?;
    if !alerts.is_empty() {
        return Err(format!("expected no alerts, got {}", alerts.len()));
    }

    Ok(())
}
