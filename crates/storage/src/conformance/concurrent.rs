use std::future::Future;
use std::sync::Arc;

use carpark_core::{Reservation, SpaceStatus, VehicleType};

use super::{make_space, make_update, seed_spaces, t0, TestResult};
use crate::record::SpaceUpdate;
use crate::{ParkStore, StoreError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "racing_reserves_exactly_one_wins",
        racing_reserves_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "racing_updates_on_different_spaces_all_succeed",
        racing_updates_on_different_spaces_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "racing_updates_leave_consistent_final_state",
        racing_updates_leave_consistent_final_state(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// N tasks race the reserve-shaped update on the same free space from
/// version 0. Exactly one commit succeeds; the rest get Conflict.
///
/// This exercises real concurrency -- `tokio::spawn` creates parallel tasks
/// that race against the version check, unlike the sequential simulation in
/// the `occ` module.
async fn racing_reserves_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    seed_spaces(store.as_ref(), vec![make_space("A001", 'A')]).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let mut txn = s.begin_txn().await?;
            let update = SpaceUpdate {
                status: SpaceStatus::Reserved,
                reservation: Some(Reservation::new(&format!("AA-{i:03}"), VehicleType::Car, t0())),
                current_session_id: None,
                updated_at: t0(),
            };
            let result = s.update_space(&mut txn, "A001", 0, update).await;
            match result {
                Ok(_new_version) => match s.commit_txn(txn).await {
                    Ok(()) => Ok(true), // won the race
                    Err(StoreError::Conflict { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StoreError::Conflict { .. }) => {
                    s.abort_txn(txn).await?;
                    Ok(false) // lost the race
                }
                Err(e) => {
                    let _ = s.abort_txn(txn).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StoreError| format!("store error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

/// N tasks each update a different space. All succeed -- no false conflicts
/// when there is no contention.
async fn racing_updates_on_different_spaces_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let spaces = (1..=N).map(|i| make_space(&format!("A{i:03}"), 'A')).collect();
    seed_spaces(store.as_ref(), spaces).await?;

    let mut handles = Vec::new();
    for i in 1..=N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let number = format!("A{i:03}");
            let mut txn = s.begin_txn().await?;
            s.update_space(&mut txn, &number, 0, make_update(SpaceStatus::Occupied, t0()))
                .await?;
            s.commit_txn(txn).await?;
            Ok::<(), StoreError>(())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for i in 1..=N {
        let number = format!("A{i:03}");
        let rec = store
            .get_space(&number)
            .await
            .map_err(|e| format!("get {number}: {e}"))?;
        if rec.status != SpaceStatus::Occupied || rec.version != 1 {
            return Err(format!(
                "{number}: expected occupied@1, got {}@{}",
                rec.status, rec.version
            ));
        }
    }
    Ok(())
}

/// After a race on one space, the surviving state is a single winning write:
/// version 1, readable by a non-locking read.
async fn racing_updates_leave_consistent_final_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    seed_spaces(store.as_ref(), vec![make_space("A001", 'A')]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let mut txn = s.begin_txn().await?;
            let result = s
                .update_space(&mut txn, "A001", 0, make_update(SpaceStatus::OutOfService, t0()))
                .await;
            match result {
                Ok(_) => match s.commit_txn(txn).await {
                    Ok(()) | Err(StoreError::Conflict { .. }) => Ok(()),
                    Err(e) => Err(e),
                },
                Err(StoreError::Conflict { .. }) => {
                    s.abort_txn(txn).await?;
                    Ok(())
                }
                Err(e) => {
                    let _ = s.abort_txn(txn).await;
                    Err(e)
                }
            }
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StoreError| format!("store error: {e}"))?;
    }

    let rec = store
        .get_space("A001")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if rec.version != 1 {
        return Err(format!(
            "expected version 1 after single winning update, got {}",
            rec.version
        ));
    }
    if rec.status != SpaceStatus::OutOfService {
        return Err(format!("expected out-of-service, got {}", rec.status));
    }
    Ok(())
}
