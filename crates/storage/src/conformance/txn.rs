use std::future::Future;

use carpark_core::SpaceStatus;

use super::{make_history, make_space, make_update, seed_spaces, t0, TestResult};
use crate::ParkStore;

pub(super) async fn run_txn_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "txn",
        "staged_update_invisible_before_commit",
        staged_update_invisible_before_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "staged_update_visible_after_commit",
        staged_update_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "aborted_txn_discards_staged_writes",
        aborted_txn_discards_staged_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "dropped_txn_discards_staged_writes",
        dropped_txn_discards_staged_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "txn_reads_its_own_staged_update",
        txn_reads_its_own_staged_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "staged_history_invisible_before_commit",
        staged_history_invisible_before_commit(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// An update staged in an open transaction must not be visible to reads
/// against committed state.
async fn staged_update_invisible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    s.abort_txn(txn).await.map_err(|e| format!("abort: {e}"))?;

    if rec.status != SpaceStatus::Free {
        return Err(format!(
            "uncommitted update leaked: status is {}",
            rec.status
        ));
    }
    Ok(())
}

/// Once committed, the staged update becomes the visible state and the
/// version is bumped.
async fn staged_update_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    let new_version = s
        .update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    if new_version != 1 {
        return Err(format!("expected new version 1, got {new_version}"));
    }
    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Occupied {
        return Err(format!("expected occupied, got {}", rec.status));
    }
    if rec.version != 1 {
        return Err(format!("expected version 1, got {}", rec.version));
    }
    Ok(())
}

/// abort_txn rolls back everything staged in the transaction.
async fn aborted_txn_discards_staged_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.append_history(
        &mut txn,
        make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.abort_txn(txn).await.map_err(|e| format!("abort: {e}"))?;

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Free || rec.version != 0 {
        return Err(format!(
            "abort did not roll back: status {}, version {}",
            rec.status, rec.version
        ));
    }
    let history = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    if !history.is_empty() {
        return Err(format!("aborted history leaked: {} entries", history.len()));
    }
    Ok(())
}

/// A transaction dropped without commit must act as aborted.
async fn dropped_txn_discards_staged_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    {
        let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
        s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
            .await
            .map_err(|e| format!("update: {e}"))?;
        drop(txn);
    }

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Free {
        return Err(format!(
            "dropped txn leaked a write: status is {}",
            rec.status
        ));
    }
    Ok(())
}

/// Within a transaction, get_space_for_update observes that transaction's
/// own staged writes (read-your-writes).
async fn txn_reads_its_own_staged_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let rec = s
        .get_space_for_update(&mut txn, "A001")
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    s.abort_txn(txn).await.map_err(|e| format!("abort: {e}"))?;

    if rec.status != SpaceStatus::Reserved {
        return Err(format!(
            "expected own staged write to be visible, got {}",
            rec.status
        ));
    }
    if rec.version != 1 {
        return Err(format!("expected effective version 1, got {}", rec.version));
    }
    Ok(())
}

/// History appended in an open transaction must not be readable until commit.
async fn staged_history_invisible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.append_history(
        &mut txn,
        make_history("A001", SpaceStatus::Free, SpaceStatus::Occupied),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;

    let before = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;
    let after = s
        .history_for_space("A001", 10)
        .await
        .map_err(|e| format!("history: {e}"))?;

    if !before.is_empty() {
        return Err(format!(
            "uncommitted history visible: {} entries",
            before.len()
        ));
    }
    if after.len() != 1 {
        return Err(format!("expected 1 entry after commit, got {}", after.len()));
    }
    Ok(())
}
