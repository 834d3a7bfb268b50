use std::future::Future;

use carpark_core::SpaceStatus;

use super::{make_space, make_update, seed_spaces, t0, TestResult};
use crate::{ParkStore, StoreError};

pub(super) async fn run_occ_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "occ",
        "stale_expected_version_rejected_at_update",
        stale_expected_version_rejected_at_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "occ",
        "stale_txn_rejected_at_commit",
        stale_txn_rejected_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "occ",
        "conflict_carries_number_and_expected_version",
        conflict_carries_number_and_expected_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "occ",
        "sequential_updates_chain_versions",
        sequential_updates_chain_versions(factory).await,
    ));
    results.push(TestResult::from_result(
        "occ",
        "replace_all_resets_versions_to_zero",
        replace_all_resets_versions_to_zero(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// An update staged against a version the space has already moved past must
/// be rejected when the store can see the mismatch at call time.
async fn stale_expected_version_rejected_at_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    // Move the space to version 1.
    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    // A writer still expecting version 0 must see a conflict.
    let mut stale = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    let result = s
        .update_space(&mut stale, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await;
    let _ = s.abort_txn(stale).await;
    match result {
        Err(StoreError::Conflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected Conflict, got: {e}")),
        Ok(v) => Err(format!("stale update accepted, new version {v}")),
    }
}

/// When both writers read version 0 before either commits, the mismatch is
/// only detectable at commit: the second committer must get Conflict there.
async fn stale_txn_rejected_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let mut first = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    let mut second = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;

    s.update_space(&mut first, "A001", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("first update: {e}"))?;
    s.update_space(&mut second, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("second update: {e}"))?;

    s.commit_txn(first)
        .await
        .map_err(|e| format!("first commit: {e}"))?;
    match s.commit_txn(second).await {
        Err(StoreError::Conflict { .. }) => {}
        Err(e) => return Err(format!("expected Conflict, got: {e}")),
        Ok(()) => return Err("second commit unexpectedly succeeded".to_string()),
    }

    // First committer's write is the surviving state.
    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.status != SpaceStatus::Reserved || rec.version != 1 {
        return Err(format!(
            "expected reserved@1, got {}@{}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

/// The Conflict variant must identify the contested space and the version
/// the loser expected.
async fn conflict_carries_number_and_expected_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("B007", 'B')]).await?;

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "B007", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    let mut stale = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    let result = s
        .update_space(&mut stale, "B007", 0, make_update(SpaceStatus::Free, t0()))
        .await;
    let _ = s.abort_txn(stale).await;
    match result {
        Err(StoreError::Conflict {
            number,
            expected_version,
        }) => {
            if number != "B007" {
                return Err(format!("expected number \"B007\", got \"{number}\""));
            }
            if expected_version != 0 {
                return Err(format!("expected expected_version 0, got {expected_version}"));
            }
            Ok(())
        }
        other => Err(format!("expected Conflict, got {other:?}")),
    }
}

/// Committed updates bump the version by exactly one each time, and the
/// bumped version is what the next writer must present.
async fn sequential_updates_chain_versions<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    let transitions = [
        SpaceStatus::Reserved,
        SpaceStatus::Occupied,
        SpaceStatus::Free,
    ];
    for (i, status) in transitions.into_iter().enumerate() {
        let expected = i as i64;
        let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
        let new_version = s
            .update_space(&mut txn, "A001", expected, make_update(status, t0()))
            .await
            .map_err(|e| format!("update {i}: {e}"))?;
        s.commit_txn(txn)
            .await
            .map_err(|e| format!("commit {i}: {e}"))?;
        if new_version != expected + 1 {
            return Err(format!(
                "update {i}: expected new version {}, got {new_version}",
                expected + 1
            ));
        }
    }

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.version != 3 {
        return Err(format!("expected final version 3, got {}", rec.version));
    }
    Ok(())
}

/// Regenerating the registry discards old version counters: the fresh
/// records start at version 0 and accept updates keyed on 0.
async fn replace_all_resets_versions_to_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ParkStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_spaces(&s, vec![make_space("A001", 'A')]).await?;

    // Age the original record past version 0.
    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Occupied, t0()))
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_txn(txn).await.map_err(|e| format!("commit: {e}"))?;

    seed_spaces(&s, vec![make_space("A001", 'A'), make_space("A002", 'A')]).await?;

    let rec = s.get_space("A001").await.map_err(|e| format!("get: {e}"))?;
    if rec.version != 0 || rec.status != SpaceStatus::Free {
        return Err(format!(
            "regenerated space not fresh: {}@{}",
            rec.status, rec.version
        ));
    }

    let mut txn = s.begin_txn().await.map_err(|e| format!("begin: {e}"))?;
    s.update_space(&mut txn, "A001", 0, make_update(SpaceStatus::Reserved, t0()))
        .await
        .map_err(|e| format!("post-replace update: {e}"))?;
    s.commit_txn(txn)
        .await
        .map_err(|e| format!("post-replace commit: {e}"))
}
